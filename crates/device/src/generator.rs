//! Gerador de telemetria simulada.
//!
//! Alterna entre os três tipos de payload por round-robin sobre um contador
//! de emissões e sorteia o atraso até o próximo envio.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use telemetry_core::types::{DeviceStatus, Envelope, LogEntry, NetworkMetrics};

/// Frases base das mensagens de log.
pub const LOG_TEMPLATES: [&str; 10] = [
    "Interface eth0 restarted",
    "Connection established to gateway",
    "Packet buffer cleared",
    "Routing table updated",
    "DNS resolution completed",
    "Firewall rules reloaded",
    "Network interface configured",
    "DHCP lease renewed",
    "ARP cache flushed",
    "TCP connection timeout handled",
];

pub const SEVERITIES: [&str; 4] = ["INFO", "WARNING", "ERROR", "DEBUG"];

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789 ";
const MAX_SUFFIX_LEN: usize = 200;

/// Gerador com estado (contador de emissões e uptime acumulado).
pub struct TelemetryGenerator {
    rng: StdRng,
    counter: u64,
    uptime: u64,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl TelemetryGenerator {
    pub fn new(min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::with_rng(StdRng::from_entropy(), min_delay_ms, max_delay_ms)
    }

    /// Gerador determinístico.
    #[cfg(test)]
    pub fn seeded(seed: u64, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), min_delay_ms, max_delay_ms)
    }

    fn with_rng(rng: StdRng, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            rng,
            counter: 0,
            uptime: 0,
            min_delay_ms: min_delay_ms.min(max_delay_ms),
            max_delay_ms: max_delay_ms.max(min_delay_ms),
        }
    }

    /// Quantidade de envelopes já gerados.
    pub fn emitted(&self) -> u64 {
        self.counter
    }

    /// Próximo envelope: NetworkMetrics, DeviceStatus, Log, NetworkMetrics…
    pub fn next_envelope(&mut self) -> Envelope {
        let kind = self.counter % 3;
        self.counter += 1;

        match kind {
            0 => Envelope::NetworkMetrics(self.network_metrics()),
            1 => Envelope::DeviceStatus(self.device_status()),
            _ => Envelope::Log(self.log_entry()),
        }
    }

    /// Atraso aleatório até o próximo envio (jitter, não período fixo).
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.min_delay_ms..=self.max_delay_ms))
    }

    fn network_metrics(&mut self) -> NetworkMetrics {
        NetworkMetrics {
            bandwidth: self.rng.gen_range(50.0..=150.0),
            latency: self.rng.gen_range(1.0..=200.0),
            packet_loss: self.rng.gen_range(0.0..=10.0),
        }
    }

    fn device_status(&mut self) -> DeviceStatus {
        // Simula tempo decorrido desde o último status
        self.uptime += self.rng.gen_range(1..=59);

        DeviceStatus {
            uptime: self.uptime,
            cpu_usage: self.rng.gen_range(0..=99),
            memory_usage: self.rng.gen_range(20..=94),
        }
    }

    fn log_entry(&mut self) -> LogEntry {
        let template = LOG_TEMPLATES.choose(&mut self.rng).copied().unwrap_or_default();
        let severity = SEVERITIES.choose(&mut self.rng).copied().unwrap_or("INFO");

        let suffix = self.random_suffix();
        let message = if suffix.is_empty() {
            template.to_string()
        } else {
            format!("{template} - {suffix}")
        };

        LogEntry {
            message,
            severity: severity.to_string(),
        }
    }

    fn random_suffix(&mut self) -> String {
        let len = self.rng.gen_range(0..=MAX_SUFFIX_LEN);
        (0..len)
            .map(|_| SUFFIX_CHARSET[self.rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_rotate_round_robin() {
        let mut generator = TelemetryGenerator::seeded(7, 10, 100);
        let kinds: Vec<_> = (0..7).map(|_| generator.next_envelope().kind()).collect();
        assert_eq!(
            kinds,
            [
                "NetworkMetrics",
                "DeviceStatus",
                "Log",
                "NetworkMetrics",
                "DeviceStatus",
                "Log",
                "NetworkMetrics"
            ]
        );
        assert_eq!(generator.emitted(), 7);
    }

    #[test]
    fn values_stay_in_range() {
        let mut generator = TelemetryGenerator::seeded(42, 10, 100);
        let mut last_uptime = 0;

        for _ in 0..3000 {
            match generator.next_envelope() {
                Envelope::NetworkMetrics(m) => {
                    assert!((50.0..=150.0).contains(&m.bandwidth));
                    assert!((1.0..=200.0).contains(&m.latency));
                    assert!((0.0..=10.0).contains(&m.packet_loss));
                }
                Envelope::DeviceStatus(s) => {
                    let step = s.uptime - last_uptime;
                    assert!((1..=59).contains(&step), "passo de uptime {step}");
                    last_uptime = s.uptime;
                    assert!(s.cpu_usage <= 99);
                    assert!((20..=94).contains(&s.memory_usage));
                }
                Envelope::Log(l) => {
                    assert!(SEVERITIES.contains(&l.severity.as_str()));
                    let (template, suffix) = match l.message.split_once(" - ") {
                        Some((t, s)) => (t, s),
                        None => (l.message.as_str(), ""),
                    };
                    assert!(LOG_TEMPLATES.contains(&template));
                    assert!(suffix.len() <= MAX_SUFFIX_LEN);
                    assert!(suffix.bytes().all(|b| SUFFIX_CHARSET.contains(&b)));
                }
                other => panic!("tipo inesperado: {other:?}"),
            }
        }
    }

    #[test]
    fn delay_is_jittered_within_bounds() {
        let mut generator = TelemetryGenerator::seeded(1, 10, 100);
        let delays: Vec<_> = (0..500).map(|_| generator.next_delay()).collect();
        assert!(delays
            .iter()
            .all(|d| (Duration::from_millis(10)..=Duration::from_millis(100)).contains(d)));
        assert!(delays.iter().any(|d| *d != delays[0]));
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = TelemetryGenerator::seeded(99, 10, 100);
        let mut b = TelemetryGenerator::seeded(99, 10, 100);
        for _ in 0..30 {
            assert_eq!(a.next_envelope(), b.next_envelope());
        }
    }
}
