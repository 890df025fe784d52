//! Sistema de alertas – tetos configuráveis e avaliação de telemetria.

use crate::config::ThresholdConfig;
use crate::types::{ClientId, Envelope};
use parking_lot::Mutex;
use std::fmt;

/// Métrica monitorada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Latency,
    PacketLoss,
    CpuUsage,
    MemoryUsage,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::Latency => "Latência alta",
            Metric::PacketLoss => "Perda de pacotes alta",
            Metric::CpuUsage => "Uso de CPU alto",
            Metric::MemoryUsage => "Uso de memória alto",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Latency => "ms",
            _ => "%",
        }
    }
}

/// Um alerta disparado.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub client_id: ClientId,
    pub metric: Metric,
    pub value: f64,
    pub ceiling: f64,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Cliente {}] {}: {}{}",
            self.client_id,
            self.metric.label(),
            self.value,
            self.metric.unit()
        )
    }
}

/// Thresholds compartilhados entre o reator e o controle.
///
/// Só se lê e escreve cópias inteiras; nenhuma referência ao estado protegido
/// sai daqui.
#[derive(Debug, Default)]
pub struct ThresholdMonitor {
    config: Mutex<ThresholdConfig>,
}

impl ThresholdMonitor {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Substitui a configuração inteira.
    pub fn set(&self, config: ThresholdConfig) {
        *self.config.lock() = config;
    }

    /// Cópia independente da configuração atual.
    pub fn get(&self) -> ThresholdConfig {
        *self.config.lock()
    }

    /// Avalia uma telemetria contra um snapshot dos thresholds.
    pub fn evaluate(&self, client_id: ClientId, envelope: &Envelope) -> Vec<Alert> {
        evaluate_alerts(client_id, envelope, &self.get())
    }
}

/// Avalia um envelope e retorna um alerta por campo acima do teto.
pub fn evaluate_alerts(
    client_id: ClientId,
    envelope: &Envelope,
    thresholds: &ThresholdConfig,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    match envelope {
        Envelope::NetworkMetrics(m) => {
            check(&mut alerts, client_id, Metric::Latency, m.latency, thresholds.max_latency);
            check(
                &mut alerts,
                client_id,
                Metric::PacketLoss,
                m.packet_loss,
                thresholds.max_packet_loss,
            );
        }
        Envelope::DeviceStatus(s) => {
            check(
                &mut alerts,
                client_id,
                Metric::CpuUsage,
                f64::from(s.cpu_usage),
                f64::from(thresholds.max_cpu_usage),
            );
            check(
                &mut alerts,
                client_id,
                Metric::MemoryUsage,
                f64::from(s.memory_usage),
                f64::from(thresholds.max_memory_usage),
            );
        }
        _ => {}
    }

    alerts
}

fn check(alerts: &mut Vec<Alert>, client_id: ClientId, metric: Metric, value: f64, ceiling: f64) {
    if value > ceiling {
        alerts.push(Alert {
            client_id,
            metric,
            value,
            ceiling,
        });
    }
}
