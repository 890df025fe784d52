//! Definição dos envelopes trocados entre dispositivo e coletor.
//!
//! Cada mensagem é um objeto JSON com o discriminador `type`; o restante dos
//! campos depende do tipo. Telemetria vai do dispositivo para o coletor,
//! mensagens de controle fazem o caminho inverso.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identidade atribuída pelo coletor a cada conexão aceita.
pub type ClientId = u64;

// ──────────────────────────────────────────────
// Telemetria
// ──────────────────────────────────────────────

/// Métricas de rede simuladas.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkMetrics {
    /// Banda disponível (Mbps)
    pub bandwidth: f64,
    /// Latência (ms)
    pub latency: f64,
    /// Perda de pacotes (%)
    pub packet_loss: f64,
}

/// Estado do dispositivo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Tempo ligado acumulado (s)
    pub uptime: u64,
    /// Uso de CPU (0–100%)
    pub cpu_usage: u32,
    /// Uso de memória (0–100%)
    pub memory_usage: u32,
}

/// Linha de log emitida pelo dispositivo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    /// `INFO`, `WARNING`, `ERROR` ou `DEBUG`
    pub severity: String,
}

// ──────────────────────────────────────────────
// Controle
// ──────────────────────────────────────────────

/// Comando enviado pelo coletor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Start,
    Stop,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Start => f.write_str("start"),
            CommandKind::Stop => f.write_str("stop"),
        }
    }
}

// ──────────────────────────────────────────────
// Envelope
// ──────────────────────────────────────────────

/// Mensagem discriminada pelo campo `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Envelope {
    ConnectionConfirm { client_id: ClientId, status: String },
    Command { command: CommandKind },
    NetworkMetrics(NetworkMetrics),
    DeviceStatus(DeviceStatus),
    Log(LogEntry),
}

impl Envelope {
    /// Todos os valores de `type` reconhecidos pelo protocolo.
    pub const KNOWN_TYPES: [&'static str; 5] = [
        "ConnectionConfirm",
        "Command",
        "NetworkMetrics",
        "DeviceStatus",
        "Log",
    ];

    /// Valor do discriminador `type` deste envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::ConnectionConfirm { .. } => "ConnectionConfirm",
            Envelope::Command { .. } => "Command",
            Envelope::NetworkMetrics(_) => "NetworkMetrics",
            Envelope::DeviceStatus(_) => "DeviceStatus",
            Envelope::Log(_) => "Log",
        }
    }

    /// `true` para os três tipos de telemetria emitidos pelo dispositivo.
    pub fn is_telemetry(&self) -> bool {
        matches!(
            self,
            Envelope::NetworkMetrics(_) | Envelope::DeviceStatus(_) | Envelope::Log(_)
        )
    }

    pub fn confirm(client_id: ClientId) -> Self {
        Envelope::ConnectionConfirm {
            client_id,
            status: "connected".into(),
        }
    }

    pub fn command(command: CommandKind) -> Self {
        Envelope::Command { command }
    }
}

/// Resumo legível de uma telemetria (usado nos logs do coletor).
impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::ConnectionConfirm { client_id, status } => {
                write!(f, "ConnectionConfirm id={client_id} status={status}")
            }
            Envelope::Command { command } => write!(f, "Command {command}"),
            Envelope::NetworkMetrics(m) => write!(
                f,
                "bandwidth={:.2}, latency={:.2}ms, packet_loss={:.2}%",
                m.bandwidth, m.latency, m.packet_loss
            ),
            Envelope::DeviceStatus(s) => write!(
                f,
                "uptime={}s, cpu={}%, memory={}%",
                s.uptime, s.cpu_usage, s.memory_usage
            ),
            Envelope::Log(l) => write!(f, "[{}] {}", l.severity, l.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serialized_tag() {
        let samples = [
            Envelope::confirm(7),
            Envelope::command(CommandKind::Stop),
            Envelope::NetworkMetrics(NetworkMetrics::default()),
            Envelope::DeviceStatus(DeviceStatus::default()),
            Envelope::Log(LogEntry::default()),
        ];
        for env in samples {
            let value = serde_json::to_value(&env).unwrap();
            assert_eq!(value["type"], env.kind());
            assert!(Envelope::KNOWN_TYPES.contains(&env.kind()));
        }
    }

    #[test]
    fn command_serializes_lowercase() {
        let json = serde_json::to_string(&Envelope::command(CommandKind::Start)).unwrap();
        assert_eq!(json, r#"{"type":"Command","command":"start"}"#);
    }

    #[test]
    fn only_device_messages_are_telemetry() {
        assert!(Envelope::Log(LogEntry::default()).is_telemetry());
        assert!(!Envelope::confirm(1).is_telemetry());
        assert!(!Envelope::command(CommandKind::Start).is_telemetry());
    }
}
