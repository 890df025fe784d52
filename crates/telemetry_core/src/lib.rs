//! # Telemetry Core
//!
//! Crate compartilhada entre dispositivo e coletor: envelopes do protocolo,
//! framing por linha (JSON + `\n`), configuração TOML e thresholds de alerta.
//!
//! ## Módulos
//! - [`types`] – Envelopes de telemetria e de controle
//! - [`protocol`] – Encode/decode de frames e remontagem do stream TCP
//! - [`config`] – Configuração unificada via TOML
//! - [`alerts`] – Thresholds compartilhados e avaliação de alertas

pub mod types;
pub mod protocol;
pub mod config;
pub mod alerts;

// Re-exports convenientes
pub use types::{ClientId, CommandKind, Envelope};
pub use protocol::{decode_frame, encode_frame, FrameBuffer, ProtocolError, MAX_BUFFER_SIZE};
pub use config::{AppConfig, CollectorConfig, DeviceConfig, ThresholdConfig};
pub use alerts::{Alert, Metric, ThresholdMonitor};
