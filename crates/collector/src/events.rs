//! Mensagens trocadas entre o reator de rede e o controle (dashboard/console).

use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;
use telemetry_core::alerts::Alert;
use telemetry_core::types::{ClientId, Envelope};
use tokio::sync::oneshot;

/// Cópia dos dados de uma sessão, entregue ao dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: ClientId,
    pub address: IpAddr,
    pub port: u16,
    pub connected: bool,
    pub running: bool,
}

/// Telemetria decodificada de um cliente.
#[derive(Debug, Clone)]
pub struct TelemetryRecord {
    pub client_id: ClientId,
    pub received_at: SystemTime,
    pub envelope: Envelope,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Cliente {}] {}: {}",
            self.client_id,
            self.envelope.kind(),
            self.envelope
        )
    }
}

/// Notificações do reator para o controle.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    ServerStarted { port: u16 },
    ServerStopped,
    Connected(SessionInfo),
    Disconnected(ClientId),
    StatusChanged { id: ClientId, running: bool },
    DataReceived(TelemetryRecord),
    ThresholdExceeded(Alert),
    Log(String),
}

/// Comandos do controle para o reator.
#[derive(Debug)]
pub enum ServerCommand {
    StartServer(u16),
    StopServer,
    StartAll,
    StopAll,
    StartClient(ClientId),
    StopClient(ClientId),
    /// Encerramento final; o reator confirma depois de fechar todos os sockets
    Shutdown(oneshot::Sender<()>),
}
