//! Reator do dispositivo: conexão TCP, reconexão e agendamento de envios.
//!
//! Um único `select!` multiplexa a conexão pendente, as leituras do socket,
//! o timer de reconexão, o timer do próximo envio e o pedido de encerramento.
//! Os timers são prazos únicos (`Option<Instant>`): agendar de novo substitui
//! o prazo anterior.

use crate::generator::TelemetryGenerator;
use crate::session::{Action, ClientState, Session, SessionEvent};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use telemetry_core::config::DeviceConfig;
use telemetry_core::protocol::{decode_frame, encode_frame, FrameBuffer};
use telemetry_core::types::{CommandKind, Envelope};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

const READ_CHUNK: usize = 4096;

/// Dispositivo simulado conectado a um coletor.
pub struct DeviceClient {
    host: String,
    port: u16,
    reconnect_interval: Duration,
    session: Session,
    generator: TelemetryGenerator,

    // Transporte
    connecting: Option<ConnectFuture>,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    frames: FrameBuffer,

    // Timers
    reconnect_at: Option<Instant>,
    next_send_at: Option<Instant>,

    state_tx: watch::Sender<ClientState>,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Self {
        let generator =
            TelemetryGenerator::new(config.min_send_interval_ms, config.max_send_interval_ms);
        Self::with_generator(config, generator)
    }

    pub fn with_generator(config: &DeviceConfig, generator: TelemetryGenerator) -> Self {
        let (state_tx, _) = watch::channel(ClientState::Disconnected);
        Self {
            host: config.host.clone(),
            port: config.port,
            reconnect_interval: config.reconnect_interval(),
            session: Session::new(),
            generator,
            connecting: None,
            reader: None,
            writer: None,
            frames: FrameBuffer::new(),
            reconnect_at: None,
            next_send_at: None,
            state_tx,
        }
    }

    pub fn state(&self) -> ClientState {
        self.session.state()
    }

    #[cfg(test)]
    pub fn client_id(&self) -> Option<telemetry_core::types::ClientId> {
        self.session.client_id()
    }

    /// Acompanha as mudanças de estado.
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state_tx.subscribe()
    }

    /// Conecta e roda até `shutdown` completar.
    ///
    /// Falhas de transporte nunca encerram o loop: a sessão volta a conectar
    /// depois do intervalo fixo de reconexão.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!("Conectando a {}:{}...", self.host, self.port);
        self.dispatch(SessionEvent::ConnectRequested);

        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Encerrando sessão ({} envelopes gerados)", self.generator.emitted());
                    self.dispatch(SessionEvent::DisconnectRequested);
                    break;
                }
                res = poll_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(res);
                }
                res = read_some(&mut self.reader, &mut buf) => match res {
                    Ok(0) => self.on_transport_lost(None),
                    Ok(n) => self.on_bytes(&buf[..n]),
                    Err(e) => self.on_transport_lost(Some(e)),
                },
                _ = sleep_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    info!("Reconectando a {}:{}...", self.host, self.port);
                    self.dispatch(SessionEvent::ConnectRequested);
                }
                _ = sleep_opt(self.next_send_at) => {
                    self.next_send_at = None;
                    self.emit().await;
                }
            }
        }
    }

    // ──────────────────────────────────────────
    // Máquina de estados
    // ──────────────────────────────────────────

    fn dispatch(&mut self, event: SessionEvent) {
        let prior = self.session.state();
        match self.session.handle(event) {
            Ok(actions) => {
                for action in actions {
                    self.execute(action);
                }
                let state = self.session.state();
                if state != prior {
                    debug!("Estado: {prior} → {state} (id {:?})", self.session.client_id());
                    self.state_tx.send_replace(state);
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::OpenConnection => {
                self.close_transport();
                let addr = (self.host.clone(), self.port);
                self.connecting = Some(Box::pin(TcpStream::connect(addr)));
            }
            Action::CloseConnection => self.close_transport(),
            Action::NotifyConnected => info!("Conectado ao coletor, aguardando confirmação..."),
            Action::ScheduleReconnect => {
                info!("Nova tentativa em {} ms", self.reconnect_interval.as_millis());
                self.reconnect_at = Some(Instant::now() + self.reconnect_interval);
            }
            Action::CancelReconnect => self.reconnect_at = None,
            Action::ScheduleEmission => self.schedule_next_send(),
            Action::CancelEmission => self.next_send_at = None,
        }
    }

    // ──────────────────────────────────────────
    // Transporte
    // ──────────────────────────────────────────

    fn close_transport(&mut self) {
        self.connecting = None;
        self.reader = None;
        self.writer = None;
        self.frames.clear();
    }

    fn on_connect_result(&mut self, res: io::Result<TcpStream>) {
        match res {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY indisponível: {e}");
                }
                let (reader, writer) = stream.into_split();
                self.reader = Some(reader);
                self.writer = Some(writer);
                self.frames.clear();
                self.dispatch(SessionEvent::TransportConnected);
            }
            Err(e) => {
                warn!("Falha na conexão com {}:{}: {e}", self.host, self.port);
                self.dispatch(SessionEvent::TransportError);
            }
        }
    }

    fn on_transport_lost(&mut self, err: Option<io::Error>) {
        match err {
            Some(e) => warn!("Erro de socket: {e}"),
            None => info!("Desconectado do coletor"),
        }
        self.reader = None;
        self.writer = None;
        self.dispatch(SessionEvent::TransportDisconnected);
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        let frames = match self.frames.feed(bytes) {
            Ok(frames) => frames,
            Err(e) if e.is_fatal() => {
                error!("{e}; abortando conexão");
                self.on_transport_lost(None);
                return;
            }
            Err(e) => {
                warn!("Bytes descartados: {e}");
                return;
            }
        };

        for frame in frames {
            self.handle_frame(&frame);
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        match decode_frame(frame) {
            Ok(Envelope::ConnectionConfirm { client_id, status }) => {
                info!("Conexão confirmada. ID: {client_id}, status: {status}");
                self.dispatch(SessionEvent::ConfirmReceived(client_id));
            }
            Ok(Envelope::Command { command }) => {
                info!("Comando recebido: {command}");
                let event = match command {
                    CommandKind::Start => SessionEvent::StartReceived,
                    CommandKind::Stop => SessionEvent::StopReceived,
                };
                self.dispatch(event);
            }
            Ok(other) => warn!("Mensagem inesperada do coletor: {}", other.kind()),
            Err(e) => warn!("Frame descartado: {e}"),
        }
    }

    // ──────────────────────────────────────────
    // Emissão
    // ──────────────────────────────────────────

    fn schedule_next_send(&mut self) {
        if self.session.state() == ClientState::Running {
            self.next_send_at = Some(Instant::now() + self.generator.next_delay());
        }
    }

    async fn emit(&mut self) {
        if self.session.state() != ClientState::Running {
            return;
        }

        let envelope = self.generator.next_envelope();
        let frame = match encode_frame(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Erro ao serializar telemetria: {e}");
                self.schedule_next_send();
                return;
            }
        };

        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writer.write_all(&frame).await {
            self.on_transport_lost(Some(e));
            return;
        }
        debug!("→ {} bytes | {}", frame.len(), envelope);

        self.schedule_next_send();
    }
}

async fn poll_connect(pending: &mut Option<ConnectFuture>) -> io::Result<TcpStream> {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn read_some(reader: &mut Option<OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
