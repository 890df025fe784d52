//! Thread de rede do coletor.
//!
//! O reator roda numa thread dedicada com runtime tokio `current_thread`:
//! escuta TCP, aceita conexões e processa comandos. O controle conversa com
//! ele por canais ordenados e não bloqueantes (comandos entram por um mpsc
//! tokio, notificações saem por um canal crossbeam). Só o encerramento final
//! bloqueia, até o reator confirmar que todos os sockets foram fechados.

use crate::events::{ServerCommand, ServerEvent};
use crate::registry::{Registry, SessionLink};
use crossbeam_channel::Receiver;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use telemetry_core::alerts::ThresholdMonitor;
use telemetry_core::config::{CollectorConfig, ThresholdConfig};
use telemetry_core::types::ClientId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{
    self, Receiver as EventReceiver, Sender as EventSender, UnboundedReceiver, UnboundedSender,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 4096;
/// Leituras em trânsito entre as conexões e o reator. Com a fila cheia as
/// tasks param de ler e o TCP segura o peer.
const EVENT_QUEUE: usize = 64;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Falha ao criar runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("Falha ao criar thread de rede: {0}")]
    Spawn(#[source] io::Error),
}

/// Interface do controle (dashboard/console) com o reator.
pub struct CollectorHandle {
    commands: UnboundedSender<ServerCommand>,
    events: Receiver<ServerEvent>,
    monitor: Arc<ThresholdMonitor>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CollectorHandle {
    /// Inicia a thread do reator (ainda sem escutar nenhuma porta).
    pub fn spawn(config: &CollectorConfig) -> Result<Self, CollectorError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let monitor = Arc::new(ThresholdMonitor::new(config.thresholds));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CollectorError::Runtime)?;

        let reactor = Reactor::new(Registry::new(
            Arc::clone(&monitor),
            event_tx,
            config.max_buffer_bytes,
        ));

        let worker = thread::Builder::new()
            .name("collector-reactor".into())
            .spawn(move || runtime.block_on(reactor.run(cmd_rx)))
            .map_err(CollectorError::Spawn)?;

        Ok(Self {
            commands: cmd_tx,
            events: event_rx,
            monitor,
            worker: Some(worker),
        })
    }

    /// Notificações do reator, em ordem.
    pub fn events(&self) -> &Receiver<ServerEvent> {
        &self.events
    }

    pub fn start_server(&self, port: u16) {
        self.send(ServerCommand::StartServer(port));
    }

    pub fn stop_server(&self) {
        self.send(ServerCommand::StopServer);
    }

    pub fn start_all_clients(&self) {
        self.send(ServerCommand::StartAll);
    }

    pub fn stop_all_clients(&self) {
        self.send(ServerCommand::StopAll);
    }

    pub fn start_client(&self, id: ClientId) {
        self.send(ServerCommand::StartClient(id));
    }

    pub fn stop_client(&self, id: ClientId) {
        self.send(ServerCommand::StopClient(id));
    }

    pub fn set_thresholds(&self, config: ThresholdConfig) {
        self.monitor.set(config);
        info!(
            "Thresholds atualizados: latency={}ms, packet_loss={}%, cpu={}%, memory={}%",
            config.max_latency,
            config.max_packet_loss,
            config.max_cpu_usage,
            config.max_memory_usage
        );
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.monitor.get()
    }

    /// Encerra o reator e espera todos os sockets fecharem.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn send(&self, command: ServerCommand) {
        if self.commands.send(command).is_err() {
            warn!("Reator encerrado, comando descartado");
        }
    }

    fn shutdown_inner(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(ServerCommand::Shutdown(ack_tx)).is_ok() && ack_rx.blocking_recv().is_err() {
            warn!("Reator terminou sem confirmar o encerramento");
        }
        if worker.join().is_err() {
            error!("Thread de rede terminou com pânico");
        }
        info!("Reator encerrado");
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

// ──────────────────────────────────────────────
// Reator
// ──────────────────────────────────────────────

/// Eventos das tasks de conexão para o reator.
#[derive(Debug)]
enum ConnectionEvent {
    Data(ClientId, Vec<u8>),
    Closed(ClientId, Option<io::Error>),
}

struct Reactor {
    listener: Option<TcpListener>,
    registry: Registry,
    conn_tx: EventSender<ConnectionEvent>,
    conn_rx: EventReceiver<ConnectionEvent>,
}

impl Reactor {
    fn new(registry: Registry) -> Self {
        let (conn_tx, conn_rx) = mpsc::channel(EVENT_QUEUE);
        Self {
            listener: None,
            registry,
            conn_tx,
            conn_rx,
        }
    }

    async fn run(mut self, mut commands: UnboundedReceiver<ServerCommand>) {
        debug!("Reator do coletor iniciado");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        // Handle descartado sem shutdown explícito
                        self.stop_server();
                        break;
                    }
                },
                accepted = accept_opt(&self.listener) => match accepted {
                    Ok((stream, addr)) => self.on_accept(stream, addr),
                    Err(e) => {
                        warn!("Erro ao aceitar conexão: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(event) = self.conn_rx.recv() => self.on_connection_event(event),
            }
        }
    }

    /// Retorna `false` quando o reator deve parar.
    async fn handle_command(&mut self, command: ServerCommand) -> bool {
        match command {
            ServerCommand::StartServer(port) => self.start_server(port).await,
            ServerCommand::StopServer => self.stop_server(),
            ServerCommand::StartAll => self.registry.start_all(),
            ServerCommand::StopAll => self.registry.stop_all(),
            ServerCommand::StartClient(id) => self.registry.start(id),
            ServerCommand::StopClient(id) => self.registry.stop(id),
            ServerCommand::Shutdown(ack) => {
                self.stop_server();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    async fn start_server(&mut self, port: u16) {
        if self.listener.is_some() {
            self.registry.log("Servidor já está rodando".into());
            return;
        }

        match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => {
                let bound = listener.local_addr().map(|a| a.port()).unwrap_or(port);
                self.listener = Some(listener);
                self.registry.log(format!("Servidor iniciado na porta {bound}"));
                self.registry.notify(ServerEvent::ServerStarted { port: bound });
            }
            Err(e) => {
                self.registry
                    .log(format!("Falha ao iniciar servidor na porta {port}: {e}"));
            }
        }
    }

    /// Aborta todas as conexões e fecha o listener.
    fn stop_server(&mut self) {
        let dropped = self.registry.len();
        self.registry.clear();

        if self.listener.take().is_some() {
            self.registry
                .log(format!("Servidor parado ({dropped} clientes desconectados)"));
            self.registry.notify(ServerEvent::ServerStopped);
        }
    }

    fn on_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY indisponível para {addr}: {e}");
        }
        // Linger zero: fechar o socket envia RST (aborto, sem handshake de FIN)
        #[allow(deprecated)]
        let linger = stream.set_linger(Some(Duration::ZERO));
        if let Err(e) = linger {
            debug!("SO_LINGER indisponível para {addr}: {e}");
        }

        let events = self.conn_tx.clone();
        self.registry.register(addr, |id| {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let task = tokio::spawn(connection_task(id, stream, out_rx, events));
            SessionLink::new(out_tx, task.abort_handle())
        });
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Data(id, bytes) => self.registry.ingest(id, &bytes),
            ConnectionEvent::Closed(id, reason) => {
                if let Some(e) = reason {
                    self.registry.log(format!("Erro de socket do cliente {id}: {e}"));
                }
                self.registry.remove(id);
            }
        }
    }
}

async fn accept_opt(listener: &Option<TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// I/O de uma conexão: repassa leituras ao reator e escreve a fila de saída.
///
/// Termina sozinha quando o reator descarta a fila (sessão removida).
async fn connection_task(
    id: ClientId,
    stream: TcpStream,
    mut outbound: UnboundedReceiver<Vec<u8>>,
    events: EventSender<ConnectionEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_CHUNK];

    let reason = loop {
        tokio::select! {
            res = reader.read(&mut buf) => match res {
                Ok(0) => break None,
                Ok(n) => {
                    let chunk = ConnectionEvent::Data(id, buf[..n].to_vec());
                    if events.send(chunk).await.is_err() {
                        return;
                    }
                }
                Err(e) => break Some(e),
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        break Some(e);
                    }
                }
                None => return,
            },
        }
    };

    let _ = events.send(ConnectionEvent::Closed(id, reason)).await;
}
