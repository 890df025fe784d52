//! Dashboard de console – consome eventos do reator e comandos do operador.

use crate::console::{self, ConsoleCommand, Target};
use crate::events::{ServerEvent, SessionInfo, TelemetryRecord};
use crate::net_thread::CollectorHandle;
use crossbeam_channel::{never, select, Receiver};
use std::collections::{BTreeMap, VecDeque};
use std::time::SystemTime;
use telemetry_core::types::ClientId;
use tracing::{debug, info, warn};

const HISTORY_SIZE: usize = 120;

/// Sessão vista pelo dashboard.
struct SessionView {
    info: SessionInfo,
    received: u64,
    last_seen: Option<SystemTime>,
}

/// Estado do dashboard.
pub struct TelemetryDashboard {
    handle: CollectorHandle,
    sessions: BTreeMap<ClientId, SessionView>,
    history: VecDeque<TelemetryRecord>,
    default_port: u16,
    listening: Option<u16>,
}

impl TelemetryDashboard {
    pub fn new(handle: CollectorHandle, default_port: u16) -> Self {
        Self {
            handle,
            sessions: BTreeMap::new(),
            history: VecDeque::with_capacity(HISTORY_SIZE),
            default_port,
            listening: None,
        }
    }

    /// Roda até `quit` (ou EOF do stdin) e devolve o handle para o encerramento.
    pub fn run(mut self, input: Receiver<String>) -> CollectorHandle {
        let events = self.handle.events().clone();
        let mut console_open = true;

        loop {
            let console = if console_open { input.clone() } else { never() };
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.on_event(event),
                    Err(_) => {
                        warn!("Reator encerrou inesperadamente");
                        break;
                    }
                },
                recv(console) -> line => match line {
                    Ok(line) => {
                        if !self.on_line(&line) {
                            break;
                        }
                    }
                    Err(_) => {
                        // Stdin fechado: continua servindo até Ctrl+C
                        debug!("Stdin encerrado, console desativado");
                        console_open = false;
                    }
                },
            }
        }

        self.handle
    }

    // ──────────────────────────────────────────
    // Eventos do reator
    // ──────────────────────────────────────────

    fn on_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ServerStarted { port } => self.listening = Some(port),
            ServerEvent::ServerStopped => {
                self.listening = None;
                self.sessions.clear();
            }
            ServerEvent::Connected(info) => {
                self.sessions.insert(
                    info.id,
                    SessionView {
                        info,
                        received: 0,
                        last_seen: None,
                    },
                );
            }
            ServerEvent::Disconnected(id) => {
                self.sessions.remove(&id);
            }
            ServerEvent::StatusChanged { id, running } => {
                if let Some(view) = self.sessions.get_mut(&id) {
                    view.info.running = running;
                }
            }
            ServerEvent::DataReceived(record) => {
                info!("{record}");
                if let Some(view) = self.sessions.get_mut(&record.client_id) {
                    view.received += 1;
                    view.last_seen = Some(record.received_at);
                }
                if self.history.len() >= HISTORY_SIZE {
                    self.history.pop_front();
                }
                self.history.push_back(record);
            }
            // Já registrado com warn! pelo reator
            ServerEvent::ThresholdExceeded(alert) => debug!("alerta entregue: {alert}"),
            ServerEvent::Log(message) => debug!("{message}"),
        }
    }

    // ──────────────────────────────────────────
    // Console
    // ──────────────────────────────────────────

    /// Retorna `false` para sair.
    fn on_line(&mut self, line: &str) -> bool {
        let command = match console::parse(line) {
            Ok(command) => command,
            Err(console::ConsoleError::Empty) => return true,
            Err(e) => {
                println!("{e}");
                return true;
            }
        };

        match command {
            ConsoleCommand::Start(Target::All) => self.handle.start_all_clients(),
            ConsoleCommand::Start(Target::Client(id)) => self.handle.start_client(id),
            ConsoleCommand::Stop(Target::All) => self.handle.stop_all_clients(),
            ConsoleCommand::Stop(Target::Client(id)) => self.handle.stop_client(id),
            ConsoleCommand::List => self.print_sessions(),
            ConsoleCommand::ShowThresholds => {
                let t = self.handle.thresholds();
                println!("  Latência máx.:      {} ms", t.max_latency);
                println!("  Perda de pacotes:   {} %", t.max_packet_loss);
                println!("  CPU máx.:           {} %", t.max_cpu_usage);
                println!("  Memória máx.:       {} %", t.max_memory_usage);
            }
            ConsoleCommand::Set(metric, value) => {
                let updated = console::with_threshold(self.handle.thresholds(), metric, value);
                self.handle.set_thresholds(updated);
            }
            ConsoleCommand::Listen(port) => {
                self.handle.start_server(port.unwrap_or(self.default_port));
            }
            ConsoleCommand::Halt => self.handle.stop_server(),
            ConsoleCommand::Help => println!("{}", console::HELP),
            ConsoleCommand::Quit => return false,
        }
        true
    }

    fn print_sessions(&self) {
        match self.listening {
            Some(port) => println!("Servidor escutando na porta {port}"),
            None => println!("Servidor parado"),
        }
        if self.sessions.is_empty() {
            println!("  (nenhum cliente conectado)");
            return;
        }
        for view in self.sessions.values() {
            let status = if view.info.running { "rodando" } else { "parado" };
            let last = view
                .last_seen
                .and_then(|t| t.elapsed().ok())
                .map(|d| format!("{} ms atrás", d.as_millis()))
                .unwrap_or_else(|| "-".into());
            println!(
                "  #{:<4} {}:{:<6} {:<8} {:>6} msgs  último: {}",
                view.info.id, view.info.address, view.info.port, status, view.received, last
            );
        }
        println!("  {} registros no histórico", self.history.len());
    }
}
