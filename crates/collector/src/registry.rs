//! Registro de sessões do coletor.
//!
//! Um único mapa indexado pela identidade da conexão é dono do registro
//! completo: dados da sessão, buffer de recepção e o handle da conexão.
//! Remover a entrada libera tudo de uma vez, e a remoção acontece uma só vez
//! qualquer que seja o caminho que detectou a desconexão.

use crate::events::{ServerEvent, SessionInfo, TelemetryRecord};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use telemetry_core::alerts::ThresholdMonitor;
use telemetry_core::protocol::{decode_frame, encode_frame, FrameBuffer};
use telemetry_core::types::{ClientId, CommandKind, Envelope};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Handle de uma conexão viva: fila de saída + aborto da task.
#[derive(Debug)]
pub struct SessionLink {
    outbound: UnboundedSender<Vec<u8>>,
    abort: Option<AbortHandle>,
}

impl SessionLink {
    pub fn new(outbound: UnboundedSender<Vec<u8>>, abort: AbortHandle) -> Self {
        Self {
            outbound,
            abort: Some(abort),
        }
    }

    /// Link sem task associada.
    #[cfg(test)]
    pub fn detached(outbound: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            outbound,
            abort: None,
        }
    }

    fn deliver(&self, envelope: &Envelope) -> Result<(), String> {
        let frame = encode_frame(envelope).map_err(|e| e.to_string())?;
        self.outbound
            .send(frame)
            .map_err(|_| "conexão já encerrada".to_string())
    }

    fn abort(&self) {
        if let Some(handle) = &self.abort {
            handle.abort();
        }
    }
}

struct Session {
    info: SessionInfo,
    frames: FrameBuffer,
    link: SessionLink,
}

/// Sessões vivas do coletor.
pub struct Registry {
    sessions: BTreeMap<ClientId, Session>,
    next_id: ClientId,
    max_buffer: usize,
    monitor: Arc<ThresholdMonitor>,
    events: Sender<ServerEvent>,
}

impl Registry {
    pub fn new(monitor: Arc<ThresholdMonitor>, events: Sender<ServerEvent>, max_buffer: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 1,
            max_buffer,
            monitor,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn get(&self, id: ClientId) -> Option<SessionInfo> {
        self.sessions.get(&id).map(|s| s.info.clone())
    }

    // ──────────────────────────────────────────
    // Notificações
    // ──────────────────────────────────────────

    pub(crate) fn notify(&self, event: ServerEvent) {
        // Controle já encerrado: nada a notificar
        let _ = self.events.send(event);
    }

    pub(crate) fn log(&self, message: String) {
        info!("{message}");
        self.notify(ServerEvent::Log(message));
    }

    // ──────────────────────────────────────────
    // Ciclo de vida
    // ──────────────────────────────────────────

    /// Registra uma conexão aceita e envia a confirmação.
    ///
    /// `connect` recebe a identidade recém-alocada e devolve o handle da
    /// conexão (a task de I/O precisa conhecer o id).
    pub fn register<F>(&mut self, addr: SocketAddr, connect: F) -> ClientId
    where
        F: FnOnce(ClientId) -> SessionLink,
    {
        let id = self.next_id;
        self.next_id += 1;

        let info = SessionInfo {
            id,
            address: addr.ip(),
            port: addr.port(),
            connected: true,
            running: false,
        };
        let session = Session {
            info: info.clone(),
            frames: FrameBuffer::with_limit(self.max_buffer),
            link: connect(id),
        };

        let delivered = session.link.deliver(&Envelope::confirm(id));
        self.sessions.insert(id, session);
        if let Err(e) = delivered {
            warn!("Erro de escrita para cliente {id}: {e}");
        }

        self.notify(ServerEvent::Connected(info));
        self.log(format!("Cliente {id} conectado de {addr}"));
        id
    }

    /// Remove uma sessão; `false` se ela já não existia.
    pub fn remove(&mut self, id: ClientId) -> bool {
        match self.sessions.remove(&id) {
            Some(_) => {
                self.notify(ServerEvent::Disconnected(id));
                self.log(format!("Cliente {id} desconectado"));
                true
            }
            None => false,
        }
    }

    /// Aborta a conexão e remove a sessão.
    pub fn abort(&mut self, id: ClientId) {
        if let Some(session) = self.sessions.get(&id) {
            session.link.abort();
        }
        self.remove(id);
    }

    /// Aborta todas as conexões e esvazia o registro.
    pub fn clear(&mut self) {
        let ids: Vec<_> = self.sessions.keys().copied().collect();
        for id in ids {
            self.abort(id);
        }
    }

    // ──────────────────────────────────────────
    // Comandos
    // ──────────────────────────────────────────

    pub fn start(&mut self, id: ClientId) {
        self.set_running(id, CommandKind::Start);
    }

    pub fn stop(&mut self, id: ClientId) {
        self.set_running(id, CommandKind::Stop);
    }

    pub fn start_all(&mut self) {
        let ids: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.info.connected && !s.info.running)
            .map(|s| s.info.id)
            .collect();
        for id in ids {
            self.start(id);
        }
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.info.running)
            .map(|s| s.info.id)
            .collect();
        for id in ids {
            self.stop(id);
        }
    }

    fn set_running(&mut self, id: ClientId, command: CommandKind) {
        let Some(session) = self.sessions.get_mut(&id) else {
            self.log(format!("Cliente {id} não encontrado"));
            return;
        };

        let running = command == CommandKind::Start;
        session.info.running = running;
        if let Err(e) = session.link.deliver(&Envelope::command(command)) {
            warn!("Erro de escrita para cliente {id}: {e}");
        }

        self.notify(ServerEvent::StatusChanged { id, running });
        let verb = if running { "iniciado" } else { "parado" };
        self.log(format!("Cliente {id} {verb}"));
    }

    // ──────────────────────────────────────────
    // Dados recebidos
    // ──────────────────────────────────────────

    /// Processa bytes recebidos de uma conexão, em ordem de chegada.
    pub fn ingest(&mut self, id: ClientId, bytes: &[u8]) {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!("{} bytes de sessão já removida ({id})", bytes.len());
            return;
        };

        let frames = match session.frames.feed(bytes) {
            Ok(frames) => frames,
            Err(e) if e.is_fatal() => {
                self.log(format!("Cliente {id}: {e}, desconectando"));
                self.abort(id);
                return;
            }
            Err(e) => {
                self.log(format!("Cliente {id}: bytes descartados: {e}"));
                return;
            }
        };

        for frame in frames {
            self.dispatch_frame(id, &frame);
        }
    }

    fn dispatch_frame(&self, id: ClientId, frame: &[u8]) {
        match decode_frame(frame) {
            Ok(envelope) if envelope.is_telemetry() => {
                let alerts = self.monitor.evaluate(id, &envelope);
                self.notify(ServerEvent::DataReceived(TelemetryRecord {
                    client_id: id,
                    received_at: SystemTime::now(),
                    envelope,
                }));
                for alert in alerts {
                    warn!("WARNING {alert}");
                    self.notify(ServerEvent::ThresholdExceeded(alert));
                }
            }
            Ok(other) => self.log(format!(
                "Cliente {id}: mensagem inesperada {} ignorada",
                other.kind()
            )),
            Err(e) => self.log(format!("Cliente {id}: frame descartado: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;
    use telemetry_core::alerts::Metric;
    use telemetry_core::protocol::MAX_BUFFER_SIZE;
    use telemetry_core::types::{DeviceStatus, NetworkMetrics};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Harness {
        registry: Registry,
        events: Receiver<ServerEvent>,
        outbound: BTreeMap<ClientId, UnboundedReceiver<Vec<u8>>>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = crossbeam_channel::unbounded();
            Self {
                registry: Registry::new(Arc::new(ThresholdMonitor::default()), tx, MAX_BUFFER_SIZE),
                events: rx,
                outbound: BTreeMap::new(),
            }
        }

        fn connect(&mut self, port: u16) -> ClientId {
            let (tx, rx) = mpsc::unbounded_channel();
            let addr: SocketAddr = ([10, 0, 0, 7], port).into();
            let id = self.registry.register(addr, |_| SessionLink::detached(tx));
            self.outbound.insert(id, rx);
            id
        }

        /// Envelopes enviados a um cliente desde a última chamada.
        fn sent_to(&mut self, id: ClientId) -> Vec<Envelope> {
            let rx = self.outbound.get_mut(&id).unwrap();
            let mut out = Vec::new();
            while let Ok(frame) = rx.try_recv() {
                out.push(decode_frame(&frame[..frame.len() - 1]).unwrap());
            }
            out
        }

        fn drain(&self) -> Vec<ServerEvent> {
            self.events.try_iter().collect()
        }
    }

    fn frame(envelope: &Envelope) -> Vec<u8> {
        encode_frame(envelope).unwrap()
    }

    #[test]
    fn accept_assigns_identity_and_confirms() {
        let mut h = Harness::new();
        let id = h.connect(40000);
        assert_eq!(id, 1);
        assert_eq!(h.sent_to(id), vec![Envelope::confirm(1)]);

        let info = h.registry.get(id).unwrap();
        assert!(info.connected);
        assert!(!info.running);
        assert_eq!(info.port, 40000);

        let events = h.drain();
        assert!(matches!(&events[0], ServerEvent::Connected(i) if i.id == 1));
    }

    #[test]
    fn identities_are_never_reused() {
        let mut h = Harness::new();
        let a = h.connect(1);
        let b = h.connect(2);
        assert!(h.registry.remove(a));
        let c = h.connect(3);
        assert_eq!((a, b, c), (1, 2, 3));
        assert!(h.registry.get(a).is_none());
    }

    #[test]
    fn unknown_identity_is_logged_not_fatal() {
        let mut h = Harness::new();
        let id = h.connect(1);
        h.drain();

        h.registry.stop(99);
        h.registry.start(99);

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, ServerEvent::Log(m) if m.contains("não encontrado"))));
        assert_eq!(h.registry.len(), 1);
        assert!(!h.registry.get(id).unwrap().running);
    }

    #[test]
    fn start_all_then_stop_all_toggles_every_idle_session() {
        let mut h = Harness::new();
        let ids: Vec<_> = (0..3).map(|p| h.connect(p)).collect();
        for &id in &ids {
            h.sent_to(id);
        }
        h.drain();

        h.registry.start_all();
        assert!(ids.iter().all(|&id| h.registry.get(id).unwrap().running));
        h.registry.stop_all();

        let changes: Vec<_> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::StatusChanged { id, running } => Some((id, running)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![(1, true), (2, true), (3, true), (1, false), (2, false), (3, false)]
        );

        for &id in &ids {
            let info = h.registry.get(id).unwrap();
            assert!(info.connected && !info.running);
            assert_eq!(
                h.sent_to(id),
                vec![
                    Envelope::command(CommandKind::Start),
                    Envelope::command(CommandKind::Stop)
                ]
            );
        }
    }

    #[test]
    fn bulk_commands_skip_ineligible_sessions() {
        let mut h = Harness::new();
        let a = h.connect(1);
        let b = h.connect(2);
        h.registry.start(a);
        h.drain();

        h.registry.start_all();
        let events = h.drain();
        let started: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::StatusChanged { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![b]);

        // Nada elegível não é erro
        let mut empty = Harness::new();
        empty.registry.stop_all();
        assert!(empty.drain().is_empty());
    }

    #[test]
    fn overflow_aborts_only_the_offending_session() {
        let mut h = Harness::new();
        let ids: Vec<_> = (0..3).map(|p| h.connect(p)).collect();
        h.drain();

        h.registry.ingest(ids[1], &vec![b'a'; MAX_BUFFER_SIZE + 1]);

        assert_eq!(h.registry.len(), 2);
        assert!(h.registry.get(ids[0]).is_some());
        assert!(h.registry.get(ids[1]).is_none());
        assert!(h.registry.get(ids[2]).is_some());

        // Remoção acontece uma única vez
        assert!(!h.registry.remove(ids[1]));
        let disconnects: Vec<_> = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::Disconnected(_)))
            .collect();
        assert_eq!(disconnects.len(), 1);
        assert!(matches!(disconnects[0], ServerEvent::Disconnected(id) if id == ids[1]));
    }

    #[test]
    fn oversized_frame_with_delimiter_aborts_the_session() {
        let mut h = Harness::new();
        let ids: Vec<_> = (0..2).map(|p| h.connect(p)).collect();
        h.drain();

        h.registry.ingest(ids[0], &vec![b'x'; MAX_BUFFER_SIZE]);
        assert_eq!(h.registry.len(), 2);

        let mut tail = vec![b'x'; 4000];
        tail.push(b'\n');
        h.registry.ingest(ids[0], &tail);

        assert!(h.registry.get(ids[0]).is_none());
        assert!(h.registry.get(ids[1]).is_some());
        let events = h.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Disconnected(id) if *id == ids[0])));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ServerEvent::DataReceived(_))));
    }

    #[test]
    fn telemetry_is_published_and_evaluated() {
        let mut h = Harness::new();
        let id = h.connect(1);
        h.drain();

        let status = Envelope::DeviceStatus(DeviceStatus {
            uptime: 30,
            cpu_usage: 95,
            memory_usage: 50,
        });
        h.registry.ingest(id, &frame(&status));

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerEvent::DataReceived(r)
            if r.client_id == id && r.envelope == status));
        assert!(matches!(&events[1], ServerEvent::ThresholdExceeded(a)
            if a.metric == Metric::CpuUsage && a.client_id == id && a.value == 95.0));
    }

    #[test]
    fn frames_split_across_reads_are_reassembled() {
        let mut h = Harness::new();
        let id = h.connect(1);
        h.drain();

        let metrics = Envelope::NetworkMetrics(NetworkMetrics {
            bandwidth: 99.5,
            latency: 12.0,
            packet_loss: 0.5,
        });
        let bytes = [frame(&metrics), frame(&metrics)].concat();
        for chunk in bytes.chunks(5) {
            h.registry.ingest(id, chunk);
        }

        let received = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::DataReceived(_)))
            .count();
        assert_eq!(received, 2);
    }

    #[test]
    fn bad_frames_are_discarded_and_connection_survives() {
        let mut h = Harness::new();
        let id = h.connect(1);
        h.drain();

        let mut bytes = b"{nao e json\n{\"type\":\"Heartbeat\"}\n".to_vec();
        bytes.extend(frame(&Envelope::confirm(5)));
        bytes.extend(frame(&Envelope::DeviceStatus(DeviceStatus::default())));
        h.registry.ingest(id, &bytes);

        let events = h.drain();
        let logs = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::Log(_)))
            .count();
        let data = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::DataReceived(_)))
            .count();
        assert_eq!(logs, 3);
        assert_eq!(data, 1);
        assert!(h.registry.get(id).is_some());
    }

    #[test]
    fn clear_removes_every_session() {
        let mut h = Harness::new();
        for p in 0..4 {
            h.connect(p);
        }
        h.drain();
        h.registry.clear();
        assert_eq!(h.registry.len(), 0);
        let disconnects = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::Disconnected(_)))
            .count();
        assert_eq!(disconnects, 4);
    }
}
