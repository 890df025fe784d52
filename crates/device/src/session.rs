//! Máquina de estados da sessão do dispositivo.
//!
//! A função [`transition`] é pura: recebe o estado atual e um evento e
//! devolve o próximo estado com as ações que o reator deve executar. Pares
//! (estado, evento) fora da tabela são rejeitados sem mudar nada.

use std::fmt;
use telemetry_core::types::ClientId;

/// Estado do ciclo de vida da conexão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Disconnected,
    Connecting,
    WaitingConfirmation,
    WaitingStart,
    Running,
    Stopped,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Disconnected => "Disconnected",
            ClientState::Connecting => "Connecting",
            ClientState::WaitingConfirmation => "WaitingConfirmation",
            ClientState::WaitingStart => "WaitingStart",
            ClientState::Running => "Running",
            ClientState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Eventos que alimentam a máquina.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Pedido de conexão (inicial ou disparado pelo timer de reconexão)
    ConnectRequested,
    TransportConnected,
    TransportError,
    ConfirmReceived(ClientId),
    StartReceived,
    StopReceived,
    TransportDisconnected,
    DisconnectRequested,
}

/// Efeitos colaterais pedidos ao reator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenConnection,
    CloseConnection,
    NotifyConnected,
    ScheduleReconnect,
    CancelReconnect,
    ScheduleEmission,
    CancelEmission,
}

/// Resultado de uma transição aceita.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ClientState,
    pub actions: Vec<Action>,
}

impl Transition {
    fn to(next: ClientState, actions: &[Action]) -> Self {
        Self {
            next,
            actions: actions.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Evento {event:?} não é válido no estado {state}")]
    Invalid {
        state: ClientState,
        event: SessionEvent,
    },
}

/// Tabela de transições.
pub fn transition(state: ClientState, event: SessionEvent) -> Result<Transition, TransitionError> {
    use Action::*;
    use ClientState::*;
    use SessionEvent::*;

    let t = match (state, event) {
        // Válidos em qualquer estado
        (_, DisconnectRequested) => Transition::to(
            Disconnected,
            &[CancelReconnect, CancelEmission, CloseConnection],
        ),
        (Disconnected, TransportDisconnected) => {
            Transition::to(Disconnected, &[CancelEmission, CloseConnection])
        }
        (_, TransportDisconnected) => Transition::to(
            Disconnected,
            &[CancelEmission, CloseConnection, ScheduleReconnect],
        ),

        (Disconnected | Connecting, ConnectRequested) => {
            Transition::to(Connecting, &[OpenConnection])
        }
        (Connecting, TransportConnected) => Transition::to(WaitingConfirmation, &[NotifyConnected]),
        // Permanece em Connecting até o timer disparar
        (Connecting, TransportError) => Transition::to(Connecting, &[ScheduleReconnect]),
        (WaitingConfirmation, ConfirmReceived(_)) => Transition::to(WaitingStart, &[]),
        (WaitingStart | Stopped, StartReceived) => Transition::to(Running, &[ScheduleEmission]),
        (Running, StopReceived) => Transition::to(Stopped, &[CancelEmission]),

        (state, event) => return Err(TransitionError::Invalid { state, event }),
    };

    Ok(t)
}

/// Estado da sessão + identidade atribuída pelo coletor.
#[derive(Debug, Default)]
pub struct Session {
    state: ClientState,
    client_id: Option<ClientId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Aplica um evento. Em caso de erro nada muda.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<Action>, TransitionError> {
        let t = transition(self.state, event)?;

        match event {
            SessionEvent::ConfirmReceived(id) => self.client_id = Some(id),
            SessionEvent::TransportDisconnected | SessionEvent::DisconnectRequested => {
                self.client_id = None
            }
            _ => {}
        }

        self.state = t.next;
        Ok(t.actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClientState::*;
    use SessionEvent::*;

    const ALL_STATES: [ClientState; 6] = [
        Disconnected,
        Connecting,
        WaitingConfirmation,
        WaitingStart,
        Running,
        Stopped,
    ];

    #[test]
    fn handshake_reaches_running_then_stopped() {
        let mut s = Session::new();
        assert_eq!(s.handle(ConnectRequested).unwrap(), vec![Action::OpenConnection]);
        assert_eq!(s.handle(TransportConnected).unwrap(), vec![Action::NotifyConnected]);
        assert_eq!(s.state(), WaitingConfirmation);
        s.handle(ConfirmReceived(17)).unwrap();
        assert_eq!(s.state(), WaitingStart);
        assert_eq!(s.handle(StartReceived).unwrap(), vec![Action::ScheduleEmission]);
        assert_eq!(s.state(), Running);
        assert_eq!(s.client_id(), Some(17));

        assert_eq!(s.handle(StopReceived).unwrap(), vec![Action::CancelEmission]);
        assert_eq!(s.state(), Stopped);
        assert_eq!(s.client_id(), Some(17));
    }

    #[test]
    fn stopped_client_can_be_started_again() {
        let t = transition(Stopped, StartReceived).unwrap();
        assert_eq!(t.next, Running);
    }

    #[test]
    fn connect_failure_stays_connecting_and_schedules_reconnect() {
        let t = transition(Connecting, TransportError).unwrap();
        assert_eq!(t.next, Connecting);
        assert_eq!(t.actions, vec![Action::ScheduleReconnect]);

        // O timer re-entra pelo mesmo caminho de conexão
        let t = transition(Connecting, ConnectRequested).unwrap();
        assert_eq!(t.next, Connecting);
        assert_eq!(t.actions, vec![Action::OpenConnection]);
    }

    #[test]
    fn transport_loss_clears_identity_and_reconnects() {
        let mut s = Session::new();
        for ev in [ConnectRequested, TransportConnected, ConfirmReceived(2), StartReceived] {
            s.handle(ev).unwrap();
        }
        let actions = s.handle(TransportDisconnected).unwrap();
        assert_eq!(s.state(), Disconnected);
        assert_eq!(s.client_id(), None);
        assert!(actions.contains(&Action::ScheduleReconnect));
        assert!(actions.contains(&Action::CancelEmission));
    }

    #[test]
    fn transport_loss_while_disconnected_does_not_reconnect() {
        let t = transition(Disconnected, TransportDisconnected).unwrap();
        assert!(!t.actions.contains(&Action::ScheduleReconnect));
    }

    #[test]
    fn explicit_disconnect_cancels_everything_from_any_state() {
        for state in ALL_STATES {
            let t = transition(state, DisconnectRequested).unwrap();
            assert_eq!(t.next, Disconnected);
            assert!(t.actions.contains(&Action::CancelReconnect));
            assert!(t.actions.contains(&Action::CancelEmission));
            assert!(!t.actions.contains(&Action::ScheduleReconnect));
        }
    }

    #[test]
    fn unlisted_transitions_are_rejected() {
        let rejected = [
            (Disconnected, StartReceived),
            (Disconnected, TransportConnected),
            (Connecting, ConfirmReceived(1)),
            (WaitingConfirmation, StartReceived),
            (WaitingStart, ConfirmReceived(1)),
            (WaitingStart, StopReceived),
            (Running, StartReceived),
            (Running, ConnectRequested),
            (Running, TransportError),
            (Stopped, StopReceived),
        ];
        for (state, event) in rejected {
            assert_eq!(
                transition(state, event),
                Err(TransitionError::Invalid { state, event }),
                "{state} + {event:?}"
            );
        }
    }

    #[test]
    fn rejected_event_leaves_session_untouched() {
        let mut s = Session::new();
        assert!(s.handle(StopReceived).is_err());
        assert_eq!(s.state(), Disconnected);
        assert_eq!(s.client_id(), None);
    }
}
