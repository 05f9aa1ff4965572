//! Device states and the transition table.
//!
//! `transition` is pure: it decides the next state and the ordered list of
//! side effects, and `SessionMachine` carries them out. Guards live here so
//! every event, however late or duplicated, goes through the same checks.

/// Top-level device mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No bridge connection.
    Disconnected,
    /// Connected, no session.
    Idle,
    /// Session active, microphone streaming.
    InSession,
    /// Session active, agent speech playing.
    Speaking,
}

impl DeviceState {
    /// Whether a session exists in this state.
    pub fn in_session(self) -> bool {
        matches!(self, Self::InSession | Self::Speaking)
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Idle => write!(f, "idle"),
            Self::InSession => write!(f, "in_session"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

/// Inputs that can move the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LinkConnected,
    LinkDisconnected,
    ShortPress,
    LongPress,
    SessionStarted { session_id: String },
    SessionEnded,
    AgentSpeakingStart,
    AgentSpeakingEnd,
}

/// Side effects, executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `device_info`.
    AnnounceDevice,
    /// Generate and record a fresh session id.
    OpenSession,
    /// Replace the recorded session id with the bridge's.
    RecordSessionId(String),
    SendStartSession,
    SendEndSession,
    ClearSession,
    EnsureCapture,
    IndicatorOn,
    IndicatorOff,
    /// Enter the low-power halt. Always last.
    Halt,
}

/// What `transition` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Apply `actions`, then move to `next` (which may equal the current state).
    Apply { next: DeviceState, actions: Vec<Action> },
    /// Not meaningful in this state; dropped silently.
    Ignored,
    /// Guard violation; dropped with a diagnostic.
    Rejected(&'static str),
}

fn apply(next: DeviceState, actions: Vec<Action>) -> Outcome {
    Outcome::Apply { next, actions }
}

/// The session end sequence shared by the button and the long press.
fn end_sequence() -> Vec<Action> {
    vec![
        Action::SendEndSession,
        Action::ClearSession,
        Action::EnsureCapture,
        Action::IndicatorOff,
    ]
}

/// Single dispatch over (state, event).
pub fn transition(state: DeviceState, event: &SessionEvent) -> Outcome {
    use DeviceState::*;
    use SessionEvent as E;

    match (state, event) {
        // Halt is reachable from anywhere, ending the session politely first.
        (s, E::LongPress) => {
            let mut actions = if s.in_session() { end_sequence() } else { Vec::new() };
            actions.push(Action::Halt);
            let next = if s.in_session() { Idle } else { s };
            apply(next, actions)
        }

        (Disconnected, E::LinkConnected) => {
            apply(Idle, vec![Action::AnnounceDevice, Action::IndicatorOff])
        }
        (Disconnected, E::ShortPress) => Outcome::Rejected("not connected to bridge"),
        (Disconnected, _) => Outcome::Ignored,

        (_, E::LinkDisconnected) => {
            apply(Disconnected, vec![Action::ClearSession, Action::IndicatorOff])
        }
        (_, E::LinkConnected) => Outcome::Ignored,

        (Idle, E::ShortPress) => apply(
            InSession,
            vec![
                Action::OpenSession,
                Action::EnsureCapture,
                Action::SendStartSession,
                Action::IndicatorOn,
            ],
        ),
        (InSession | Speaking, E::ShortPress) => apply(Idle, end_sequence()),

        (InSession | Speaking, E::SessionStarted { session_id }) => {
            apply(state, vec![Action::RecordSessionId(session_id.clone())])
        }
        (Idle, E::SessionStarted { .. }) => Outcome::Rejected("session_started without a session"),

        (InSession | Speaking, E::SessionEnded) => {
            apply(Idle, vec![Action::ClearSession, Action::IndicatorOff])
        }
        (Idle, E::SessionEnded) => Outcome::Rejected("session_ended without a session"),

        (InSession, E::AgentSpeakingStart) => apply(Speaking, Vec::new()),
        (Speaking, E::AgentSpeakingStart) => Outcome::Ignored,
        (Idle, E::AgentSpeakingStart) => Outcome::Rejected("agent speaking without a session"),

        (Speaking, E::AgentSpeakingEnd) => apply(InSession, vec![Action::EnsureCapture]),
        (Idle | InSession, E::AgentSpeakingEnd) => Outcome::Ignored,
    }
}
