//! One run of the tester lifecycle.

use std::time::Duration;

use serde::Serialize;

use crate::tester::error::FailureKind;
use crate::tester::port::PortLease;

/// Lifecycle state of a session.
///
/// ```text
/// Idle ─▶ Starting ─▶ WaitingReady ─▶ Running ─▶ Stopping ─▶ Succeeded | Failed
///   │         │             │                       ▲
///   └─────────┴─────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Starting,
    WaitingReady,
    Running,
    Stopping,
    Succeeded,
    Failed,
}

impl SessionState {
    /// Whether the session is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Succeeded | Failed, _) => false,
            (_, Stopping) => *self != Stopping,
            (Idle, Starting) => true,
            (Starting, WaitingReady) => true,
            (WaitingReady, Running) => true,
            (Stopping, Succeeded | Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::WaitingReady => "waiting-ready",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State owned by a single `run()` call.
///
/// Hooks read the port and base URL from here, and `start` registers the
/// resource it creates so teardown knows what to release.
#[derive(Debug)]
pub struct TesterSession {
    tester: String,
    lease: Option<PortLease>,
    port: u16,
    base_url: String,
    resource: Option<String>,
    started: bool,
    state: SessionState,
    history: Vec<SessionState>,
}

impl TesterSession {
    /// Create an idle session for the named tester.
    pub fn new(tester: impl Into<String>) -> Self {
        Self {
            tester: tester.into(),
            lease: None,
            port: 0,
            base_url: String::new(),
            resource: None,
            started: false,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    /// Attach the port lease and derive the base URL from it.
    pub fn bind_port(&mut self, lease: PortLease) {
        self.port = lease.port();
        self.base_url = format!("http://127.0.0.1:{}", self.port);
        self.lease = Some(lease);
    }

    /// Let the target bind the leased port.
    pub(crate) fn release_port_socket(&mut self) {
        if let Some(lease) = self.lease.as_mut() {
            lease.release_socket();
        }
    }

    /// Name of the tester that owns this session.
    pub fn tester(&self) -> &str {
        &self.tester
    }

    /// Leased port, 0 before acquisition.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://127.0.0.1:{port}`, empty before acquisition.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Record the resource created by `start` (container or process name).
    ///
    /// Call this before any step that may leave a partial resource behind.
    pub fn register_resource(&mut self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(tester = %self.tester, resource = %name, "Registered resource");
        self.resource = Some(name);
    }

    /// The registered resource, if any.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    /// Whether teardown has something to release.
    pub fn needs_stop(&self) -> bool {
        self.started || self.resource.is_some()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// States visited so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Move to `next`. Illegal transitions are refused and logged.
    pub(crate) fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                tester = %self.tester,
                from = %self.state,
                to = %next,
                "Refused illegal session transition"
            );
            debug_assert!(false, "illegal transition {} -> {}", self.state, next);
            return false;
        }

        tracing::debug!(tester = %self.tester, from = %self.state, to = %next, "Session transition");
        self.state = next;
        self.history.push(next);
        true
    }

    /// Snapshot the session for reporting.
    pub fn report(&self, elapsed: Duration, ready_after: Option<Duration>) -> SessionReport {
        SessionReport {
            tester: self.tester.clone(),
            port: self.port,
            base_url: self.base_url.clone(),
            resource: self.resource.clone(),
            history: self.history.clone(),
            ready_after,
            elapsed,
            failure: None,
        }
    }
}

/// What a finished session went through.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub tester: String,
    pub port: u16,
    pub base_url: String,
    pub resource: Option<String>,
    pub history: Vec<SessionState>,
    /// Time from the first probe to the successful one.
    pub ready_after: Option<Duration>,
    pub elapsed: Duration,
    pub failure: Option<FailureKind>,
}

impl SessionReport {
    /// Final state of the session.
    pub fn final_state(&self) -> SessionState {
        self.history.last().copied().unwrap_or(SessionState::Idle)
    }

    /// Whether the session ended in `Succeeded`.
    pub fn succeeded(&self) -> bool {
        self.final_state() == SessionState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 7] = [
        Idle,
        Starting,
        WaitingReady,
        Running,
        Stopping,
        Succeeded,
        Failed,
    ];

    #[test]
    fn test_stopping_reachable_from_every_non_terminal_state() {
        for state in [Idle, Starting, WaitingReady, Running] {
            assert!(state.can_transition_to(Stopping), "{state} -> stopping");
        }
    }

    #[test]
    fn test_terminal_states_have_no_successor() {
        for next in ALL {
            assert!(!Succeeded.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_terminal_only_through_stopping() {
        for from in ALL {
            if from != Stopping {
                assert!(!from.can_transition_to(Succeeded));
                assert!(!from.can_transition_to(Failed));
            }
        }
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!Idle.can_transition_to(WaitingReady));
        assert!(!Starting.can_transition_to(Running));
        assert!(!Running.can_transition_to(WaitingReady));
        assert!(!Stopping.can_transition_to(Stopping));
    }

    #[test]
    fn test_happy_path_history() {
        let mut session = TesterSession::new("demo");
        for next in [Starting, WaitingReady, Running, Stopping, Succeeded] {
            assert!(session.advance(next));
        }
        assert_eq!(
            session.history(),
            &[Idle, Starting, WaitingReady, Running, Stopping, Succeeded]
        );
        assert!(session.state().is_terminal());
    }

    #[test]
    fn test_bind_port_derives_base_url() {
        let mut session = TesterSession::new("demo");
        let lease = PortLease::acquire().unwrap();
        let port = lease.port();
        session.bind_port(lease);

        assert_eq!(session.port(), port);
        assert_eq!(session.base_url(), format!("http://127.0.0.1:{}", port));
    }

    #[test]
    fn test_needs_stop() {
        let mut session = TesterSession::new("demo");
        assert!(!session.needs_stop());

        session.register_resource("demo-4000");
        assert!(session.needs_stop());
        assert_eq!(session.resource(), Some("demo-4000"));

        let mut started = TesterSession::new("demo");
        started.mark_started();
        assert!(started.needs_stop());
    }
}
