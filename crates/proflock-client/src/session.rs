//! Auth/session state as observed by the coordinator.
//!
//! Global refreshes only run after session initialisation has finished and
//! the session is authenticated. [`SessionGate`] is a cloneable handle over a
//! `watch` channel so the refresher can react when initialisation completes
//! and the HTTP client can pick up the current bearer token.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Auth provider has not finished starting up.
    Initializing,
    /// Signed in. The token is absent when the backend relies on cookies.
    Authenticated { token: Option<String> },
    /// Initialisation finished without a session, or the user signed out.
    Anonymous,
}

#[derive(Clone)]
pub struct SessionGate {
    tx: Arc<watch::Sender<SessionState>>,
}

impl SessionGate {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        SessionGate { tx: Arc::new(tx) }
    }

    pub fn initializing() -> Self {
        Self::new(SessionState::Initializing)
    }

    pub fn authenticated(token: Option<String>) -> Self {
        Self::new(SessionState::Authenticated { token })
    }

    pub fn sign_in(&self, token: Option<String>) {
        self.tx.send_replace(SessionState::Authenticated { token });
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(SessionState::Anonymous);
    }

    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(*self.tx.borrow(), SessionState::Initializing)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.tx.borrow(), SessionState::Authenticated { .. })
    }

    pub fn bearer_token(&self) -> Option<String> {
        match &*self.tx.borrow() {
            SessionState::Authenticated { token } => token.clone(),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token.
        let state = match &*self.tx.borrow() {
            SessionState::Initializing => "initializing",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Anonymous => "anonymous",
        };
        f.debug_struct("SessionGate").field("state", &state).finish()
    }
}
