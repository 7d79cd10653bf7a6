//! Per-connection session state.
//!
//! ```text
//! AwaitingHandshake ──compatible──► Serving ──eof / error / close──► Closed
//!         │                                                            ▲
//!         └──────────────incompatible / violation / timeout────────────┘
//! ```

use std::fmt;

use crate::error::{Result, RpcError};
use crate::protocol::FrameKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    AwaitingHandshake,
    Serving,
    Closed,
}

impl SessionState {
    /// Whether a frame of `kind` may be sent or processed in this state.
    pub fn accepts(self, kind: FrameKind) -> bool {
        match self {
            SessionState::AwaitingHandshake => kind.is_handshake(),
            SessionState::Serving => !kind.is_handshake(),
            SessionState::Closed => false,
        }
    }

    /// Reject frames that are illegal in the current state.
    pub fn check_frame(self, kind: FrameKind) -> Result<()> {
        if self.accepts(kind) {
            Ok(())
        } else {
            Err(RpcError::Protocol(format!(
                "{:?} frame not allowed while {}",
                kind, self
            )))
        }
    }

    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingHandshake => "awaiting handshake",
            SessionState::Serving => "serving",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State holder enforcing legal transitions.
#[derive(Debug)]
pub struct Session {
    role: &'static str,
    state: SessionState,
}

impl Session {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            state: SessionState::AwaitingHandshake,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `AwaitingHandshake -> Serving`.
    pub fn start_serving(&mut self) -> Result<()> {
        match self.state {
            SessionState::AwaitingHandshake => {
                self.transition(SessionState::Serving);
                Ok(())
            }
            other => Err(RpcError::Protocol(format!(
                "handshake completed while {}",
                other
            ))),
        }
    }

    /// Any state to `Closed`; closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.state.is_closed() {
            self.transition(SessionState::Closed);
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(role = self.role, from = %self.state, to = %next, "Session transition");
        self.state = next;
    }
}
