//! Session state machine

use crate::{Error, Result};

/// Phase of a proxied session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, nothing read yet
    Initial,

    /// SSLRequest answered, TLS handshake with the client in progress
    NegotiatingTls,

    /// TLS established, awaiting the client's StartupMessage
    AwaitingStartup,

    /// Dialing the backend and negotiating TLS with it
    ConnectingBackend,

    /// Bytes flowing in both directions
    Relaying,

    /// Closed
    Closed,
}

impl SessionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Initial, NegotiatingTls)
                | (NegotiatingTls, AwaitingStartup)
                | (AwaitingStartup, ConnectingBackend)
                | (ConnectingBackend, Relaying)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        tracing::trace!(from = %self, to = %next, "session state transition");
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::NegotiatingTls => write!(f, "negotiating_tls"),
            Self::AwaitingStartup => write!(f, "awaiting_startup"),
            Self::ConnectingBackend => write!(f, "connecting_backend"),
            Self::Relaying => write!(f, "relaying"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
