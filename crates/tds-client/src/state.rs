//! Connection session states.

/// Runtime state of a client session.
///
/// ```text
/// Disconnected → Negotiating → Idle ⇄ Busy → Idle | Failed
///                                     ↓
///                                  Draining → Idle
/// ```
///
/// Exactly one operation is in flight at a time; the state machine, not a
/// lock, enforces it. Once `Failed`, every operation short-circuits with a
/// not-connected error without touching the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket.
    Disconnected,
    /// Socket open, handshake in progress.
    Negotiating,
    /// Logged in and ready for a statement.
    Idle,
    /// A statement is in flight.
    Busy,
    /// Discarding tokens after an attention signal.
    Draining,
    /// Unusable after a socket, framing, or protocol failure.
    Failed,
}

impl SessionState {
    /// Whether a new statement may be submitted.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether a statement is currently being processed.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy | Self::Draining)
    }

    /// Whether the session can still carry traffic.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Negotiating => "negotiating",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Draining => "draining",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(SessionState::Idle.is_idle());
        assert!(SessionState::Busy.is_busy());
        assert!(SessionState::Draining.is_busy());
        assert!(!SessionState::Failed.is_usable());
        assert!(!SessionState::Disconnected.is_usable());
        assert!(SessionState::Negotiating.is_usable());
    }
}
