//! Client error taxonomy and server message classification.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A structured server message, from an ERROR or INFO token.
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// Server message number.
    pub number: i32,
    /// Severity class (0-25).
    pub severity: u8,
    /// Server state byte.
    pub state: u8,
    /// Message text.
    pub message: String,
    /// Reporting server name.
    pub server: Option<String>,
    /// Originating procedure, if any.
    pub procedure: Option<String>,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl ServerMessage {
    /// Informational message (severity 10 and below): the statement
    /// continues and the message is surfaced as a warning.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.severity <= 10
    }

    /// Severity at which the server terminates the session itself.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity >= 20
    }
}

impl std::fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "server message {} (severity {}, state {}): {}",
            self.number, self.severity, self.state, self.message
        )
    }
}

impl From<tds_wire::ServerError> for ServerMessage {
    fn from(err: tds_wire::ServerError) -> Self {
        Self {
            number: err.number,
            severity: err.class,
            state: err.state,
            message: err.message,
            server: none_if_empty(err.server),
            procedure: none_if_empty(err.procedure),
            line: err.line,
        }
    }
}

impl From<tds_wire::ServerInfo> for ServerMessage {
    fn from(info: tds_wire::ServerInfo) -> Self {
        Self {
            number: info.number,
            severity: info.class,
            state: info.state,
            message: info.message,
            server: none_if_empty(info.server),
            procedure: none_if_empty(info.procedure),
            line: info.line,
        }
    }
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Errors surfaced by client operations.
///
/// Every failed operation yields exactly one of these; warnings collected
/// alongside a successful result live on the cursor instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation attempted on a connection that is closed or failed.
    #[error("not connected")]
    NotConnected,

    /// A statement is already in flight on this connection.
    #[error("connection busy with another statement")]
    Busy,

    /// The in-flight statement was cancelled via the attention signal.
    #[error("statement cancelled")]
    Cancelled,

    /// Login was rejected by the server.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The peers could not agree on a protocol dialect.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The TCP connection could not be established in time.
    #[error("connect timed out")]
    ConnectTimeout,

    /// A read did not complete within the configured timeout. The
    /// connection is left failed; mid-message resumption is not attempted.
    #[error("read timed out")]
    ReadTimeout,

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The statement was aborted by a server-reported error. The
    /// connection itself remains usable.
    #[error("{0}")]
    Server(Box<ServerMessage>),

    /// Framing or socket failure; the connection is unusable.
    #[error("connection error: {0}")]
    Connection(#[from] tds_frame::FrameError),

    /// Token or field decoding failure; indicates client/server skew and
    /// leaves the connection unusable.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_wire::ProtocolError),

    /// Value decoding failure.
    #[error("type error: {0}")]
    Type(#[from] tds_values::TypeError),

    /// Transport I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a server error from an ERROR token.
    #[must_use]
    pub fn server(message: ServerMessage) -> Self {
        Self::Server(Box::new(message))
    }

    /// Whether retrying the operation on a fresh connection could succeed.
    ///
    /// The client never retries by itself; this supports caller-side
    /// reconnect policies.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout
                | Self::ReadTimeout
                | Self::ConnectionClosed
                | Self::Cancelled
                | Self::Io(_)
        )
    }

    /// Severity class when this is a server-reported error.
    #[must_use]
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Server(message) => Some(message.severity),
            _ => None,
        }
    }

    /// Server error number when this is a server-reported error.
    #[must_use]
    pub fn server_number(&self) -> Option<i32> {
        match self {
            Self::Server(message) => Some(message.number),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(number: i32, severity: u8) -> ServerMessage {
        ServerMessage {
            number,
            severity,
            state: 1,
            message: "boom".to_string(),
            server: None,
            procedure: None,
            line: 1,
        }
    }

    #[test]
    fn severity_classification() {
        assert!(message(5701, 10).is_warning());
        assert!(!message(8134, 16).is_warning());
        assert!(message(9002, 21).is_fatal());
        assert!(!message(8134, 16).is_fatal());
    }

    #[test]
    fn transient_classification() {
        assert!(Error::ReadTimeout.is_transient());
        assert!(Error::ConnectionClosed.is_transient());
        assert!(!Error::Busy.is_transient());
        assert!(!Error::server(message(8134, 16)).is_transient());
    }

    #[test]
    fn server_error_accessors() {
        let err = Error::server(message(8134, 16));
        assert_eq!(err.severity(), Some(16));
        assert_eq!(err.server_number(), Some(8134));
        assert_eq!(Error::Busy.severity(), None);
    }
}
