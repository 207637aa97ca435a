//! Framing error definitions.

use thiserror::Error;

/// Errors from the packet framing and message reassembly layer.
///
/// All variants are fatal for the connection: a framing failure means the
/// byte stream can no longer be trusted and the socket must be closed.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A packet header declared a length below the header size.
    #[error("invalid packet header")]
    InvalidHeader,

    /// A packet header declared a length above the agreed maximum.
    #[error("packet of {size} bytes exceeds maximum {max}")]
    PacketTooLarge {
        /// Declared packet size.
        size: usize,
        /// Agreed maximum.
        max: usize,
    },

    /// The packet type changed in the middle of a message.
    #[error("packet type changed mid-message: {expected:?} then {actual:?}")]
    PacketTypeChanged {
        /// Type of the message's first packet.
        expected: tds_wire::PacketType,
        /// Type of the offending packet.
        actual: tds_wire::PacketType,
    },

    /// The stream closed while a message was partially assembled.
    #[error("connection closed mid-message")]
    ConnectionClosed,

    /// Protocol-level failure while decoding a header.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_wire::ProtocolError),

    /// Transport I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
