//! # tds-frame
//!
//! Async framing layer for TDS packets: splits the logical byte stream into
//! 8-byte-headed packets, reassembles multi-packet messages, and owns the
//! split-I/O connection that can send an out-of-band Attention (cancel)
//! signal while a read is in flight.
//!
//! ```text
//! byte stream → TdsCodec (packet framing) → MessageAssembler → client
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod message;
pub mod packet_codec;

pub use connection::{CancelHandle, Connection};
pub use error::FrameError;
pub use message::{Message, MessageAssembler};
pub use packet_codec::{Packet, TdsCodec};
