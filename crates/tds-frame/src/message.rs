//! Multi-packet message reassembly.
//!
//! A TDS message spans one or more packets; the final packet carries the
//! END_OF_MESSAGE status bit. The assembler buffers payloads until then.
//! All packets of one message must share a packet type.

use bytes::{Bytes, BytesMut};
use tds_wire::packet::{PacketStatus, PacketType};

use crate::error::FrameError;
use crate::packet_codec::Packet;

/// A complete TDS message reassembled from one or more packets.
#[derive(Debug, Clone)]
pub struct Message {
    /// The packet type shared by the message's packets.
    pub packet_type: PacketType,
    /// The concatenated payload.
    pub payload: Bytes,
}

impl Message {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Reassembles packets into complete messages.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    packet_type: Option<PacketType>,
    packet_count: usize,
}

impl MessageAssembler {
    /// Create a new assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a packet.
    ///
    /// Returns `Ok(Some(message))` when the packet completes a message,
    /// `Ok(None)` when more packets are needed, and an error when the
    /// packet type changes mid-message.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Message>, FrameError> {
        match self.packet_type {
            None => self.packet_type = Some(packet.header.packet_type),
            Some(expected) if expected != packet.header.packet_type => {
                return Err(FrameError::PacketTypeChanged {
                    expected,
                    actual: packet.header.packet_type,
                });
            }
            Some(_) => {}
        }

        self.buffer.extend_from_slice(&packet.payload);
        self.packet_count += 1;

        tracing::trace!(
            packet_type = ?packet.header.packet_type,
            packet_count = self.packet_count,
            buffer_len = self.buffer.len(),
            is_eom = packet.header.status.contains(PacketStatus::END_OF_MESSAGE),
            "assembling message"
        );

        if packet.header.status.contains(PacketStatus::END_OF_MESSAGE) {
            let packet_type = self.packet_type.take().ok_or(FrameError::InvalidHeader)?;
            self.packet_count = 0;
            Ok(Some(Message {
                packet_type,
                payload: self.buffer.split().freeze(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Check if a message is partially assembled.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Packets accumulated for the current message.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Discard any partial message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.packet_type = None;
        self.packet_count = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::packet::PacketHeader;

    fn make_packet(packet_type: PacketType, is_eom: bool, payload: &[u8]) -> Packet {
        let status = if is_eom {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        Packet::new(
            PacketHeader::new(packet_type, status, 0),
            BytesMut::from(payload),
        )
    }

    #[test]
    fn single_packet_message() {
        let mut assembler = MessageAssembler::new();
        let packet = make_packet(PacketType::TabularResult, true, b"hello");

        let message = assembler.push(packet).unwrap().unwrap();
        assert_eq!(message.packet_type, PacketType::TabularResult);
        assert_eq!(&message.payload[..], b"hello");
        assert!(!assembler.has_partial());
    }

    #[test]
    fn multi_packet_message() {
        let mut assembler = MessageAssembler::new();

        assert!(assembler
            .push(make_packet(PacketType::TabularResult, false, b"hello "))
            .unwrap()
            .is_none());
        assert!(assembler.has_partial());
        assert_eq!(assembler.packet_count(), 1);

        assert!(assembler
            .push(make_packet(PacketType::TabularResult, false, b"world"))
            .unwrap()
            .is_none());

        let message = assembler
            .push(make_packet(PacketType::TabularResult, true, b"!"))
            .unwrap()
            .unwrap();
        assert_eq!(&message.payload[..], b"hello world!");
        assert!(!assembler.has_partial());
        assert_eq!(assembler.packet_count(), 0);
    }

    #[test]
    fn mid_stream_type_change_is_fatal() {
        let mut assembler = MessageAssembler::new();

        assembler
            .push(make_packet(PacketType::TabularResult, false, b"abc"))
            .unwrap();
        let err = assembler
            .push(make_packet(PacketType::SqlBatch, true, b"def"))
            .unwrap_err();
        assert!(matches!(err, FrameError::PacketTypeChanged { .. }));
    }

    #[test]
    fn clear_discards_partial() {
        let mut assembler = MessageAssembler::new();
        assembler
            .push(make_packet(PacketType::TabularResult, false, b"partial"))
            .unwrap();
        assert!(assembler.has_partial());

        assembler.clear();
        assert!(!assembler.has_partial());
    }

    #[test]
    fn empty_message() {
        let mut assembler = MessageAssembler::new();
        let message = assembler
            .push(make_packet(PacketType::TabularResult, true, b""))
            .unwrap()
            .unwrap();
        assert!(message.is_empty());
    }
}
