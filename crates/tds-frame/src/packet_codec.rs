//! TDS packet codec for tokio-util framing.

use bytes::{BufMut, BytesMut};
use tds_wire::packet::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// A TDS packet: header plus payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Packet payload (excluding the header).
    pub payload: BytesMut,
}

impl Packet {
    /// Create a new packet.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Total packet size including the header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Check if this is the last packet in a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// Packet-level codec: decodes a byte stream into [`Packet`]s and encodes
/// [`Packet`]s back, stamping the wrapping sequence number on the way out.
pub struct TdsCodec {
    /// Maximum packet size to accept or emit.
    max_packet_size: usize,
    /// Next outgoing packet sequence number.
    packet_id: u8,
}

impl TdsCodec {
    /// Create a codec with the protocol maximum packet size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_id: 1,
        }
    }

    /// Limit the accepted packet size (the value negotiated at login).
    pub fn set_max_packet_size(&mut self, size: usize) {
        self.max_packet_size = size.clamp(PACKET_HEADER_SIZE + 1, MAX_PACKET_SIZE);
    }

    /// The current maximum packet size.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        if self.packet_id == 0 {
            self.packet_id = 1;
        }
        id
    }

    /// Reset the outgoing sequence number (start of a new message).
    pub fn reset_packet_id(&mut self) {
        self.packet_id = 1;
    }
}

impl Default for TdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TdsCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // Length is at header bytes 2-3, big-endian, and includes the header.
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;

        if length < PACKET_HEADER_SIZE {
            return Err(FrameError::InvalidHeader);
        }
        if length > self.max_packet_size {
            return Err(FrameError::PacketTooLarge {
                size: length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let packet_bytes = src.split_to(length);
        let mut cursor = packet_bytes.as_ref();
        let header = PacketHeader::decode(&mut cursor)?;
        let payload = BytesMut::from(&packet_bytes[PACKET_HEADER_SIZE..]);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length,
            is_eom = header.is_end_of_message(),
            "decoded packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Packet> for TdsCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();

        if total_length > self.max_packet_size {
            return Err(FrameError::PacketTooLarge {
                size: total_length,
                max: self.max_packet_size,
            });
        }

        dst.reserve(total_length);

        let mut header = item.header;
        header.length = total_length as u16;
        header.packet_id = self.next_packet_id();

        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total_length,
            packet_id = header.packet_id,
            "encoded packet"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::packet::{PacketStatus, PacketType};

    #[test]
    fn decode_packet() {
        let mut codec = TdsCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12); // 8 header + 4 payload
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        data.put_slice(b"test");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.packet_type, PacketType::SqlBatch);
        assert!(packet.is_end_of_message());
        assert_eq!(&packet.payload[..], b"test");
    }

    #[test]
    fn encode_packet_stamps_length_and_id() {
        let mut codec = TdsCodec::new();

        let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 0);
        let packet = Packet::new(header, BytesMut::from(&b"test"[..]));

        let mut dst = BytesMut::new();
        codec.encode(packet, &mut dst).unwrap();

        assert_eq!(dst.len(), 12);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 12);
        assert_eq!(dst[6], 1); // packet id

        let packet2 = Packet::new(header, BytesMut::new());
        let mut dst2 = BytesMut::new();
        codec.encode(packet2, &mut dst2).unwrap();
        assert_eq!(dst2[6], 2); // sequence advanced
    }

    #[test]
    fn incomplete_packet_waits_for_more() {
        let mut codec = TdsCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::SqlBatch as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12); // claims 12 bytes
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        // payload missing

        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn oversize_packet_is_fatal() {
        let mut codec = TdsCodec::new();
        codec.set_max_packet_size(512);

        let mut data = BytesMut::new();
        data.put_u8(PacketType::TabularResult as u8);
        data.put_u8(0x00);
        data.put_u16(4096); // over the agreed limit
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);

        assert!(matches!(
            codec.decode(&mut data),
            Err(FrameError::PacketTooLarge { size: 4096, max: 512 })
        ));
    }

    #[test]
    fn undersize_length_is_fatal() {
        let mut codec = TdsCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::TabularResult as u8);
        data.put_u8(0x00);
        data.put_u16(4); // below header size
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);

        assert!(matches!(codec.decode(&mut data), Err(FrameError::InvalidHeader)));
    }
}
