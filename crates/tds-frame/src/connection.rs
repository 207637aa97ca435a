//! Split-I/O framed connection.
//!
//! The transport is split into read and write halves so an Attention
//! (cancel) packet can be written while the owning task is blocked reading
//! a result. The write half sits behind a mutex shared with any number of
//! [`CancelHandle`]s; the read half stays with the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tds_wire::packet::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::FrameError;
use crate::message::{Message, MessageAssembler};
use crate::packet_codec::{Packet, TdsCodec};

/// A framed TDS connection over an async transport.
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: FramedRead<ReadHalf<T>, TdsCodec>,
    writer: Arc<Mutex<FramedWrite<WriteHalf<T>, TdsCodec>>>,
    assembler: MessageAssembler,
    cancel_notify: Arc<Notify>,
    cancelling: Arc<AtomicBool>,
    cancel_acked: bool,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a connection, splitting the transport into halves.
    pub fn new(transport: T) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: FramedRead::new(read_half, TdsCodec::new()),
            writer: Arc::new(Mutex::new(FramedWrite::new(write_half, TdsCodec::new()))),
            assembler: MessageAssembler::new(),
            cancel_notify: Arc::new(Notify::new()),
            cancelling: Arc::new(AtomicBool::new(false)),
            cancel_acked: false,
        }
    }

    /// Get a cloneable handle for cancelling the in-flight request.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            writer: Arc::clone(&self.writer),
            notify: Arc::clone(&self.cancel_notify),
            cancelling: Arc::clone(&self.cancelling),
        }
    }

    /// Check if a cancellation is in progress.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }

    /// Consume the cancel-acknowledged marker set when draining completes.
    ///
    /// Lets the caller tell a cancel-drained `read_message() == None` apart
    /// from the server closing the stream.
    pub fn take_cancel_ack(&mut self) -> bool {
        std::mem::take(&mut self.cancel_acked)
    }

    /// Record that the attention acknowledgment arrived inside a normally
    /// read message, clearing the cancel-in-progress flag.
    ///
    /// Without this, the next read would enter drain mode and discard a
    /// response that was never cancelled.
    pub fn acknowledge_cancel(&mut self) {
        if self.is_cancelling() {
            self.finish_cancel();
        }
    }

    /// Apply a negotiated packet size to both framing directions.
    pub async fn set_packet_size(&mut self, size: usize) {
        self.reader.decoder_mut().set_max_packet_size(size);
        self.writer.lock().await.encoder_mut().set_max_packet_size(size);
    }

    /// Read the next complete message, reassembling packets.
    ///
    /// Returns `Ok(None)` on clean end of stream, or after cancel draining
    /// completes. A stream that closes mid-message is an error.
    pub async fn read_message(&mut self) -> Result<Option<Message>, FrameError> {
        loop {
            if self.is_cancelling() {
                return self.drain_after_cancel().await;
            }

            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet)? {
                        return Ok(Some(message));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if self.assembler.has_partial() {
                        return Err(FrameError::ConnectionClosed);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Send a complete message, chunking the payload to the negotiated
    /// packet size with END_OF_MESSAGE on the final packet.
    pub async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
        max_packet_size: usize,
    ) -> Result<(), FrameError> {
        let max_payload = max_packet_size.saturating_sub(PACKET_HEADER_SIZE).max(1);

        let mut writer = self.writer.lock().await;
        writer.encoder_mut().reset_packet_id();

        // An empty payload still sends one (empty) packet.
        let chunks: Vec<&[u8]> = if payload.is_empty() {
            vec![&[]]
        } else {
            payload.chunks(max_payload).collect()
        };
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let status = if i == last {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };

            let header = PacketHeader::new(packet_type, status, 0);
            writer.send(Packet::new(header, BytesMut::from(chunk))).await?;
        }

        writer.flush().await?;
        Ok(())
    }

    /// Drain packets after a cancel until the server acknowledges with a
    /// DONE token carrying the attention flag.
    async fn drain_after_cancel(&mut self) -> Result<Option<Message>, FrameError> {
        tracing::debug!("draining response after attention");

        self.assembler.clear();

        loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if packet.header.packet_type == PacketType::TabularResult
                        && contains_attention_ack(&packet.payload)
                    {
                        tracing::debug!("attention acknowledged");
                        self.cancel_acked = true;
                        self.finish_cancel();
                        return Ok(None);
                    }
                }
                Some(Err(e)) => {
                    self.finish_cancel();
                    return Err(e);
                }
                None => {
                    self.finish_cancel();
                    return Ok(None);
                }
            }
        }
    }

    fn finish_cancel(&self) {
        self.cancelling.store(false, Ordering::Release);
        self.cancel_notify.notify_waiters();
    }
}

/// Scan a payload for a DONE token (0xFD) whose status carries the
/// attention-ack bit (0x0020).
fn contains_attention_ack(payload: &[u8]) -> bool {
    payload.windows(3).any(|window| {
        window[0] == 0xFD && (u16::from_le_bytes([window[1], window[2]]) & 0x0020) != 0
    })
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("cancelling", &self.cancelling.load(Ordering::Acquire))
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}

/// Handle for cancelling the in-flight request on a connection.
///
/// Cloneable and sendable to other tasks; writes the Attention packet
/// through the shared write half.
pub struct CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<FramedWrite<WriteHalf<T>, TdsCodec>>>,
    notify: Arc<Notify>,
    cancelling: Arc<AtomicBool>,
}

impl<T> CancelHandle<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Send an Attention packet, marking cancellation in progress.
    ///
    /// Safe to call while another task is blocked reading the response;
    /// that read switches to draining until the server acknowledges.
    pub async fn cancel(&self) -> Result<(), FrameError> {
        self.cancelling.store(true, Ordering::Release);

        tracing::debug!("sending attention packet");

        let mut writer = self.writer.lock().await;
        let header = PacketHeader::new(
            PacketType::Attention,
            PacketStatus::END_OF_MESSAGE,
            PACKET_HEADER_SIZE as u16,
        );
        writer.send(Packet::new(header, BytesMut::new())).await?;
        writer.flush().await?;

        Ok(())
    }

    /// Wait until the server has acknowledged the cancellation.
    pub async fn cancelled(&self) {
        if self.cancelling.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }

    /// Check if a cancellation is in progress.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }
}

impl<T> Clone for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            notify: Arc::clone(&self.notify),
            cancelling: Arc::clone(&self.cancelling),
        }
    }
}

impl<T> std::fmt::Debug for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelling", &self.cancelling.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn attention_ack_detection() {
        // DONE with attention flag
        let with_attn = [0xFDu8, 0x20, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(contains_attention_ack(&with_attn));

        // DONE without attention flag
        let without = [0xFDu8, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(!contains_attention_ack(&without));
    }

    #[tokio::test]
    async fn send_message_chunks_to_packet_size() {
        let (client, server) = tokio::io::duplex(65536);
        let mut conn = Connection::new(client);

        // 600 payload bytes at a 512-byte packet size: two packets.
        let payload = Bytes::from(vec![0xABu8; 600]);
        conn.send_message(PacketType::SqlBatch, payload, 512)
            .await
            .unwrap();
        drop(conn);

        let mut reader = FramedRead::new(server, TdsCodec::new());
        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.payload.len(), 504);
        assert!(!first.is_end_of_message());
        assert_eq!(first.header.packet_id, 1);

        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(second.payload.len(), 96);
        assert!(second.is_end_of_message());
        assert_eq!(second.header.packet_id, 2);
    }

    #[tokio::test]
    async fn reassemble_round_trip() {
        let (client, server) = tokio::io::duplex(65536);
        let mut sender = Connection::new(client);
        let mut receiver = Connection::new(server);

        let payload = Bytes::from((0..=255u8).cycle().take(2000).collect::<Vec<_>>());
        sender
            .send_message(PacketType::TabularResult, payload.clone(), 512)
            .await
            .unwrap();

        let message = receiver.read_message().await.unwrap().unwrap();
        assert_eq!(message.packet_type, PacketType::TabularResult);
        assert_eq!(message.payload, payload);
    }

    #[tokio::test]
    async fn exact_multiple_payload_round_trips() {
        let (client, server) = tokio::io::duplex(65536);
        let mut sender = Connection::new(client);
        let mut receiver = Connection::new(server);

        // Exactly two full chunks at a 512-byte packet size.
        let payload = Bytes::from(vec![0x5Au8; (512 - PACKET_HEADER_SIZE) * 2]);
        sender
            .send_message(PacketType::TabularResult, payload.clone(), 512)
            .await
            .unwrap();

        let message = receiver.read_message().await.unwrap().unwrap();
        assert_eq!(message.payload, payload);
    }

    #[tokio::test]
    async fn empty_payload_sends_one_packet() {
        let (client, server) = tokio::io::duplex(4096);
        let mut sender = Connection::new(client);
        let mut receiver = Connection::new(server);

        sender
            .send_message(PacketType::Attention, Bytes::new(), 4096)
            .await
            .unwrap();

        let message = receiver.read_message().await.unwrap().unwrap();
        assert_eq!(message.packet_type, PacketType::Attention);
        assert!(message.is_empty());
    }

    #[tokio::test]
    async fn closed_mid_message_is_error() {
        let (client, server) = tokio::io::duplex(4096);

        // Send a single non-final packet, then close the stream.
        let mut writer = FramedWrite::new(client, TdsCodec::new());
        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::NORMAL, 0);
        writer
            .send(Packet::new(header, BytesMut::from(&b"partial"[..])))
            .await
            .unwrap();
        drop(writer);

        let mut receiver = Connection::new(server);
        assert!(matches!(
            receiver.read_message().await,
            Err(FrameError::ConnectionClosed)
        ));
    }
}
