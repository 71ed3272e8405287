//! A framed message connection over one byte stream.
//!
//! [`Transport`] owns a stream (in production a TLS stream over TCP) plus a
//! reusable receive buffer. It turns messages into frames on the way out and
//! frames back into messages on the way in.
//!
//! # Reading
//!
//! Three flavours, all cancellation-safe in the sense that dropping the future
//! simply abandons the connection:
//!
//! | Method | Result | Payload lives in |
//! |--------|--------|------------------|
//! | [`Transport::receive`] | [`OwnedMessage`] | a fresh `Vec` |
//! | [`Transport::receive_into_buffer`] | [`BorrowedMessage`] | the reusable buffer |
//! | [`Transport::receive_with`] | whatever the callback returns | the reusable buffer, for the callback only |
//!
//! A borrowed view keeps `&mut self` borrowed, so the next receive cannot
//! start (and overwrite the buffer) until the view is gone. `receive_with`
//! reads exactly one frame and never re-arms itself; callers loop explicitly,
//! which keeps at most one read outstanding per Transport.
//!
//! # Failure policy
//!
//! A malformed header is fatal: the Transport makes a best-effort attempt to
//! send `DISCONNECT` with the error text, half-closes, and returns
//! [`TransportError::Frame`].

use std::fmt;

use sv_core::{
    BorrowedMessage, FixedPayload, FrameHeader, MessageKind, OwnedMessage, DEFAULT_BUFFER_SIZE,
};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::frame_io::{read_exact, read_header, write_message};
use crate::halves::{MessageReader, MessageWriter};

/// A framed message connection.
///
/// `S` is any bidirectional byte stream; the relay and client use
/// `tokio_rustls` streams, tests use `tokio::io::duplex`.
pub struct Transport<S> {
    stream: S,
    /// Receive buffer; its length is the largest accepted payload and the
    /// size of each chunk when sending.
    buffer: Vec<u8>,
    /// Peer label used in log lines.
    peer: String,
}

impl<S> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("buffer_size", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream` with the default 5 MiB buffer.
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self::with_buffer_size(stream, peer, DEFAULT_BUFFER_SIZE)
    }

    /// Wraps `stream` with a buffer of `buffer_size` bytes (at least one).
    pub fn with_buffer_size(stream: S, peer: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            stream,
            buffer: vec![0u8; buffer_size.max(1)],
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// The reusable receive buffer. Views returned by
    /// [`Transport::receive_into_buffer`] point into this allocation.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Gives up framing and returns the raw stream, e.g. to hand it to a
    /// byte bridge.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Splits into independently usable read and write halves so one task
    /// can receive while another sends.
    pub fn into_split(self) -> (MessageReader<ReadHalf<S>>, MessageWriter<WriteHalf<S>>) {
        let chunk_size = self.buffer.len();
        let (read_half, write_half) = split(self.stream);
        (
            MessageReader::new(read_half, self.buffer, self.peer.clone()),
            MessageWriter::new(write_half, chunk_size, self.peer),
        )
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Sends `message`, splitting it into several same-kind frames when the
    /// content exceeds the buffer size.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the stream fails.
    pub async fn send(&mut self, message: BorrowedMessage<'_>) -> Result<(), TransportError> {
        write_message(&mut self.stream, message, self.buffer.len()).await
    }

    /// Sends a fixed-width structure as the payload of a `kind` frame.
    pub async fn send_fixed<T: FixedPayload>(
        &mut self,
        kind: MessageKind,
        payload: &T,
    ) -> Result<(), TransportError> {
        let bytes = payload.to_bytes();
        self.send(BorrowedMessage::new(kind, &bytes)).await
    }

    pub async fn send_ack(&mut self) -> Result<(), TransportError> {
        self.send(BorrowedMessage::empty(MessageKind::Ack)).await
    }

    pub async fn send_nack(&mut self) -> Result<(), TransportError> {
        self.send(BorrowedMessage::empty(MessageKind::Nack)).await
    }

    // ── Receiving ─────────────────────────────────────────────────────────────

    /// Receives one frame and copies its payload out.
    pub async fn receive(&mut self) -> Result<OwnedMessage, TransportError> {
        let header = self.next_header(self.buffer.len()).await?;
        let mut content = vec![0u8; header.length];
        read_exact(&mut self.stream, &mut content).await?;
        Ok(OwnedMessage {
            kind: header.kind,
            content,
        })
    }

    /// Receives one frame into the reusable buffer and returns a view of it.
    ///
    /// The view is invalidated by the next receive on this Transport.
    pub async fn receive_into_buffer(&mut self) -> Result<BorrowedMessage<'_>, TransportError> {
        let limit = self.buffer.len();
        self.receive_bounded(limit).await
    }

    /// Receives exactly one frame whose payload may not exceed
    /// `max_message_size`, and passes a borrowed view to `on_message`.
    ///
    /// The limit is checked against the declared length before any payload
    /// byte is read. The view is only valid inside the callback.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ReadLimitTooLarge`] if `max_message_size` is larger
    ///   than the buffer. Nothing is read in that case.
    /// - [`TransportError::Frame`] if the header is malformed or too long.
    pub async fn receive_with<F, R>(
        &mut self,
        max_message_size: usize,
        on_message: F,
    ) -> Result<R, TransportError>
    where
        F: FnOnce(BorrowedMessage<'_>) -> R,
    {
        if max_message_size > self.buffer.len() {
            return Err(TransportError::ReadLimitTooLarge {
                requested: max_message_size,
                buffer_size: self.buffer.len(),
            });
        }
        let message = self.receive_bounded(max_message_size).await?;
        Ok(on_message(message))
    }

    /// Receives one frame and fails unless it is an `ACK`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnexpectedKind`] with a preview of the
    /// offending payload if any other kind arrives.
    pub async fn receive_ack(&mut self) -> Result<(), TransportError> {
        self.receive_kind(MessageKind::Ack).await.map(|_| ())
    }

    /// Receives one frame and fails unless it has the given kind.
    pub async fn receive_kind(&mut self, expected: MessageKind) -> Result<BorrowedMessage<'_>, TransportError> {
        let message = self.receive_into_buffer().await?;
        if message.kind != expected {
            return Err(TransportError::unexpected(expected, &message));
        }
        Ok(message)
    }

    async fn receive_bounded(&mut self, max_length: usize) -> Result<BorrowedMessage<'_>, TransportError> {
        let header = self.next_header(max_length).await?;
        read_exact(&mut self.stream, &mut self.buffer[..header.length]).await?;
        Ok(BorrowedMessage::new(header.kind, &self.buffer[..header.length]))
    }

    async fn next_header(&mut self, max_length: usize) -> Result<FrameHeader, TransportError> {
        match read_header(&mut self.stream, max_length).await {
            Err(TransportError::Frame(err)) => {
                warn!(peer = %self.peer, "rejecting frame: {err}");
                self.safe_disconnect(Some(&err.to_string())).await;
                Err(TransportError::Frame(err))
            }
            other => other,
        }
    }

    // ── Closing ───────────────────────────────────────────────────────────────

    /// Optionally tells the peer why, then half-closes the write side.
    ///
    /// Failing to deliver the `DISCONNECT` frame is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the shutdown itself fails.
    pub async fn disconnect(&mut self, reason: Option<&str>) -> Result<(), TransportError> {
        if let Some(reason) = reason {
            debug!(peer = %self.peer, "disconnecting: {reason}");
            let message = BorrowedMessage::new(MessageKind::Disconnect, reason.as_bytes());
            if let Err(e) = self.send(message).await {
                warn!(peer = %self.peer, "could not send DISCONNECT: {e}");
            }
        }
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Like [`Transport::disconnect`] but never fails.
    pub async fn safe_disconnect(&mut self, reason: Option<&str>) {
        if let Err(e) = self.disconnect(reason).await {
            warn!(peer = %self.peer, "error while disconnecting: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::{encode_frame, KeyboardEventData, MouseEventData, HEADER_SIZE};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio_test::io::Builder;

    fn loopback(buffer_size: usize) -> (Transport<DuplexStream>, Transport<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        (
            Transport::with_buffer_size(a, "a", buffer_size),
            Transport::with_buffer_size(b, "b", buffer_size),
        )
    }

    #[tokio::test]
    async fn test_send_then_receive_reproduces_message() {
        // Arrange
        let (mut a, mut b) = loopback(1024);
        let original = OwnedMessage::new(MessageKind::JustAMessage, "hello there");

        // Act
        a.send(original.as_borrowed()).await.unwrap();
        let received = b.receive().await.unwrap();

        // Assert
        assert_eq!(received, original);
    }

    #[tokio::test]
    async fn test_receive_into_buffer_points_into_reusable_buffer() {
        let (mut a, mut b) = loopback(1024);
        a.send(BorrowedMessage::new(MessageKind::Id, b"0123456789"))
            .await
            .unwrap();

        let buffer_start = b.buffer().as_ptr();
        let message = b.receive_into_buffer().await.unwrap();

        assert_eq!(message.kind, MessageKind::Id);
        assert_eq!(message.content, b"0123456789");
        assert_eq!(message.content.as_ptr(), buffer_start);
    }

    #[tokio::test]
    async fn test_large_message_round_trips_with_default_buffer() {
        let (a, b) = duplex(64 * 1024);
        let mut sender = Transport::new(a, "sender");
        let mut receiver = Transport::new(b, "receiver");
        let content: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();

        let (sent, received) = tokio::join!(
            sender.send(BorrowedMessage::new(MessageKind::ScreenUpdate, &content)),
            receiver.receive()
        );

        sent.unwrap();
        let received = received.unwrap();
        assert_eq!(received.kind, MessageKind::ScreenUpdate);
        assert_eq!(received.content, content);
    }

    #[tokio::test]
    async fn test_send_splits_oversized_message_into_same_kind_frames() {
        // Arrange: three full buffers' worth of content.
        const BUFFER: usize = 16;
        let (mut a, mut b) = loopback(BUFFER);
        let content: Vec<u8> = (0..(3 * BUFFER) as u8).collect();

        // Act
        a.send(BorrowedMessage::new(MessageKind::ScreenUpdate, &content))
            .await
            .unwrap();
        let mut reassembled = Vec::new();
        for _ in 0..3 {
            let chunk = b.receive_into_buffer().await.unwrap();
            assert_eq!(chunk.kind, MessageKind::ScreenUpdate);
            assert_eq!(chunk.content.len(), BUFFER);
            reassembled.extend_from_slice(chunk.content);
        }

        // Assert
        assert_eq!(reassembled, content);
    }

    #[tokio::test]
    async fn test_chunked_send_puts_exact_frames_on_the_wire() {
        let content = b"abcdefghij";
        let mock = Builder::new()
            .write(&encode_frame(MessageKind::JustAMessage, b"abcd"))
            .write(&encode_frame(MessageKind::JustAMessage, b"efgh"))
            .write(&encode_frame(MessageKind::JustAMessage, b"ij"))
            .build();
        let mut transport = Transport::with_buffer_size(mock, "mock", 4);

        transport
            .send(BorrowedMessage::new(MessageKind::JustAMessage, content))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ack_and_nack_are_empty_frames() {
        let mock = Builder::new()
            .write(&encode_frame(MessageKind::Ack, &[]))
            .write(&encode_frame(MessageKind::Nack, &[]))
            .build();
        let mut transport = Transport::new(mock, "mock");

        transport.send_ack().await.unwrap();
        transport.send_nack().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_ack_accepts_ack() {
        let mock = Builder::new().read(&encode_frame(MessageKind::Ack, &[])).build();
        let mut transport = Transport::new(mock, "mock");
        transport.receive_ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_ack_reports_other_kind_with_preview() {
        let mock = Builder::new()
            .read(&encode_frame(MessageKind::Response, b"Did not expect LOGIN message."))
            .build();
        let mut transport = Transport::new(mock, "mock");

        let err = transport.receive_ack().await.unwrap_err();

        match err {
            TransportError::UnexpectedKind {
                expected,
                actual,
                size,
                preview,
            } => {
                assert_eq!(expected, MessageKind::Ack);
                assert_eq!(actual, MessageKind::Response);
                assert_eq!(size, 29);
                assert_eq!(preview, "Did not expect LOGIN message.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receive_with_rejects_limit_above_buffer_size() {
        let mock = Builder::new().build();
        let mut transport = Transport::with_buffer_size(mock, "mock", 64);

        let err = transport.receive_with(65, |_| ()).await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::ReadLimitTooLarge {
                requested: 65,
                buffer_size: 64
            }
        ));
    }

    #[tokio::test]
    async fn test_receive_with_invokes_callback_once() {
        let (mut a, mut b) = loopback(1024);
        a.send(BorrowedMessage::new(MessageKind::Login, b"{}"))
            .await
            .unwrap();

        let kind = b.receive_with(1000, |message| message.kind).await.unwrap();

        assert_eq!(kind, MessageKind::Login);
    }

    #[tokio::test]
    async fn test_oversized_header_disconnects_with_reason() {
        // Arrange: the peer declares 2000 bytes against a 1000-byte limit.
        let bad = encode_frame(MessageKind::Login, &[0u8; 2000]);
        let reason = "message is too long: declared 2000 bytes, limit is 1000";
        let mock = Builder::new()
            .read(&bad[..HEADER_SIZE])
            .write(&encode_frame(MessageKind::Disconnect, reason.as_bytes()))
            .build();
        let mut transport = Transport::with_buffer_size(mock, "mock", 4096);

        // Act
        let err = transport.receive_with(1000, |_| ()).await.unwrap_err();

        // Assert
        assert!(matches!(err, TransportError::Frame(_)));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_a_frame_error() {
        let mut header = encode_frame(MessageKind::Ack, &[]);
        header[HEADER_SIZE - 1] = MessageKind::MAX_VALUE + 1;
        let (mut raw, b) = duplex(1024);
        let mut receiver = Transport::with_buffer_size(b, "b", 1024);

        tokio::io::AsyncWriteExt::write_all(&mut raw, &header).await.unwrap();
        let err = receiver.receive().await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::Frame(sv_core::FrameError::UnknownKind(13))
        ));
        // The receiver told us why before closing its side.
        let mut echoed = vec![0u8; HEADER_SIZE];
        raw.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed[HEADER_SIZE - 1], MessageKind::Disconnect as u8);
    }

    #[tokio::test]
    async fn test_peer_close_surfaces_as_closed() {
        let (a, mut b) = loopback(64);
        drop(a);
        let err = b.receive().await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_disconnect_sends_reason_then_closes() {
        let (mut a, mut b) = loopback(1024);

        a.disconnect(Some("bye")).await.unwrap();

        let message = b.receive().await.unwrap();
        assert_eq!(message, OwnedMessage::new(MessageKind::Disconnect, "bye"));
        assert!(matches!(b.receive().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_disconnect_without_reason_sends_nothing() {
        let mock = Builder::new().build();
        let mut transport = Transport::new(mock, "mock");
        transport.disconnect(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_fixed_payloads_travel_as_exact_bytes() {
        let (mut a, mut b) = loopback(1024);
        let mouse = MouseEventData {
            button_mask: 4,
            x: 10,
            y: 20,
        };
        let key = KeyboardEventData { down: true, key: 65 };

        a.send_fixed(MessageKind::MouseInput, &mouse).await.unwrap();
        a.send_fixed(MessageKind::KeyboardInput, &key).await.unwrap();

        let first = b.receive().await.unwrap();
        assert_eq!(first.as_borrowed().convert_to::<MouseEventData>().unwrap(), mouse);
        let second = b.receive().await.unwrap();
        assert_eq!(second.as_borrowed().convert_to::<KeyboardEventData>().unwrap(), key);
    }
}
