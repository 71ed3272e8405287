//! Read and write halves of a split [`Transport`](crate::Transport).
//!
//! A streamer has to send screen updates while it waits for input events, so
//! it splits its Transport and drives each half from its own task. The halves
//! keep the framing rules of the whole Transport; the only difference is that
//! a reader cannot send `DISCONNECT` on a malformed header. It returns
//! [`TransportError::Frame`] and leaves closing to whoever owns the writer.

use sv_core::{BorrowedMessage, FixedPayload, MessageKind, OwnedMessage};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::TransportError;
use crate::frame_io::{read_exact, read_header, write_message};

/// Receiving half of a split Transport.
pub struct MessageReader<R> {
    reader: R,
    buffer: Vec<u8>,
    peer: String,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(reader: R, buffer: Vec<u8>, peer: String) -> Self {
        Self { reader, buffer, peer }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Receives one frame and copies its payload out.
    pub async fn receive(&mut self) -> Result<OwnedMessage, TransportError> {
        Ok(self.receive_into_buffer().await?.to_owned_message())
    }

    /// Receives one frame into the reusable buffer and returns a view of it.
    pub async fn receive_into_buffer(&mut self) -> Result<BorrowedMessage<'_>, TransportError> {
        let header = read_header(&mut self.reader, self.buffer.len()).await?;
        read_exact(&mut self.reader, &mut self.buffer[..header.length]).await?;
        Ok(BorrowedMessage::new(header.kind, &self.buffer[..header.length]))
    }
}

/// Sending half of a split Transport.
pub struct MessageWriter<W> {
    writer: W,
    chunk_size: usize,
    peer: String,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(writer: W, chunk_size: usize, peer: String) -> Self {
        Self {
            writer,
            chunk_size,
            peer,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&mut self, message: BorrowedMessage<'_>) -> Result<(), TransportError> {
        write_message(&mut self.writer, message, self.chunk_size).await
    }

    pub async fn send_fixed<T: FixedPayload>(
        &mut self,
        kind: MessageKind,
        payload: &T,
    ) -> Result<(), TransportError> {
        let bytes = payload.to_bytes();
        self.send(BorrowedMessage::new(kind, &bytes)).await
    }

    /// Optionally sends `DISCONNECT(reason)`, then half-closes. Never fails.
    pub async fn safe_disconnect(&mut self, reason: Option<&str>) {
        if let Some(reason) = reason {
            let message = BorrowedMessage::new(MessageKind::Disconnect, reason.as_bytes());
            if let Err(e) = self.send(message).await {
                warn!(peer = %self.peer, "could not send DISCONNECT: {e}");
            }
        }
        if let Err(e) = self.writer.shutdown().await {
            warn!(peer = %self.peer, "error while disconnecting: {e}");
        }
    }
}
