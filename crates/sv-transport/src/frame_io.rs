//! Frame-level read and write helpers shared by [`Transport`] and its split
//! halves.
//!
//! [`Transport`]: crate::Transport

use sv_core::{
    decode_header, encode_header, BorrowedMessage, FrameHeader, MessageKind, HEADER_SIZE,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Writes `message` as one or more frames and flushes.
///
/// Content no longer than `chunk_size` goes out as a single frame. Longer
/// content is cut into consecutive `chunk_size` pieces, each framed with the
/// same kind; the final piece carries the remainder. Nothing on the wire marks
/// the pieces as belonging together, so the receiver has to know how many to
/// expect.
pub(crate) async fn write_message<W>(
    writer: &mut W,
    message: BorrowedMessage<'_>,
    chunk_size: usize,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if message.content.len() <= chunk_size {
        write_frame(writer, message.kind, message.content).await?;
    } else {
        for chunk in message.content.chunks(chunk_size) {
            write_frame(writer, message.kind, chunk).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

async fn write_frame<W>(writer: &mut W, kind: MessageKind, content: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = encode_header(&FrameHeader {
        length: content.len(),
        kind,
    });
    writer.write_all(&header).await?;
    if !content.is_empty() {
        writer.write_all(content).await?;
    }
    Ok(())
}

/// Reads and validates one header.
///
/// The declared length is checked against `max_length` before any payload
/// byte is read.
pub(crate) async fn read_header<R>(reader: &mut R, max_length: usize) -> Result<FrameHeader, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut bytes = [0u8; HEADER_SIZE];
    read_exact(reader, &mut bytes).await?;
    Ok(decode_header(&bytes, max_length)?)
}

/// Fills `buf` completely, mapping EOF to [`TransportError::Closed`].
pub(crate) async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if buf.is_empty() {
        return Ok(());
    }
    reader
        .read_exact(buf)
        .await
        .map(|_| ())
        .map_err(TransportError::from_read)
}
