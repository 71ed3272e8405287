//! Error type shared by every Transport operation.

use std::io;

use sv_core::{BorrowedMessage, FrameError, MessageKind};
use thiserror::Error;

/// Payloads shorter than this are included verbatim in
/// [`TransportError::UnexpectedKind`] diagnostics.
pub const PREVIEW_LIMIT: usize = 100;

/// Errors that can occur while sending or receiving frames.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket or TLS session failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection in the middle of, or before, a frame.
    #[error("connection closed by peer")]
    Closed,

    /// The peer sent a malformed header. The connection has been torn down.
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    /// A specific kind was required and a different one arrived.
    #[error("did not get {expected}. Response type: {actual} size: {size}. {preview}")]
    UnexpectedKind {
        expected: MessageKind,
        actual: MessageKind,
        size: usize,
        preview: String,
    },

    /// A read was requested with a limit larger than the receive buffer.
    #[error("max message size {requested} exceeds buffer size {buffer_size}")]
    ReadLimitTooLarge { requested: usize, buffer_size: usize },
}

impl TransportError {
    /// Builds an [`TransportError::UnexpectedKind`] from the offending message.
    pub fn unexpected(expected: MessageKind, message: &BorrowedMessage<'_>) -> Self {
        let preview = if message.content.len() < PREVIEW_LIMIT {
            message.text().into_owned()
        } else {
            "Too large to print.".to_string()
        };
        TransportError::UnexpectedKind {
            expected,
            actual: message.kind,
            size: message.content.len(),
            preview,
        }
    }

    /// Maps a read failure, treating EOF as an orderly close.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::Io(err)
        }
    }

    /// `true` if this error only means the peer went away.
    ///
    /// Cancelled reads and resets surface here too, so session loops can log
    /// them at debug level instead of treating them as failures.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
