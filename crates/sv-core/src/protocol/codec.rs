//! Frame header codec.
//!
//! Wire format:
//! ```text
//! [length:8][kind:1][payload:length]
//! ```
//! Total header size: 9 bytes, no padding. `length` is an unsigned 64-bit
//! integer in native byte order (both peers are assumed to share endianness,
//! which also holds for the fixed-width input payloads).
//!
//! The codec performs no I/O. Reading the payload is the Transport's job; the
//! codec only validates the header so the Transport knows how many bytes to
//! read and whether it is willing to read them at all.

use thiserror::Error;

use crate::protocol::messages::{FrameHeader, MessageKind, HEADER_SIZE};

/// Errors produced while decoding a frame header.
///
/// Every variant is fatal to the connection it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes are available than a header occupies.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The declared payload length exceeds what the receiver allows.
    #[error("message is too long: declared {declared} bytes, limit is {max}")]
    TooLong { declared: u64, max: usize },

    /// The kind byte is outside the known enumeration.
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a header into its fixed 9-byte wire representation.
///
/// This never fails: every `(length, kind)` pair a sender can produce fits.
///
/// # Examples
///
/// ```rust
/// use sv_core::protocol::{decode_header, encode_header, FrameHeader, MessageKind};
///
/// let header = FrameHeader { length: 42, kind: MessageKind::Ack };
/// let bytes = encode_header(&header);
/// assert_eq!(decode_header(&bytes, 100).unwrap(), header);
/// ```
pub fn encode_header(header: &FrameHeader) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[..8].copy_from_slice(&(header.length as u64).to_ne_bytes());
    out[8] = header.kind as u8;
    out
}

/// Decodes a header from the start of `buffer`.
///
/// `buffer.len()` is the number of available bytes; anything past the first
/// [`HEADER_SIZE`] bytes is ignored. `max_length` is the largest payload the
/// caller is prepared to receive for this read.
///
/// Checks run in this order: buffer size, declared length, kind code.
///
/// # Errors
///
/// - [`FrameError::InsufficientData`] if `buffer` is shorter than a header.
/// - [`FrameError::TooLong`] if the declared length is greater than `max_length`.
/// - [`FrameError::UnknownKind`] if the kind byte is above
///   [`MessageKind::MAX_VALUE`].
pub fn decode_header(buffer: &[u8], max_length: usize) -> Result<FrameHeader, FrameError> {
    if buffer.len() < HEADER_SIZE {
        return Err(FrameError::InsufficientData {
            needed: HEADER_SIZE,
            available: buffer.len(),
        });
    }

    let mut length_bytes = [0u8; 8];
    length_bytes.copy_from_slice(&buffer[..8]);
    let declared = u64::from_ne_bytes(length_bytes);
    if declared > max_length as u64 {
        return Err(FrameError::TooLong {
            declared,
            max: max_length,
        });
    }

    let kind_code = buffer[8];
    let kind = MessageKind::try_from(kind_code).map_err(|_| FrameError::UnknownKind(kind_code))?;

    Ok(FrameHeader {
        // Bounded by `max_length`, which is itself a usize.
        length: declared as usize,
        kind,
    })
}

/// Encodes a complete single frame (header followed by `content`).
///
/// Intended for tests and tooling; the Transport writes header and payload
/// without building an intermediate buffer.
pub fn encode_frame(kind: MessageKind, content: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        length: content.len(),
        kind,
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + content.len());
    out.extend_from_slice(&encode_header(&header));
    out.extend_from_slice(content);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
