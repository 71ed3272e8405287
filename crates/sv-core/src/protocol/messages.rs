//! ScreenViewer protocol message types.
//!
//! Every frame on the wire carries one [`MessageKind`] and an opaque payload.
//! The payload is interpreted according to the kind:
//!
//! | Kind | Payload |
//! |------|---------|
//! | `LOGIN` | UTF-8 JSON `{"email": .., "password": ..}` ([`LoginCredentials`]) |
//! | `ID`, `FIND_STREAMER` | raw session code string |
//! | `MOUSE_INPUT` | [`MouseEventData`] (12 bytes) |
//! | `KEYBOARD_INPUT` | [`KeyboardEventData`] (5 bytes) |
//! | `SCREEN_UPDATE` | opaque encoded-video packet |
//! | `DISCONNECT`, `RESPONSE`, `JUST_A_MESSAGE` | human-readable UTF-8 text |
//! | `REGISTER_STREAMER`, `START_STREAM`, `ACK`, `NACK` | empty |

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the frame header in bytes: 8-byte length followed by 1-byte kind.
pub const HEADER_SIZE: usize = 9;

/// Default size of a Transport's reusable receive buffer (5 MiB).
///
/// This is also the largest payload sent in a single frame; longer messages are
/// split into several frames of the same kind.
pub const DEFAULT_BUFFER_SIZE: usize = 5 * 1024 * 1024;

// ── Message kind codes ────────────────────────────────────────────────────────

/// Closed set of message kinds with a fixed numeric encoding.
///
/// The numeric values are part of the wire format and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    JustAMessage = 0,
    Login = 1,
    RegisterStreamer = 2,
    FindStreamer = 3,
    StartStream = 4,
    Response = 5,
    Id = 6,
    Ack = 7,
    Nack = 8,
    MouseInput = 9,
    KeyboardInput = 10,
    ScreenUpdate = 11,
    Disconnect = 12,
}

impl MessageKind {
    /// Highest defined kind code. Any encoded value above this is rejected.
    pub const MAX_VALUE: u8 = MessageKind::Disconnect as u8;

    /// Returns the protocol name of this kind, e.g. `"FIND_STREAMER"`.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::JustAMessage => "JUST_A_MESSAGE",
            MessageKind::Login => "LOGIN",
            MessageKind::RegisterStreamer => "REGISTER_STREAMER",
            MessageKind::FindStreamer => "FIND_STREAMER",
            MessageKind::StartStream => "START_STREAM",
            MessageKind::Response => "RESPONSE",
            MessageKind::Id => "ID",
            MessageKind::Ack => "ACK",
            MessageKind::Nack => "NACK",
            MessageKind::MouseInput => "MOUSE_INPUT",
            MessageKind::KeyboardInput => "KEYBOARD_INPUT",
            MessageKind::ScreenUpdate => "SCREEN_UPDATE",
            MessageKind::Disconnect => "DISCONNECT",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(MessageKind::JustAMessage),
            1 => Ok(MessageKind::Login),
            2 => Ok(MessageKind::RegisterStreamer),
            3 => Ok(MessageKind::FindStreamer),
            4 => Ok(MessageKind::StartStream),
            5 => Ok(MessageKind::Response),
            6 => Ok(MessageKind::Id),
            7 => Ok(MessageKind::Ack),
            8 => Ok(MessageKind::Nack),
            9 => Ok(MessageKind::MouseInput),
            10 => Ok(MessageKind::KeyboardInput),
            11 => Ok(MessageKind::ScreenUpdate),
            12 => Ok(MessageKind::Disconnect),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Frame header ──────────────────────────────────────────────────────────────

/// Header preceding every frame on the wire.
///
/// `length` counts payload bytes only. It is carried as an unsigned 64-bit
/// integer in native byte order; after decoding it is guaranteed to be no
/// larger than the maximum the receiver declared for that read, so it always
/// fits in a `usize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    pub kind: MessageKind,
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// A zero-copy view of a received message.
///
/// The content borrows the receiving Transport's reusable buffer, so the
/// borrow checker ends the view before the next receive on that Transport can
/// start. Call [`BorrowedMessage::to_owned_message`] to keep the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowedMessage<'a> {
    pub kind: MessageKind,
    pub content: &'a [u8],
}

impl<'a> BorrowedMessage<'a> {
    pub fn new(kind: MessageKind, content: &'a [u8]) -> Self {
        Self { kind, content }
    }

    /// A message of `kind` with no payload (ACK, NACK, START_STREAM, ...).
    pub fn empty(kind: MessageKind) -> Self {
        Self { kind, content: &[] }
    }

    /// Copies the payload out of the receive buffer.
    pub fn to_owned_message(&self) -> OwnedMessage {
        OwnedMessage {
            kind: self.kind,
            content: self.content.to_vec(),
        }
    }

    /// The payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.content)
    }

    /// Reinterprets the payload as the fixed-width structure `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TypeMismatchError`] if the payload length differs from
    /// `T::SIZE`.
    pub fn convert_to<T: FixedPayload>(&self) -> Result<T, TypeMismatchError> {
        if self.content.len() != T::SIZE {
            return Err(TypeMismatchError {
                type_name: T::NAME,
                expected: T::SIZE,
                actual: self.content.len(),
            });
        }
        Ok(T::read_from(self.content))
    }
}

/// A message that owns its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnedMessage {
    pub kind: MessageKind,
    pub content: Vec<u8>,
}

impl OwnedMessage {
    pub fn new(kind: MessageKind, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Vec::new())
    }

    /// Borrows this message as a [`BorrowedMessage`] view.
    pub fn as_borrowed(&self) -> BorrowedMessage<'_> {
        BorrowedMessage::new(self.kind, &self.content)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

impl PartialEq<OwnedMessage> for BorrowedMessage<'_> {
    fn eq(&self, other: &OwnedMessage) -> bool {
        self.kind == other.kind && self.content == other.content.as_slice()
    }
}

// ── Structured payloads ───────────────────────────────────────────────────────

/// Payload of a `LOGIN` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Returned when a payload's size does not match the fixed-width structure a
/// handler tried to read it as.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message's size ({actual}) != ({expected}) size of {type_name}")]
pub struct TypeMismatchError {
    pub type_name: &'static str,
    pub expected: usize,
    pub actual: usize,
}

/// A fixed-width structure sent verbatim as a frame payload.
///
/// Fields are laid out without padding in native byte order, so both peers
/// must run on machines with the same endianness.
pub trait FixedPayload: Sized {
    /// Exact encoded size in bytes.
    const SIZE: usize;
    /// Name used in [`TypeMismatchError`] messages.
    const NAME: &'static str;

    /// Writes the structure into a buffer of exactly [`Self::SIZE`] bytes.
    fn write_to(&self, out: &mut [u8]);

    /// Reads the structure from a buffer of exactly [`Self::SIZE`] bytes.
    ///
    /// Callers check the length first; see [`BorrowedMessage::convert_to`].
    fn read_from(bytes: &[u8]) -> Self;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::SIZE];
        self.write_to(&mut out);
        out
    }
}

/// A pointer event forwarded from the viewer to the streamer.
///
/// `button_mask` is a combination of the flags in [`crate::domain::mouse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MouseEventData {
    pub button_mask: i32,
    pub x: i32,
    pub y: i32,
}

impl FixedPayload for MouseEventData {
    const SIZE: usize = 12;
    const NAME: &'static str = "MouseEventData";

    fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.button_mask.to_ne_bytes());
        out[4..8].copy_from_slice(&self.x.to_ne_bytes());
        out[8..12].copy_from_slice(&self.y.to_ne_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self {
            button_mask: i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            x: i32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            y: i32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

/// A key press or release forwarded from the viewer to the streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyboardEventData {
    pub down: bool,
    pub key: u32,
}

impl FixedPayload for KeyboardEventData {
    // Packed: 1-byte bool followed directly by the 4-byte key.
    const SIZE: usize = 5;
    const NAME: &'static str = "KeyboardEventData";

    fn write_to(&self, out: &mut [u8]) {
        out[0] = u8::from(self.down);
        out[1..5].copy_from_slice(&self.key.to_ne_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        Self {
            down: bytes[0] != 0,
            key: u32::from_ne_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
