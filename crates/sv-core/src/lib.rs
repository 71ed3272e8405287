//! # sv-core
//!
//! Shared library for ScreenViewer containing the frame codec, the message
//! model, and the session-code rules.
//!
//! This crate is used by the transport, the relay, and the client.
//! It has no dependencies on sockets, TLS, or an async runtime.
//!
//! # Architecture overview (for beginners)
//!
//! ScreenViewer lets one machine (the "streamer") show its screen to another
//! machine (the "viewer") and accept the viewer's mouse and keyboard input.
//! Both machines connect out to a relay server. The streamer registers and is
//! given a 10-character code; the viewer presents that code; the relay then
//! splices the two connections together.
//!
//! ```text
//! streamer ──TLS──▶ relay ◀──TLS── viewer
//!    REGISTER_STREAMER      FIND_STREAMER(code)
//!    ◀── ID(code)           ◀── ACK
//!    ◀── START_STREAM
//!    ═════════ raw byte bridge after pairing ═════════
//! ```
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network. Every frame is a
//!   9-byte header (8-byte length + 1-byte kind) followed by the payload.
//!
//! - **`domain`** – Pure rules: session-code format and mouse button masks.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `sv_core::MessageKind` instead of `sv_core::protocol::messages::MessageKind`.
pub use domain::session_code::{generate_session_code, SESSION_CODE_LENGTH};
pub use protocol::codec::{decode_header, encode_frame, encode_header, FrameError};
pub use protocol::messages::{
    BorrowedMessage, FixedPayload, FrameHeader, KeyboardEventData, LoginCredentials, MessageKind,
    MouseEventData, OwnedMessage, TypeMismatchError, DEFAULT_BUFFER_SIZE, HEADER_SIZE,
};
