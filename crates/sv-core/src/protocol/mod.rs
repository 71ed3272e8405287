//! Protocol module containing message types and the frame header codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_header, encode_frame, encode_header, FrameError};
pub use messages::*;
