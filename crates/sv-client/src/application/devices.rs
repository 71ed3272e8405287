//! Collaborators the streamer and viewer loops are written against.
//!
//! Screen capture, input injection, and video coding are platform concerns.
//! The use cases only see these traits; the infrastructure layer provides a
//! synthetic test-pattern source, a raw pass-through codec, and mocks.
//!
//! ```text
//!  streamer:  IoController::capture_screenshot ─▶ VideoEncoder::encode ─▶ SCREEN_UPDATE
//!             MOUSE_INPUT / KEYBOARD_INPUT ─▶ IoController::handle_*_event
//!  viewer:    SCREEN_UPDATE ─▶ VideoDecoder::decode ─▶ FrameSink::present
//! ```

use sv_core::{KeyboardEventData, MouseEventData};
use thiserror::Error;

/// Bytes per pixel of a [`Frame`] (BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// Error raised by a platform collaborator.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("platform error: {0}")]
    Platform(String),
}

/// One captured screen image, tightly packed BGRA rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Pixel buffer length for the given dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }
}

/// Screen and input access on the streaming machine.
pub trait IoController: Send + Sync {
    fn capture_screenshot(&self) -> Result<Frame, DeviceError>;

    fn handle_mouse_event(&self, event: &MouseEventData) -> Result<(), DeviceError>;

    fn handle_keyboard_event(&self, event: &KeyboardEventData) -> Result<(), DeviceError>;
}

/// Turns frames into packets. `None` means "nothing to send for this frame".
pub trait VideoEncoder: Send {
    fn encode(&mut self, frame: &Frame) -> Option<Vec<u8>>;
}

/// Turns packets back into frames. `None` means the packet was unusable.
pub trait VideoDecoder: Send {
    fn decode(&mut self, packet: &[u8]) -> Option<Frame>;
}

/// Where decoded frames end up on the viewing machine.
pub trait FrameSink: Send {
    fn present(&mut self, frame: Frame);
}
