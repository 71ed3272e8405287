//! Domain rules for ScreenViewer that involve no I/O.
//!
//! Everything here can be compiled and tested on any platform without a
//! network or a display: the format of session codes handed out to streamers,
//! and the meaning of the bits in a mouse event's button mask.

/// Bit flags for mouse buttons, presses, scrolls and moves.
pub mod mouse;

/// Session code alphabet, length and generation.
pub mod session_code;
