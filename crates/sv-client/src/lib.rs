//! sv-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does sv-client do? (for beginners)
//!
//! A ScreenViewer client plays one of two roles:
//!
//! - **Streamer**: logs in, registers with the relay, and receives a
//!   10-character code. Once a viewer presents that code the relay sends
//!   `START_STREAM`; the streamer then sends `SCREEN_UPDATE` frames and
//!   replays the viewer's mouse and keyboard events locally.
//! - **Viewer**: logs in, asks the relay for the streamer with a code, and
//!   on `ACK` starts receiving that streamer's screen.
//!
//! After pairing the relay copies bytes blindly, so both roles keep using
//! the same frame format end to end.

/// Application layer: use cases and the collaborator traits they need.
pub mod application;

/// Infrastructure layer: relay socket, codecs, I/O controllers, sinks.
pub mod infrastructure;
