//! Application layer: what a streamer or viewer does once connected.
//!
//! Nothing here opens sockets or touches the platform. The use cases run
//! over split [`sv_transport`] halves and the traits in [`devices`].

pub mod devices;
pub mod error;
pub mod stream_screen;
pub mod view_screen;
