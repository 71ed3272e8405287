//! # sv-transport
//!
//! Framed message transport for ScreenViewer.
//!
//! [`Transport`] wraps one byte stream and speaks the frame format defined in
//! `sv-core`: it chunks long messages on send, validates headers on receive,
//! and offers owned, borrowed, and callback-style reads. The [`tls`] module
//! builds the `rustls` configurations both the relay and the clients use to
//! wrap their TCP sockets.
//!
//! ```text
//! Transport<S>
//!   ├── send / send_fixed / send_ack / send_nack
//!   ├── receive / receive_into_buffer / receive_with / receive_ack
//!   ├── disconnect / safe_disconnect
//!   └── into_split ─▶ (MessageReader, MessageWriter)
//!       into_inner ─▶ S   (handed to the relay's byte bridge after pairing)
//! ```

pub mod error;
mod frame_io;
pub mod halves;
pub mod tls;
pub mod transport;

pub use error::TransportError;
pub use halves::{MessageReader, MessageWriter};
pub use transport::Transport;

/// Server-side TLS stream type used by the relay.
pub type ServerTlsStream = tokio_rustls::server::TlsStream<tokio::net::TcpStream>;

/// Client-side TLS stream type used by streamers and viewers.
pub type ClientTlsStream = tokio_rustls::client::TlsStream<tokio::net::TcpStream>;
