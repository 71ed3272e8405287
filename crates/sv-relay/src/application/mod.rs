//! Application layer of the relay: what happens on a connection after it is
//! accepted.
//!
//! Everything here is generic over the byte stream, so the whole protocol
//! (login, registration, pairing, bridging) is tested over in-memory
//! `tokio::io::duplex` pipes. The infrastructure layer plugs in TLS sockets.
//!
//! # Sub-modules
//!
//! - **`session`**     – Per-connection state machine and the login gate.
//! - **`pairing`**     – `REGISTER_STREAMER` / `FIND_STREAMER` handling.
//! - **`registry`**    – Codes of streamers waiting for a viewer, with
//!   timed eviction.
//! - **`bridge`**      – Raw two-way byte copy between paired peers.
//! - **`credentials`** – Who may log in.

pub mod bridge;
pub mod credentials;
pub mod pairing;
pub mod registry;
pub mod session;
