//! sv-relay library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! ```text
//! application/                 (generic over the byte stream)
//!   session      login gate + per-connection state machine
//!   pairing      REGISTER_STREAMER / FIND_STREAMER
//!   registry     waiting streamers, timed eviction
//!   bridge       raw byte copy between paired peers
//!   credentials  bcrypt-hashed users
//! infrastructure/
//!   listener     TLS accept loop, one task per connection
//!   storage      TOML configuration
//! ```

pub mod application;
pub mod infrastructure;
