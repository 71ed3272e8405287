//! Infrastructure layer for the relay.
//!
//! Contains the OS-facing pieces: the TLS-over-TCP accept loop and the
//! TOML configuration file.
//!
//! **Dependency rule**: this layer may depend on `application`, but MUST NOT
//! be imported by it.

pub mod listener;
pub mod storage;

pub use listener::{behavior_for, ListenerSettings, RelayServer, RelayServices};
