//! Error type shared by the client's socket, use cases and blocking facade.

use sv_core::MessageKind;
use sv_transport::tls::TlsConfigError;
use sv_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connect or TLS handshake with the relay failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a valid TLS server name")]
    ServerName(String),

    #[error(transparent)]
    Tls(#[from] TlsConfigError),

    /// Any framing, I/O, or unexpected-reply failure, including a `NACK`
    /// where an `ACK` was required.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("could not encode the login request: {0}")]
    Login(#[from] serde_json::Error),

    #[error("Could not register stream. Response type: {0}")]
    RegisterRejected(MessageKind),

    #[error("could not start the I/O runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ClientError {
    /// True if the relay or the paired peer went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_disconnect())
    }
}
