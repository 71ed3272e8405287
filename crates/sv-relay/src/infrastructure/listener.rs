//! TLS accept loop: one task per connection.
//!
//! [`RelayServer`] binds a TCP listener, and for every accepted socket it
//! spawns a task that:
//!
//! 1. Completes the TLS handshake (bounded by `handshake_timeout`).
//! 2. Wraps the stream in a [`Transport`] with the configured buffer size.
//! 3. Runs a [`Session`] until it closes or hands the connection off.
//!
//! The accept loop polls with a 200 ms timeout so it notices a cleared
//! `running` flag promptly. Accept errors are logged and the loop pauses
//! briefly before carrying on, so a process out of file descriptors does not
//! spin. Sessions only get weak references to the registry and credential
//! store; the server holds the strong ones.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use sv_transport::{ServerTlsStream, Transport};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::application::credentials::CredentialStore;
use crate::application::pairing::{ProxyBehavior, StreamerRegistry};
use crate::application::session::{
    ConnectionState, EchoBehavior, Session, SessionBehavior, SessionContext,
};
use crate::infrastructure::storage::config::SessionMode;

const ACCEPT_POLL: Duration = Duration::from_millis(200);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ListenerSettings {
    pub handshake_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            buffer_size: sv_core::DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Server-wide state shared (weakly) with every session.
pub struct RelayServices {
    pub registry: Arc<StreamerRegistry<ServerTlsStream>>,
    pub credentials: Arc<dyn CredentialStore>,
    pub behavior: Arc<dyn SessionBehavior<ServerTlsStream>>,
}

/// Session behavior for the configured mode.
pub fn behavior_for(mode: SessionMode) -> Arc<dyn SessionBehavior<ServerTlsStream>> {
    match mode {
        SessionMode::Proxy => Arc::new(ProxyBehavior),
        SessionMode::Echo => Arc::new(EchoBehavior),
    }
}

/// A bound, not yet running, relay.
pub struct RelayServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    services: RelayServices,
    settings: ListenerSettings,
}

impl RelayServer {
    /// Binds `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is in use or cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        tls: Arc<rustls::ServerConfig>,
        services: RelayServices,
        settings: ListenerSettings,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind relay listener on {addr}"))?;
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            services,
            settings,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Arc<StreamerRegistry<ServerTlsStream>> {
        &self.services.registry
    }

    /// Accepts connections until `running` is set to `false`.
    ///
    /// Returning drops the server's strong references, so waiting streamers
    /// are closed and live sessions see a missing registry from then on.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("relay listening on {}", self.local_addr()?);
        let context = SessionContext::new(&self.services.registry, &self.services.credentials);

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    info!("new connection from {peer_addr}");
                    let acceptor = self.acceptor.clone();
                    let context = context.clone();
                    let behavior = Arc::clone(&self.services.behavior);
                    let settings = self.settings;
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, acceptor, context, behavior, settings)
                            .await;
                    });
                }
                Ok(Err(e)) => back_off_after_accept_error(&e).await,
                Err(_) => {
                    // No connection in the last poll window; re-check the flag.
                }
            }
        }

        self.services.registry.reset();
        Ok(())
    }
}

/// Logs a failed `accept` and waits before the next one. Errors such as
/// `EMFILE` repeat immediately until a descriptor frees up.
async fn back_off_after_accept_error(e: &std::io::Error) {
    error!("accept error: {e}; retrying in {ACCEPT_ERROR_BACKOFF:?}");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    context: SessionContext<ServerTlsStream>,
    behavior: Arc<dyn SessionBehavior<ServerTlsStream>>,
    settings: ListenerSettings,
) {
    match run_connection(stream, peer_addr, acceptor, context, behavior, settings).await {
        Ok(state) => info!("connection {peer_addr} finished in state {state:?}"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    context: SessionContext<ServerTlsStream>,
    behavior: Arc<dyn SessionBehavior<ServerTlsStream>>,
    settings: ListenerSettings,
) -> anyhow::Result<ConnectionState> {
    let tls_stream = timeout(settings.handshake_timeout, acceptor.accept(stream))
        .await
        .with_context(|| format!("TLS handshake with {peer_addr} timed out"))?
        .with_context(|| format!("TLS handshake with {peer_addr} failed"))?;

    let transport = Transport::with_buffer_size(tls_stream, peer_addr.to_string(), settings.buffer_size);
    let session = Session::new(transport, context);
    Ok(session.run(behavior.as_ref()).await)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
