//! Streamer/viewer pairing: the relay's default post-login behavior.
//!
//! # Protocol (for beginners)
//!
//! ```text
//!  streamer                      relay                         viewer
//!     │ REGISTER_STREAMER ──────▶  │                              │
//!     │ ◀────────────── ID(code)   │                              │
//!     │                            │  ◀────── FIND_STREAMER(code) │
//!     │                            │  ACK ───────────────────────▶│
//!     │ ◀─────────── START_STREAM  │                              │
//!     │ ═════════ raw bytes, both directions, no framing ════════ │
//! ```
//!
//! # Who owns what
//!
//! A registered streamer's session keeps its own connection and waits on a
//! oneshot channel. The registry holds the sending end inside a
//! [`StreamerHandle`]. A viewer that claims the code sends its connection
//! through that channel, and the streamer's session then acknowledges the
//! viewer, starts the stream, and spawns the [`Bridge`].
//!
//! If the entry is evicted instead, the handle is dropped, the channel
//! closes, and the streamer's session closes its connection.

use async_trait::async_trait;
use sv_core::{BorrowedMessage, MessageKind, OwnedMessage};
use sv_transport::Transport;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::application::bridge::Bridge;
use crate::application::registry::SessionRegistry;
use crate::application::session::{echo, ConnectionState, Session, SessionBehavior, SessionError};

/// Registry of streamers waiting for a viewer, keyed by session code.
pub type StreamerRegistry<S> = SessionRegistry<StreamerHandle<S>>;

/// Registry entry for one waiting streamer.
pub struct StreamerHandle<S> {
    peer: String,
    viewer_tx: oneshot::Sender<Transport<S>>,
}

impl<S> StreamerHandle<S> {
    /// Creates a handle and the receiver its streamer waits on.
    pub fn new(peer: impl Into<String>) -> (Self, oneshot::Receiver<Transport<S>>) {
        let (viewer_tx, viewer_rx) = oneshot::channel();
        (
            Self {
                peer: peer.into(),
                viewer_tx,
            },
            viewer_rx,
        )
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Hands the viewer's connection to the waiting streamer.
    ///
    /// # Errors
    ///
    /// Gives the connection back if the streamer's session is gone.
    pub fn pair(self, viewer: Transport<S>) -> Result<(), Transport<S>> {
        self.viewer_tx.send(viewer)
    }
}

/// Handles `REGISTER_STREAMER` and `FIND_STREAMER`; echoes anything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyBehavior;

#[async_trait]
impl<S> SessionBehavior<S> for ProxyBehavior
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn handle(&self, session: &mut Session<S>, message: OwnedMessage) -> Result<(), SessionError> {
        match message.kind {
            MessageKind::RegisterStreamer => register_streamer(session).await,
            MessageKind::FindStreamer => {
                let code = message.text().into_owned();
                find_streamer(session, &code).await
            }
            _ => echo(session, &message).await,
        }
    }
}

async fn register_streamer<S>(session: &mut Session<S>) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Some(registry) = session.registry() else {
        warn!(peer = %session.peer(), "registry is gone, refusing REGISTER_STREAMER");
        session.transport_mut()?.send_nack().await?;
        return Ok(());
    };

    let (handle, viewer_rx) = StreamerHandle::new(session.peer());
    let code = registry.register(handle, session.user().map(str::to_owned));
    drop(registry);

    let sent = session
        .transport_mut()?
        .send(BorrowedMessage::new(MessageKind::Id, code.as_bytes()))
        .await;
    if let Err(e) = sent {
        // Nobody can use a code the streamer never saw.
        if let Some(registry) = session.registry() {
            registry.claim(&code);
        }
        return Err(e.into());
    }
    session.set_state(ConnectionState::Registered);
    info!(peer = %session.peer(), "registered streamer with code {code}");

    match viewer_rx.await {
        Ok(viewer) => start_stream(session, viewer).await,
        Err(_) => {
            info!(peer = %session.peer(), "no viewer claimed {code}, closing");
            session.transport_mut()?.safe_disconnect(None).await;
            session.set_state(ConnectionState::Closed);
            Ok(())
        }
    }
}

async fn start_stream<S>(session: &mut Session<S>, mut viewer: Transport<S>) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut streamer = session.take_transport()?;

    if let Err(e) = viewer.send_ack().await {
        warn!(peer = %viewer.peer(), "viewer left before pairing completed: {e}");
        streamer
            .safe_disconnect(Some("Viewer disconnected before the stream started."))
            .await;
        session.set_state(ConnectionState::Closed);
        return Ok(());
    }
    if let Err(e) = streamer
        .send(BorrowedMessage::empty(MessageKind::StartStream))
        .await
    {
        warn!(peer = %streamer.peer(), "streamer left before pairing completed: {e}");
        viewer
            .safe_disconnect(Some("Streamer disconnected before the stream started."))
            .await;
        session.set_state(ConnectionState::Closed);
        return Ok(());
    }

    session.set_state(ConnectionState::Paired);
    let label = format!("{} <-> {}", streamer.peer(), viewer.peer());
    Bridge::new(streamer.into_inner(), viewer.into_inner(), label).spawn();
    Ok(())
}

async fn find_streamer<S>(session: &mut Session<S>, code: &str) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let claimed = session.registry().and_then(|registry| registry.claim(code));
    let Some(streamer) = claimed else {
        info!(peer = %session.peer(), "no streamer waiting with code {code:?}");
        session.transport_mut()?.send_nack().await?;
        return Ok(());
    };

    let streamer_peer = streamer.peer().to_string();
    let viewer = session.take_transport()?;
    match streamer.pair(viewer) {
        Ok(()) => {
            info!(peer = %session.peer(), "paired with streamer {streamer_peer} using {code}");
            session.set_state(ConnectionState::Paired);
        }
        Err(viewer) => {
            warn!(peer = %session.peer(), "streamer {streamer_peer} for {code} is gone");
            session.restore_transport(viewer);
            session.transport_mut()?.send_nack().await?;
        }
    }
    Ok(())
}
