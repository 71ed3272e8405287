//! Per-connection session state machine.
//!
//! Every accepted connection gets one [`Session`]. The session owns the
//! connection's [`Transport`] until it hands it to someone else (the registry,
//! a viewer, or a bridge) and drives it through these states:
//!
//! ```text
//!  Unauthenticated ──LOGIN ok──▶ Authenticated ──REGISTER_STREAMER──▶ Registered ──▶ Paired
//!        │                         │      ▲                                 (viewer claimed the code)
//!        │ anything else           │      │ other frames: handled by the behavior, then read again
//!        ▼                         ▼      │
//!      Closed ◀──── read error / handler error
//!                                  └──FIND_STREAMER(code) found──▶ Paired
//! ```
//!
//! # The login gate
//!
//! The first frame must be `LOGIN` with a JSON body
//! `{"email": "...", "password": "..."}` of at most
//! [`FIRST_MESSAGE_MAX_SIZE`] bytes. Any other kind gets
//! `DISCONNECT("You have to login first.")` and the connection is closed.
//! Bad credentials or an unparsable body get `NACK`, then the connection is
//! closed. Only after `ACK` does anything reach the [`SessionBehavior`].
//!
//! # Shared state
//!
//! Sessions hold only weak references to the registry and credential store
//! ([`SessionContext`]). When the server is torn down first, lookups through
//! a dead reference behave like "not found" instead of keeping the server's
//! state alive.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use sv_core::{BorrowedMessage, LoginCredentials, MessageKind, OwnedMessage};
use sv_transport::{Transport, TransportError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::application::credentials::CredentialStore;
use crate::application::pairing::StreamerRegistry;

/// Largest accepted `LOGIN` payload.
pub const FIRST_MESSAGE_MAX_SIZE: usize = 1000;

/// Reason sent to peers whose first frame is not `LOGIN`.
pub const LOGIN_REQUIRED_REASON: &str = "You have to login first.";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    /// Waiting in the registry for a viewer.
    Registered,
    /// Connection handed to a byte bridge.
    Paired,
    Closed,
}

/// Errors a [`SessionBehavior`] may return. Any error ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session no longer owns its connection")]
    Detached,
}

/// Weak handles to the server-wide state a session may consult.
pub struct SessionContext<S> {
    registry: Weak<StreamerRegistry<S>>,
    credentials: Weak<dyn CredentialStore>,
}

impl<S> SessionContext<S> {
    pub fn new(registry: &Arc<StreamerRegistry<S>>, credentials: &Arc<dyn CredentialStore>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            credentials: Arc::downgrade(credentials),
        }
    }
}

impl<S> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
            credentials: Weak::clone(&self.credentials),
        }
    }
}

/// What a session does with frames after login.
#[async_trait]
pub trait SessionBehavior<S>: Send + Sync {
    /// Handles one post-login frame. The session reads the next frame only
    /// if the state is still [`ConnectionState::Authenticated`] afterwards.
    async fn handle(&self, session: &mut Session<S>, message: OwnedMessage) -> Result<(), SessionError>;
}

/// Replies to every frame with `JUST_A_MESSAGE("Got your message! '<text>'")`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBehavior;

#[async_trait]
impl<S> SessionBehavior<S> for EchoBehavior
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn handle(&self, session: &mut Session<S>, message: OwnedMessage) -> Result<(), SessionError> {
        echo(session, &message).await
    }
}

pub(crate) async fn echo<S>(session: &mut Session<S>, message: &OwnedMessage) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let reply = format!("Got your message! '{}'", message.text());
    session
        .transport_mut()?
        .send(BorrowedMessage::new(MessageKind::JustAMessage, reply.as_bytes()))
        .await?;
    Ok(())
}

/// Outcome of parsing the first frame.
enum LoginAttempt {
    Credentials(LoginCredentials),
    Malformed(String),
    NotLogin(MessageKind),
}

impl LoginAttempt {
    fn parse(message: BorrowedMessage<'_>) -> Self {
        if message.kind != MessageKind::Login {
            return Self::NotLogin(message.kind);
        }
        match serde_json::from_slice(message.content) {
            Ok(credentials) => Self::Credentials(credentials),
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

/// One accepted connection.
pub struct Session<S> {
    transport: Option<Transport<S>>,
    state: ConnectionState,
    peer: String,
    user: Option<String>,
    context: SessionContext<S>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(transport: Transport<S>, context: SessionContext<S>) -> Self {
        let peer = transport.peer().to_string();
        Self {
            transport: Some(transport),
            state: ConnectionState::Unauthenticated,
            peer,
            user: None,
            context,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        debug!(peer = %self.peer, "{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Email the peer logged in with.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// # Errors
    ///
    /// [`SessionError::Detached`] once the transport has been handed off.
    pub fn transport_mut(&mut self) -> Result<&mut Transport<S>, SessionError> {
        self.transport.as_mut().ok_or(SessionError::Detached)
    }

    /// Moves the transport out, leaving the session detached.
    pub fn take_transport(&mut self) -> Result<Transport<S>, SessionError> {
        self.transport.take().ok_or(SessionError::Detached)
    }

    /// Gives a previously taken transport back.
    pub fn restore_transport(&mut self, transport: Transport<S>) {
        self.transport = Some(transport);
    }

    /// The streamer registry, if the server still exists.
    pub fn registry(&self) -> Option<Arc<StreamerRegistry<S>>> {
        self.context.registry.upgrade()
    }

    /// Drives the connection until it is closed or handed off, and returns
    /// the final state.
    pub async fn run<B>(mut self, behavior: &B) -> ConnectionState
    where
        B: SessionBehavior<S> + ?Sized,
    {
        info!(peer = %self.peer, "session started");
        self.authenticate().await;

        while self.state == ConnectionState::Authenticated {
            let received = match self.transport.as_mut() {
                Some(transport) => transport.receive().await,
                None => break,
            };
            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    if e.is_disconnect() {
                        debug!(peer = %self.peer, "peer closed the connection");
                    } else {
                        warn!(peer = %self.peer, "read failed: {e}");
                    }
                    self.set_state(ConnectionState::Closed);
                    break;
                }
            };

            debug!(peer = %self.peer, "received {} ({} bytes)", message.kind, message.content.len());
            if let Err(e) = behavior.handle(&mut self, message).await {
                warn!(peer = %self.peer, "closing session: {e}");
                if let Some(transport) = self.transport.as_mut() {
                    transport.safe_disconnect(Some(&e.to_string())).await;
                }
                self.set_state(ConnectionState::Closed);
            }
        }

        info!(peer = %self.peer, "session ended in state {:?}", self.state);
        self.state
    }

    async fn authenticate(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            self.set_state(ConnectionState::Closed);
            return;
        };

        let limit = FIRST_MESSAGE_MAX_SIZE.min(transport.buffer_size());
        let attempt = match transport.receive_with(limit, LoginAttempt::parse).await {
            Ok(attempt) => attempt,
            Err(e) => {
                debug!(peer = %self.peer, "no login received: {e}");
                self.set_state(ConnectionState::Closed);
                return;
            }
        };

        let credentials = match attempt {
            LoginAttempt::NotLogin(kind) => {
                info!(peer = %self.peer, "got {kind} before LOGIN");
                transport.safe_disconnect(Some(LOGIN_REQUIRED_REASON)).await;
                self.set_state(ConnectionState::Closed);
                return;
            }
            LoginAttempt::Malformed(reason) => {
                info!(peer = %self.peer, "malformed LOGIN: {reason}");
                self.reject_login().await;
                return;
            }
            LoginAttempt::Credentials(credentials) => credentials,
        };

        let email = credentials.email.clone();
        if !self.check_credentials(credentials).await {
            info!(peer = %self.peer, "login rejected for {email}");
            self.reject_login().await;
            return;
        }

        match self.transport_mut() {
            Ok(transport) => {
                if let Err(e) = transport.send_ack().await {
                    warn!(peer = %self.peer, "could not acknowledge login: {e}");
                    self.set_state(ConnectionState::Closed);
                    return;
                }
            }
            Err(_) => {
                self.set_state(ConnectionState::Closed);
                return;
            }
        }

        info!(peer = %self.peer, "{email} logged in");
        self.user = Some(email);
        self.set_state(ConnectionState::Authenticated);
    }

    /// Answers a failed login with `NACK` and then closes the connection.
    ///
    /// The peer never gets a second attempt on the same connection. Nothing
    /// else is read after the `NACK`, and the write side is shut down so the
    /// client sees end of stream instead of a silent socket.
    async fn reject_login(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.send_nack().await {
                debug!(peer = %self.peer, "could not send NACK: {e}");
            }
            transport.safe_disconnect(None).await;
        }
        self.set_state(ConnectionState::Closed);
    }

    async fn check_credentials(&self, credentials: LoginCredentials) -> bool {
        let Some(store) = self.context.credentials.upgrade() else {
            warn!(peer = %self.peer, "credential store is gone, rejecting login");
            return false;
        };
        let LoginCredentials { email, password } = credentials;
        tokio::task::spawn_blocking(move || store.authenticate(&email, &password))
            .await
            .unwrap_or(false)
    }
}
