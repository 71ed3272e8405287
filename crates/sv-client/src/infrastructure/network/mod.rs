//! Network infrastructure for the client: the relay connection.
//!
//! [`ClientSocket`] wraps one TLS [`Transport`] to the relay and exposes the
//! request/reply steps a streamer or viewer goes through before pairing:
//!
//! ```text
//! streamer                               viewer
//! connect ─▶ login ─▶ request_streamer_id   connect ─▶ login ─▶ find_streamer(code)
//!            wait_for_start_stream                               (true = paired)
//!            into_split ─▶ StreamScreenUseCase                   into_split ─▶ ViewScreenUseCase
//! ```
//!
//! Every step is a plain `async fn`. The [`blocking`] module puts a dedicated
//! runtime behind them for callers on a synchronous thread.

pub mod blocking;

use std::sync::Arc;
use std::time::Duration;

use sv_core::{BorrowedMessage, LoginCredentials, MessageKind, OwnedMessage};
use sv_transport::{tls, ClientTlsStream, MessageReader, MessageWriter, Transport};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::application::error::ClientError;

/// A logged-out or logged-in connection to the relay.
pub struct ClientSocket<S = ClientTlsStream> {
    transport: Transport<S>,
}

impl ClientSocket<ClientTlsStream> {
    /// Opens a TCP connection to `host:port` and completes the TLS handshake,
    /// using `host` for SNI and certificate name checks.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ServerName`] if `host` is neither a DNS name nor an IP.
    /// - [`ClientError::Connect`] if the TCP connect or TLS handshake fails.
    pub async fn connect(
        host: &str,
        port: u16,
        tls_config: Arc<ClientConfig>,
        buffer_size: usize,
    ) -> Result<Self, ClientError> {
        let addr = format!("{host}:{port}");
        let server_name =
            tls::server_name(host).map_err(|_| ClientError::ServerName(host.to_string()))?;

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let stream = TlsConnector::from(tls_config)
            .connect(server_name, tcp)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;

        info!("connected to relay at {addr}");
        Ok(Self::from_transport(Transport::with_buffer_size(
            stream,
            addr,
            buffer_size,
        )))
    }
}

impl<S> ClientSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_transport(transport: Transport<S>) -> Self {
        Self { transport }
    }

    pub fn peer(&self) -> &str {
        self.transport.peer()
    }

    /// Sends `LOGIN` and waits for the relay's verdict.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] wrapping `UnexpectedKind` if the relay
    /// answers `NACK`, or any I/O failure.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ClientError> {
        let body = serde_json::to_vec(&LoginCredentials {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.transport
            .send(BorrowedMessage::new(MessageKind::Login, &body))
            .await?;
        self.transport.receive_ack().await?;
        info!("logged in as {email}");
        Ok(())
    }

    /// Registers as a streamer and returns the code a viewer must present.
    ///
    /// # Errors
    ///
    /// [`ClientError::RegisterRejected`] if the reply is anything but `ID`.
    pub async fn request_streamer_id(&mut self) -> Result<String, ClientError> {
        self.transport
            .send(BorrowedMessage::empty(MessageKind::RegisterStreamer))
            .await?;
        let reply = self.transport.receive_into_buffer().await?;
        match reply.kind {
            MessageKind::Id => {
                let code = reply.text().into_owned();
                info!("registered as streamer with code {code}");
                Ok(code)
            }
            other => Err(ClientError::RegisterRejected(other)),
        }
    }

    /// Asks the relay to pair with the streamer holding `code`. Returns
    /// `true` iff the relay answered `ACK`.
    pub async fn find_streamer(&mut self, code: &str) -> Result<bool, ClientError> {
        self.transport
            .send(BorrowedMessage::new(MessageKind::FindStreamer, code.as_bytes()))
            .await?;
        let reply = self.transport.receive_into_buffer().await?;
        debug!("FIND_STREAMER({code}) answered with {}", reply.kind);
        Ok(reply.kind == MessageKind::Ack)
    }

    /// Reads until `START_STREAM` arrives, skipping anything else. Returns
    /// `false` if `limit` elapses first.
    ///
    /// A timed-out wait may have stopped part way through a frame, so the
    /// socket should be discarded after a `false`.
    pub async fn wait_for_start_stream(
        &mut self,
        limit: Option<Duration>,
    ) -> Result<bool, ClientError> {
        match limit {
            None => self.skip_until_start_stream().await.map(|()| true),
            Some(limit) => match tokio::time::timeout(limit, self.skip_until_start_stream()).await {
                Ok(result) => result.map(|()| true),
                Err(_) => Ok(false),
            },
        }
    }

    async fn skip_until_start_stream(&mut self) -> Result<(), ClientError> {
        loop {
            let message = self.transport.receive_into_buffer().await?;
            if message.kind == MessageKind::StartStream {
                return Ok(());
            }
            debug!("skipping {} while waiting for START_STREAM", message.kind);
        }
    }

    pub async fn send(&mut self, message: BorrowedMessage<'_>) -> Result<(), ClientError> {
        self.transport.send(message).await?;
        Ok(())
    }

    pub async fn receive(&mut self) -> Result<OwnedMessage, ClientError> {
        Ok(self.transport.receive().await?)
    }

    /// Best-effort close; never fails.
    pub async fn disconnect(&mut self, reason: Option<&str>) {
        self.transport.safe_disconnect(reason).await;
    }

    pub fn transport_mut(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    pub fn into_transport(self) -> Transport<S> {
        self.transport
    }

    /// Splits the paired connection for the stream/view loops.
    pub fn into_split(self) -> (MessageReader<ReadHalf<S>>, MessageWriter<WriteHalf<S>>) {
        self.transport.into_split()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
