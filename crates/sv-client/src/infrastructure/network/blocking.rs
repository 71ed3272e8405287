//! Synchronous facade over [`ClientSocket`].
//!
//! A [`BlockingClient`] owns a small multi-threaded Tokio runtime. Its
//! worker thread drives the socket I/O while the calling thread blocks in
//! `block_on` until each request completes. This lets non-async callers
//! (scripts, tests, GUI threads) speak the relay protocol one call at a time.
//!
//! Calling any method from inside another Tokio runtime panics, as with any
//! `block_on`.

use std::sync::Arc;
use std::time::Duration;

use sv_core::{BorrowedMessage, OwnedMessage};
use sv_transport::ClientTlsStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::{Builder, Runtime};
use tokio_rustls::rustls::ClientConfig;

use super::ClientSocket;
use crate::application::error::ClientError;

const IO_THREAD_NAME: &str = "sv-client-io";

fn io_runtime() -> Result<Runtime, ClientError> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name(IO_THREAD_NAME)
        .enable_all()
        .build()
        .map_err(ClientError::Runtime)
}

pub struct BlockingClient<S = ClientTlsStream> {
    // Field order matters: the socket must drop before its runtime.
    socket: ClientSocket<S>,
    runtime: Runtime,
}

impl BlockingClient<ClientTlsStream> {
    /// Connects to the relay on a fresh I/O runtime.
    ///
    /// # Errors
    ///
    /// [`ClientError::Runtime`] if the runtime cannot start, otherwise the
    /// errors of [`ClientSocket::connect`].
    pub fn connect(
        host: &str,
        port: u16,
        tls_config: Arc<ClientConfig>,
        buffer_size: usize,
    ) -> Result<Self, ClientError> {
        let runtime = io_runtime()?;
        let socket = runtime.block_on(ClientSocket::connect(host, port, tls_config, buffer_size))?;
        Ok(Self { socket, runtime })
    }
}

impl<S> BlockingClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-open socket.
    pub fn with_socket(socket: ClientSocket<S>) -> Result<Self, ClientError> {
        Ok(Self {
            socket,
            runtime: io_runtime()?,
        })
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<(), ClientError> {
        self.runtime.block_on(self.socket.login(email, password))
    }

    pub fn request_streamer_id(&mut self) -> Result<String, ClientError> {
        self.runtime.block_on(self.socket.request_streamer_id())
    }

    pub fn find_streamer(&mut self, code: &str) -> Result<bool, ClientError> {
        self.runtime.block_on(self.socket.find_streamer(code))
    }

    pub fn wait_for_start_stream(&mut self, limit: Option<Duration>) -> Result<bool, ClientError> {
        self.runtime.block_on(self.socket.wait_for_start_stream(limit))
    }

    pub fn send(&mut self, message: BorrowedMessage<'_>) -> Result<(), ClientError> {
        self.runtime.block_on(self.socket.send(message))
    }

    pub fn receive(&mut self) -> Result<OwnedMessage, ClientError> {
        self.runtime.block_on(self.socket.receive())
    }

    pub fn disconnect(&mut self, reason: Option<&str>) {
        self.runtime.block_on(self.socket.disconnect(reason));
    }

    /// Hands the socket back for async use, dropping the I/O runtime.
    pub fn into_socket(self) -> ClientSocket<S> {
        self.socket
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sv_core::MessageKind;
    use sv_transport::Transport;
    use tokio::io::{duplex, DuplexStream};

    /// Runs `relay` against the far end of a duplex pipe on its own thread.
    fn client_with_peer<F, Fut>(relay: F) -> (BlockingClient<DuplexStream>, std::thread::JoinHandle<()>)
    where
        F: FnOnce(Transport<DuplexStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()>,
    {
        let (a, b) = duplex(4096);
        let peer = std::thread::spawn(move || {
            let rt = Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(relay(Transport::new(b, "client")));
        });
        let client = BlockingClient::with_socket(ClientSocket::from_transport(Transport::new(a, "relay"))).unwrap();
        (client, peer)
    }

    #[test]
    fn test_blocking_client_runs_the_streamer_handshake() {
        // Arrange
        let (mut client, peer) = client_with_peer(|mut relay| async move {
            assert_eq!(relay.receive().await.unwrap().kind, MessageKind::Login);
            relay.send_ack().await.unwrap();
            assert_eq!(relay.receive().await.unwrap().kind, MessageKind::RegisterStreamer);
            relay
                .send(BorrowedMessage::new(MessageKind::Id, b"0123456789"))
                .await
                .unwrap();
            relay
                .send(BorrowedMessage::empty(MessageKind::StartStream))
                .await
                .unwrap();
        });

        // Act
        client.login("a@example.com", "pw").unwrap();
        let code = client.request_streamer_id().unwrap();
        let started = client.wait_for_start_stream(Some(Duration::from_secs(5))).unwrap();

        // Assert
        assert_eq!(code, "0123456789");
        assert!(started);
        peer.join().unwrap();
    }

    #[test]
    fn test_blocking_client_send_and_receive() {
        let (mut client, peer) = client_with_peer(|mut relay| async move {
            let message = relay.receive().await.unwrap();
            relay.send(message.as_borrowed()).await.unwrap();
        });

        client
            .send(BorrowedMessage::new(MessageKind::JustAMessage, b"ping"))
            .unwrap();
        let echoed = client.receive().unwrap();

        assert_eq!(echoed, OwnedMessage::new(MessageKind::JustAMessage, "ping"));
        peer.join().unwrap();
    }

    #[test]
    fn test_blocking_client_sees_relay_close() {
        let (mut client, peer) = client_with_peer(|relay| async move {
            drop(relay);
        });
        peer.join().unwrap();

        let err = client.receive().unwrap_err();

        assert!(err.is_disconnect());
    }
}
