//! Raw byte relay between a paired streamer and viewer.
//!
//! Once two peers are paired the relay stops parsing frames. Whatever one
//! side writes is copied verbatim to the other, in both directions at once,
//! until either side closes or errors.
//!
//! ```text
//!   streamer ──read──▶ [8 KiB] ──write──▶ viewer
//!   streamer ◀─write── [8 KiB] ◀──read─── viewer
//! ```
//!
//! One task owns both streams. When either direction stops, or
//! [`BridgeHandle::close`] is called, that task shuts down both write sides
//! and drops both streams. Closing therefore happens exactly once, however
//! many times and from however many places it is requested.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

/// Size of the copy buffer in each direction.
pub const BRIDGE_BUFFER_SIZE: usize = 8 * 1024;

/// Upper bound on how long closing one side may take.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bytes relayed in each direction over a bridge's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub first_to_second: u64,
    pub second_to_first: u64,
}

/// Two streams waiting to be bridged.
pub struct Bridge<A, B> {
    first: A,
    second: B,
    label: String,
}

impl<A, B> Bridge<A, B>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(first: A, second: B, label: impl Into<String>) -> Self {
        Self {
            first,
            second,
            label: label.into(),
        }
    }

    /// Starts relaying on a new task.
    pub fn spawn(self) -> BridgeHandle {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(self.run_until(Arc::clone(&shutdown)));
        BridgeHandle { shutdown, task }
    }

    /// Relays until one side closes, then closes both.
    pub async fn run(self) -> BridgeStats {
        self.run_until(Arc::new(Notify::new())).await
    }

    async fn run_until(self, shutdown: Arc<Notify>) -> BridgeStats {
        let Bridge {
            first,
            second,
            label,
        } = self;
        info!("opening bridge [{label}]");

        let (mut first_read, mut first_write) = split(first);
        let (mut second_read, mut second_write) = split(second);
        let mut forward = vec![0u8; BRIDGE_BUFFER_SIZE];
        let mut backward = vec![0u8; BRIDGE_BUFFER_SIZE];
        let mut stats = BridgeStats::default();

        let reason = tokio::select! {
            result = relay(&mut first_read, &mut second_write, &mut forward, &mut stats.first_to_second) => {
                describe_end("first", result)
            }
            result = relay(&mut second_read, &mut first_write, &mut backward, &mut stats.second_to_first) => {
                describe_end("second", result)
            }
            _ = shutdown.notified() => "close requested".to_string(),
        };

        close_half(&mut first_write).await;
        close_half(&mut second_write).await;
        info!(
            "closing bridge [{label}]: {reason} ({} / {} bytes relayed)",
            stats.first_to_second, stats.second_to_first
        );
        stats
    }
}

/// Handle to a spawned bridge.
pub struct BridgeHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<BridgeStats>,
}

impl BridgeHandle {
    /// Asks the bridge to close both sides. Safe to call repeatedly, and
    /// after the bridge has already stopped on its own.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Waits for the bridge to stop and returns what it relayed.
    pub async fn join(self) -> BridgeStats {
        self.task.await.unwrap_or_default()
    }
}

async fn relay<R, W>(reader: &mut R, writer: &mut W, buffer: &mut [u8], relayed: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = reader.read(buffer).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buffer[..n]).await?;
        writer.flush().await?;
        *relayed += n as u64;
    }
}

fn describe_end(side: &str, result: io::Result<()>) -> String {
    match result {
        Ok(()) => format!("{side} side closed"),
        Err(e) => format!("{side} side failed: {e}"),
    }
}

async fn close_half<W: AsyncWrite + Unpin>(writer: &mut W) {
    match timeout(CLOSE_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("shutdown after bridge end: {e}"),
        Err(_) => debug!("shutdown after bridge end timed out"),
    }
}
