//! ScreenViewer client: entry point.
//!
//! # Usage
//!
//! ```text
//! sv-client [OPTIONS] --email <EMAIL> --password <PASSWORD> <COMMAND>
//!
//! Commands:
//!   stream   Register as a streamer and share a test-pattern screen
//!   view     Watch the streamer holding CODE
//!
//! Options:
//!   --host         <HOST>   Relay host name or IP [default: localhost]
//!   --port         <PORT>   Relay port [default: 4321]
//!   --ca-cert      <PATH>   PEM certificate to trust for the relay
//!   --insecure              Accept any relay certificate (development only)
//!   --buffer-size  <BYTES>  Largest frame accepted [default: 5 MiB]
//! ```
//!
//! Every option can also come from the environment: `SV_HOST`, `SV_PORT`,
//! `SV_EMAIL`, `SV_PASSWORD`, `SV_CA_CERT`, `SV_INSECURE`, `SV_BUFFER_SIZE`.
//!
//! # Flow
//!
//! ```text
//! stream: connect ─▶ login ─▶ REGISTER_STREAMER ─▶ (print code) ─▶ wait START_STREAM ─▶ StreamScreenUseCase
//! view:   connect ─▶ login ─▶ FIND_STREAMER(code) ─▶ ACK ─▶ ViewScreenUseCase
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tokio_rustls::rustls::ClientConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sv_client::application::stream_screen::{StreamScreenUseCase, StreamSettings};
use sv_client::application::view_screen::ViewScreenUseCase;
use sv_client::infrastructure::codec::raw::RawVideoCodec;
use sv_client::infrastructure::display::LoggingFrameSink;
use sv_client::infrastructure::io_controller::TestPatternController;
use sv_client::infrastructure::network::ClientSocket;
use sv_core::DEFAULT_BUFFER_SIZE;
use sv_transport::tls;

const VIEWER_LEFT_REASON: &str = "Viewer closed the stream.";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ScreenViewer client.
#[derive(Debug, Parser)]
#[command(
    name = "sv-client",
    about = "Share a screen through a ScreenViewer relay, or view one",
    version
)]
struct Cli {
    #[arg(long, default_value = "localhost", env = "SV_HOST")]
    host: String,

    #[arg(long, default_value_t = 4321, env = "SV_PORT")]
    port: u16,

    #[arg(long, env = "SV_EMAIL")]
    email: String,

    #[arg(long, env = "SV_PASSWORD", hide_env_values = true)]
    password: String,

    /// PEM file with the certificate (or CA) the relay presents.
    #[arg(long, env = "SV_CA_CERT", conflicts_with = "insecure")]
    ca_cert: Option<PathBuf>,

    /// Skip relay certificate verification.
    #[arg(long, env = "SV_INSECURE")]
    insecure: bool,

    /// Receive buffer size; also the largest frame accepted.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, env = "SV_BUFFER_SIZE")]
    buffer_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register as a streamer and share a test-pattern screen.
    Stream {
        /// Frames per second.
        #[arg(long, default_value_t = 10)]
        fps: u32,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 360)]
        height: u32,
        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u64>,
        /// Give up if no viewer connects within this many seconds.
        #[arg(long)]
        wait_secs: Option<u64>,
    },
    /// Watch the streamer holding CODE.
    View {
        code: String,
    },
}

impl Cli {
    fn tls_config(&self) -> anyhow::Result<Arc<ClientConfig>> {
        if self.insecure {
            return Ok(tls::insecure_client_config()?);
        }
        match &self.ca_cert {
            Some(path) => tls::client_config_trusting(path)
                .with_context(|| format!("failed to load CA certificate {}", path.display())),
            None => bail!("pass --ca-cert <PEM> to trust the relay, or --insecure"),
        }
    }
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let tls_config = cli.tls_config()?;

    // ── Shutdown signalling ───────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let stop = Arc::new(Notify::new());
    {
        let running = Arc::clone(&running);
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received Ctrl+C, shutting down");
                    running.store(false, Ordering::Relaxed);
                    stop.notify_waiters();
                }
                Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
            }
        });
    }

    let mut socket = ClientSocket::connect(&cli.host, cli.port, tls_config, cli.buffer_size).await?;
    socket
        .login(&cli.email, &cli.password)
        .await
        .context("login rejected by relay")?;

    match cli.command {
        Command::Stream {
            fps,
            width,
            height,
            max_frames,
            wait_secs,
        } => {
            let code = socket.request_streamer_id().await?;
            info!("share this code with the viewer: {code}");

            let started = tokio::select! {
                started = socket.wait_for_start_stream(wait_secs.map(Duration::from_secs)) => started?,
                _ = stop.notified() => false,
            };
            if !started {
                socket.disconnect(None).await;
                bail!("no viewer joined; giving up");
            }

            let (reader, writer) = socket.into_split();
            let controller = Arc::new(TestPatternController::new(width, height));
            let settings = StreamSettings {
                frame_interval: frame_interval(fps),
                max_frames,
            };
            let mut use_case = StreamScreenUseCase::new(controller, RawVideoCodec, settings);
            let summary = use_case.run(reader, writer, running).await?;
            info!(
                "sent {} frame(s), applied {} input event(s)",
                summary.frames_sent, summary.inputs_handled
            );
        }
        Command::View { code } => {
            if !socket.find_streamer(&code).await? {
                socket.disconnect(None).await;
                bail!("no streamer is waiting with code {code}");
            }
            info!("paired with streamer {code}");

            let (mut reader, mut writer) = socket.into_split();
            let mut use_case = ViewScreenUseCase::new(RawVideoCodec, LoggingFrameSink::new(30));
            tokio::select! {
                summary = use_case.run(&mut reader) => {
                    let summary = summary?;
                    if summary.frames_dropped > 0 {
                        warn!("{} frame(s) could not be decoded", summary.frames_dropped);
                    }
                    info!("received {} frame(s)", summary.frames_shown);
                }
                _ = stop.notified() => {
                    writer.safe_disconnect(Some(VIEWER_LEFT_REASON)).await;
                }
            }
        }
    }

    info!("ScreenViewer client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_view_parses_code_and_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from([
            "sv-client", "--email", "a@example.com", "--password", "pw", "view", "0123456789",
        ]);

        // Assert
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.port, 4321);
        assert_eq!(cli.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(matches!(cli.command, Command::View { ref code } if code == "0123456789"));
    }

    #[test]
    fn test_cli_stream_options() {
        let cli = Cli::parse_from([
            "sv-client", "--email", "a", "--password", "b", "--port", "9000", "stream", "--fps", "25",
            "--max-frames", "100",
        ]);
        assert_eq!(cli.port, 9000);
        match cli.command {
            Command::Stream { fps, max_frames, width, .. } => {
                assert_eq!(fps, 25);
                assert_eq!(max_frames, Some(100));
                assert_eq!(width, 640);
            }
            Command::View { .. } => panic!("expected stream"),
        }
    }

    #[test]
    fn test_cli_ca_cert_conflicts_with_insecure() {
        let result = Cli::try_parse_from([
            "sv-client", "--email", "a", "--password", "b", "--insecure", "--ca-cert", "ca.pem", "view", "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tls_config_requires_a_trust_choice() {
        let cli = Cli::parse_from(["sv-client", "--email", "a", "--password", "b", "view", "x"]);
        assert!(cli.tls_config().is_err());
    }

    #[test]
    fn test_frame_interval_clamps_zero_fps() {
        assert_eq!(frame_interval(0), Duration::from_secs(1));
        assert_eq!(frame_interval(10), Duration::from_millis(100));
    }
}
