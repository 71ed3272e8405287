//! StreamScreenUseCase: send the local screen to a paired viewer and replay
//! the viewer's input.
//!
//! After `START_STREAM` the streamer's connection is split. The write half
//! carries `SCREEN_UPDATE` packets at a fixed frame interval; the read half
//! is drained on its own task, which turns `MOUSE_INPUT` and `KEYBOARD_INPUT`
//! frames into [`IoController`] calls.
//!
//! ```text
//!            ┌──────── tick ────────┐
//!  capture ─▶ encode ─▶ SCREEN_UPDATE ─▶ MessageWriter ──▶ viewer
//!                                                           │
//!  IoController ◀── MOUSE_INPUT / KEYBOARD_INPUT ◀─ MessageReader
//! ```
//!
//! The loop ends when the viewer sends `DISCONNECT` or closes, when the
//! `running` flag is cleared, or after `max_frames` frames. Input payloads
//! with the wrong size and failed device calls are logged and skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sv_core::{BorrowedMessage, KeyboardEventData, MessageKind, MouseEventData};
use sv_transport::{MessageReader, MessageWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::devices::{IoController, VideoEncoder};
use crate::application::error::ClientError;

/// Reason sent to the viewer when the streamer stops on its own.
pub const STREAM_FINISHED_REASON: &str = "Stream finished.";

/// Why a streaming or viewing loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The peer sent `DISCONNECT` with this reason.
    PeerDisconnected(String),
    /// The connection reached end of stream.
    PeerClosed,
    /// The `running` flag was cleared.
    Stopped,
    /// The configured frame limit was reached.
    FrameLimit,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Time between captures.
    pub frame_interval: Duration,
    /// Stop after this many frames; `None` streams until told otherwise.
    pub max_frames: Option<u64>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames_sent: u64,
    pub inputs_handled: u64,
    pub end: StreamEnd,
}

/// Aborts the input task when dropped, so it never outlives [`StreamScreenUseCase::run`].
struct InputTask(JoinHandle<Result<StreamEnd, ClientError>>);

impl Drop for InputTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct StreamScreenUseCase<C, E> {
    controller: Arc<C>,
    encoder: E,
    settings: StreamSettings,
}

impl<C, E> StreamScreenUseCase<C, E>
where
    C: IoController + 'static,
    E: VideoEncoder,
{
    pub fn new(controller: Arc<C>, encoder: E, settings: StreamSettings) -> Self {
        Self {
            controller,
            encoder,
            settings,
        }
    }

    /// Streams until the viewer leaves or the loop is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if a `SCREEN_UPDATE` cannot be sent
    /// or the inbound side fails with anything other than a clean close.
    pub async fn run<R, W>(
        &mut self,
        reader: MessageReader<R>,
        mut writer: MessageWriter<W>,
        running: Arc<AtomicBool>,
    ) -> Result<StreamSummary, ClientError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        info!(peer = %writer.peer(), "streaming started");
        let handled = Arc::new(AtomicU64::new(0));
        let mut inputs = InputTask(tokio::spawn(pump_inputs(
            reader,
            Arc::clone(&self.controller),
            Arc::clone(&handled),
        )));
        let mut ticker = tokio::time::interval(self.settings.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames_sent = 0u64;

        let end = loop {
            tokio::select! {
                joined = &mut inputs.0 => {
                    // A panicked input task is treated like a closed peer.
                    break joined.unwrap_or(Ok(StreamEnd::PeerClosed))?;
                }
                _ = ticker.tick() => {
                    if !running.load(Ordering::Relaxed) {
                        break StreamEnd::Stopped;
                    }
                    if self.settings.max_frames.is_some_and(|max| frames_sent >= max) {
                        break StreamEnd::FrameLimit;
                    }
                    if self.send_frame(&mut writer).await? {
                        frames_sent += 1;
                    }
                }
            }
        };

        if matches!(end, StreamEnd::Stopped | StreamEnd::FrameLimit) {
            writer.safe_disconnect(Some(STREAM_FINISHED_REASON)).await;
        }
        drop(inputs);
        let inputs_handled = handled.load(Ordering::Relaxed);

        info!(
            peer = %writer.peer(),
            "streaming ended ({end:?}) after {frames_sent} frame(s), {inputs_handled} input event(s)"
        );
        Ok(StreamSummary {
            frames_sent,
            inputs_handled,
            end,
        })
    }

    /// Captures, encodes and sends one frame. Returns whether anything was
    /// sent.
    async fn send_frame<W>(&mut self, writer: &mut MessageWriter<W>) -> Result<bool, ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = match self.controller.capture_screenshot() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("screen capture failed: {e}");
                return Ok(false);
            }
        };
        let Some(packet) = self.encoder.encode(&frame) else {
            debug!("encoder produced no packet for this frame");
            return Ok(false);
        };
        writer
            .send(BorrowedMessage::new(MessageKind::ScreenUpdate, &packet))
            .await?;
        Ok(true)
    }
}

/// Reads inbound frames until `DISCONNECT`, end of stream, or an error,
/// counting applied input events in `handled`.
async fn pump_inputs<R, C>(
    mut reader: MessageReader<R>,
    controller: Arc<C>,
    handled: Arc<AtomicU64>,
) -> Result<StreamEnd, ClientError>
where
    R: AsyncRead + Unpin,
    C: IoController + ?Sized,
{
    loop {
        let message = match reader.receive_into_buffer().await {
            Ok(message) => message,
            Err(e) if e.is_disconnect() => return Ok(StreamEnd::PeerClosed),
            Err(e) => return Err(e.into()),
        };

        match message.kind {
            MessageKind::MouseInput => match message.convert_to::<MouseEventData>() {
                Ok(event) => match controller.handle_mouse_event(&event) {
                    Ok(()) => {
                        handled.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => warn!("mouse event {event:?} not applied: {e}"),
                },
                Err(e) => warn!("dropping MOUSE_INPUT: {e}"),
            },
            MessageKind::KeyboardInput => match message.convert_to::<KeyboardEventData>() {
                Ok(event) => match controller.handle_keyboard_event(&event) {
                    Ok(()) => {
                        handled.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => warn!("keyboard event {event:?} not applied: {e}"),
                },
                Err(e) => warn!("dropping KEYBOARD_INPUT: {e}"),
            },
            MessageKind::Disconnect => {
                let reason = message.text().into_owned();
                info!("viewer disconnected: {reason}");
                return Ok(StreamEnd::PeerDisconnected(reason));
            }
            other => debug!("ignoring {other} while streaming"),
        }
    }
}
