//! ViewScreenUseCase: show a paired streamer's screen and forward input.
//!
//! The viewer splits its connection once `FIND_STREAMER` is acknowledged.
//! [`ViewScreenUseCase::run`] drains the read half, decoding every
//! `SCREEN_UPDATE` into a [`Frame`](crate::application::devices::Frame) for
//! the sink. Local pointer and key events go the other way through
//! [`send_mouse_event`] and [`send_keyboard_event`] on the write half.

use sv_core::{KeyboardEventData, MessageKind, MouseEventData};
use sv_transport::{MessageReader, MessageWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::application::devices::{FrameSink, VideoDecoder};
use crate::application::error::ClientError;
use crate::application::stream_screen::StreamEnd;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSummary {
    pub frames_shown: u64,
    /// Updates the decoder rejected.
    pub frames_dropped: u64,
    pub end: StreamEnd,
}

pub struct ViewScreenUseCase<D, K> {
    decoder: D,
    sink: K,
}

impl<D, K> ViewScreenUseCase<D, K>
where
    D: VideoDecoder,
    K: FrameSink,
{
    pub fn new(decoder: D, sink: K) -> Self {
        Self { decoder, sink }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Presents screen updates until the streamer leaves.
    ///
    /// Dropping the returned future mid-frame leaves the reader unusable;
    /// callers that stop early should discard the connection too.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] for a malformed frame or an I/O
    /// failure other than a clean close.
    pub async fn run<R>(
        &mut self,
        reader: &mut MessageReader<R>,
    ) -> Result<ViewSummary, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        info!(peer = %reader.peer(), "viewing started");
        let mut frames_shown = 0u64;
        let mut frames_dropped = 0u64;

        let end = loop {
            let message = match reader.receive_into_buffer().await {
                Ok(message) => message,
                Err(e) if e.is_disconnect() => break StreamEnd::PeerClosed,
                Err(e) => return Err(e.into()),
            };

            match message.kind {
                MessageKind::ScreenUpdate => match self.decoder.decode(message.content) {
                    Some(frame) => {
                        self.sink.present(frame);
                        frames_shown += 1;
                    }
                    None => {
                        frames_dropped += 1;
                        warn!("could not decode a {}-byte screen update", message.content.len());
                    }
                },
                MessageKind::Disconnect => {
                    let reason = message.text().into_owned();
                    info!("streamer disconnected: {reason}");
                    break StreamEnd::PeerDisconnected(reason);
                }
                other => debug!("unexpected {other} while viewing"),
            }
        };

        info!("viewing ended ({end:?}) after {frames_shown} frame(s)");
        Ok(ViewSummary {
            frames_shown,
            frames_dropped,
            end,
        })
    }
}

/// Forwards one pointer event to the streamer.
pub async fn send_mouse_event<W>(
    writer: &mut MessageWriter<W>,
    event: &MouseEventData,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    writer.send_fixed(MessageKind::MouseInput, event).await?;
    Ok(())
}

/// Forwards one key event to the streamer.
pub async fn send_keyboard_event<W>(
    writer: &mut MessageWriter<W>,
    event: &KeyboardEventData,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    writer.send_fixed(MessageKind::KeyboardInput, event).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::devices::Frame;
    use crate::infrastructure::codec::raw::RawVideoCodec;
    use sv_core::{BorrowedMessage, FixedPayload};
    use sv_transport::Transport;
    use tokio::io::duplex;

    /// Sink that keeps every frame it is given.
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<Frame>,
    }

    impl FrameSink for RecordingSink {
        fn present(&mut self, frame: Frame) {
            self.frames.push(frame);
        }
    }

    fn encoded(width: u32, height: u32, fill: u8) -> Vec<u8> {
        use crate::application::devices::VideoEncoder;
        let frame = Frame {
            width,
            height,
            pixels: vec![fill; Frame::expected_len(width, height)],
        };
        RawVideoCodec.encode(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_viewer_presents_updates_until_disconnect() {
        // Arrange
        let (a, b) = duplex(1 << 16);
        let (mut reader, _writer) = Transport::with_buffer_size(a, "streamer", 1 << 16).into_split();
        let mut streamer = Transport::with_buffer_size(b, "viewer", 1 << 16);
        let mut use_case = ViewScreenUseCase::new(RawVideoCodec, RecordingSink::default());

        // Act
        for fill in [1u8, 2] {
            let packet = encoded(4, 2, fill);
            streamer
                .send(BorrowedMessage::new(MessageKind::ScreenUpdate, &packet))
                .await
                .unwrap();
        }
        streamer
            .send(BorrowedMessage::new(MessageKind::JustAMessage, b"noise"))
            .await
            .unwrap();
        streamer.disconnect(Some("Stream finished.")).await.unwrap();
        let summary = use_case.run(&mut reader).await.unwrap();

        // Assert
        assert_eq!(summary.frames_shown, 2);
        assert_eq!(summary.end, StreamEnd::PeerDisconnected("Stream finished.".into()));
        let frames = &use_case.sink().frames;
        assert_eq!(frames[0].pixels[0], 1);
        assert_eq!(frames[1].pixels[0], 2);
        assert_eq!((frames[1].width, frames[1].height), (4, 2));
    }

    #[tokio::test]
    async fn test_viewer_counts_undecodable_updates() {
        let (a, b) = duplex(4096);
        let (mut reader, _writer) = Transport::with_buffer_size(a, "streamer", 4096).into_split();
        let mut streamer = Transport::with_buffer_size(b, "viewer", 4096);
        let mut use_case = ViewScreenUseCase::new(RawVideoCodec, RecordingSink::default());

        streamer
            .send(BorrowedMessage::new(MessageKind::ScreenUpdate, &[0u8; 3]))
            .await
            .unwrap();
        drop(streamer);
        let summary = use_case.run(&mut reader).await.unwrap();

        assert_eq!(summary.frames_dropped, 1);
        assert_eq!(summary.frames_shown, 0);
        assert_eq!(summary.end, StreamEnd::PeerClosed);
    }

    #[tokio::test]
    async fn test_input_events_are_sent_as_fixed_payloads() {
        // Arrange
        let (a, b) = duplex(4096);
        let (_reader, mut writer) = Transport::new(a, "streamer").into_split();
        let mut streamer = Transport::new(b, "viewer");
        let mouse = MouseEventData { button_mask: 4, x: -3, y: 99 };
        let key = KeyboardEventData { down: true, key: 13 };

        // Act
        send_mouse_event(&mut writer, &mouse).await.unwrap();
        send_keyboard_event(&mut writer, &key).await.unwrap();

        // Assert
        let first = streamer.receive().await.unwrap();
        assert_eq!(first.kind, MessageKind::MouseInput);
        assert_eq!(first.content, mouse.to_bytes());
        let second = streamer.receive().await.unwrap();
        assert_eq!(second.kind, MessageKind::KeyboardInput);
        assert_eq!(second.as_borrowed().convert_to::<KeyboardEventData>().unwrap(), key);
    }
}
