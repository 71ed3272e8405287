//! Uncompressed frame packets.
//!
//! ```text
//! ┌──────────────┬───────────────┬────────────────────────────┐
//! │ width u32 LE │ height u32 LE │ width*height*4 BGRA bytes  │
//! └──────────────┴───────────────┴────────────────────────────┘
//! ```
//!
//! A 1920x1080 frame is about 8 MiB, larger than the default 5 MiB receive
//! buffer, so raw streaming is only practical at reduced sizes.

use tracing::warn;

use crate::application::devices::{Frame, VideoDecoder, VideoEncoder};

/// Size of the dimension prefix.
pub const RAW_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawVideoCodec;

impl VideoEncoder for RawVideoCodec {
    fn encode(&mut self, frame: &Frame) -> Option<Vec<u8>> {
        let expected = Frame::expected_len(frame.width, frame.height);
        if frame.pixels.len() != expected {
            warn!(
                "frame {}x{} has {} pixel bytes, expected {expected}",
                frame.width,
                frame.height,
                frame.pixels.len()
            );
            return None;
        }
        let mut packet = Vec::with_capacity(RAW_HEADER_SIZE + expected);
        packet.extend_from_slice(&frame.width.to_le_bytes());
        packet.extend_from_slice(&frame.height.to_le_bytes());
        packet.extend_from_slice(&frame.pixels);
        Some(packet)
    }
}

impl VideoDecoder for RawVideoCodec {
    fn decode(&mut self, packet: &[u8]) -> Option<Frame> {
        if packet.len() < RAW_HEADER_SIZE {
            return None;
        }
        let (header, pixels) = packet.split_at(RAW_HEADER_SIZE);
        let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if pixels.len() != Frame::expected_len(width, height) {
            return None;
        }
        Some(Frame {
            width,
            height,
            pixels: pixels.to_vec(),
        })
    }
}
