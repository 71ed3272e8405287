//! Frame sinks for the viewer.
//!
//! Without a window toolkit the viewer reports what it receives. The
//! [`LoggingFrameSink`] logs every frame at `debug` and a running total at
//! `info` every `log_every` frames.

use tracing::{debug, info};

use crate::application::devices::{Frame, FrameSink};

pub struct LoggingFrameSink {
    log_every: u64,
    frames: u64,
    last_size: Option<(u32, u32)>,
}

impl LoggingFrameSink {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
            frames: 0,
            last_size: None,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.last_size
    }
}

impl FrameSink for LoggingFrameSink {
    fn present(&mut self, frame: Frame) {
        self.frames += 1;
        let size = (frame.width, frame.height);
        if self.last_size != Some(size) {
            info!("remote screen is {}x{}", frame.width, frame.height);
            self.last_size = Some(size);
        }
        debug!("frame {} ({} bytes)", self.frames, frame.pixels.len());
        if self.frames % self.log_every == 0 {
            info!("{} frame(s) received", self.frames);
        }
    }
}
