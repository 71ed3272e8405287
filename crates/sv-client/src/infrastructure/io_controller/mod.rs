//! [`IoController`] implementations.
//!
//! Real screen capture and input injection are platform specific and live
//! outside this crate. Two portable controllers are always compiled:
//!
//! - [`TestPatternController`] streams a moving gradient and logs the input
//!   it would have injected. The `sv-client stream` command uses it.
//! - [`mock::MockIoController`] records every call for test assertions.

pub mod mock;

use std::sync::atomic::{AtomicU32, Ordering};

use sv_core::domain::mouse::{button_from_mask, is_clicked, is_move, is_scroll};
use sv_core::{KeyboardEventData, MouseEventData};
use tracing::info;

use crate::application::devices::{DeviceError, Frame, IoController};

/// Builds a BGRA gradient whose colours shift with `tick`, so consecutive
/// frames differ.
pub fn test_pattern(width: u32, height: u32, tick: u32) -> Frame {
    let mut pixels = Vec::with_capacity(Frame::expected_len(width, height));
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[
                (x.wrapping_add(tick) & 0xff) as u8,
                (y.wrapping_add(tick) & 0xff) as u8,
                (tick & 0xff) as u8,
                0xff,
            ]);
        }
    }
    Frame {
        width,
        height,
        pixels,
    }
}

/// Synthetic screen source for machines without a capture backend.
pub struct TestPatternController {
    width: u32,
    height: u32,
    tick: AtomicU32,
}

impl TestPatternController {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: AtomicU32::new(0),
        }
    }
}

impl IoController for TestPatternController {
    fn capture_screenshot(&self) -> Result<Frame, DeviceError> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        Ok(test_pattern(self.width, self.height, tick))
    }

    fn handle_mouse_event(&self, event: &MouseEventData) -> Result<(), DeviceError> {
        let mask = event.button_mask;
        if is_move(mask) {
            info!("mouse move to ({}, {})", event.x, event.y);
        } else if is_scroll(mask) {
            info!("mouse scroll {:?} at ({}, {})", button_from_mask(mask), event.x, event.y);
        } else {
            let action = if is_clicked(mask) { "press" } else { "release" };
            info!(
                "mouse {action} {:?} at ({}, {})",
                button_from_mask(mask),
                event.x,
                event.y
            );
        }
        Ok(())
    }

    fn handle_keyboard_event(&self, event: &KeyboardEventData) -> Result<(), DeviceError> {
        let action = if event.down { "down" } else { "up" };
        info!("key {action} 0x{:x}", event.key);
        Ok(())
    }
}
