//! Recording [`IoController`] for tests.
//!
//! Every input event is pushed into a `Mutex<Vec<...>>` so assertions can
//! check exactly what the streaming loop dispatched and in what order.
//! Captures return the test pattern at a fixed size.
//!
//! Set `should_fail = true` to make every method return
//! [`DeviceError::Platform`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use sv_core::{KeyboardEventData, MouseEventData};

use super::test_pattern;
use crate::application::devices::{DeviceError, Frame, IoController};

pub struct MockIoController {
    pub width: u32,
    pub height: u32,
    pub mouse_events: Mutex<Vec<MouseEventData>>,
    pub keyboard_events: Mutex<Vec<KeyboardEventData>>,
    pub capture_count: AtomicU32,
    pub should_fail: bool,
}

impl MockIoController {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mouse_events: Mutex::new(Vec::new()),
            keyboard_events: Mutex::new(Vec::new()),
            capture_count: AtomicU32::new(0),
            should_fail: false,
        }
    }

    /// Number of successful captures so far.
    pub fn captures(&self) -> u32 {
        self.capture_count.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), DeviceError> {
        if self.should_fail {
            return Err(DeviceError::Platform("mock failure".into()));
        }
        Ok(())
    }
}

impl Default for MockIoController {
    fn default() -> Self {
        Self::with_size(4, 4)
    }
}

impl IoController for MockIoController {
    fn capture_screenshot(&self) -> Result<Frame, DeviceError> {
        self.check()?;
        let tick = self.capture_count.fetch_add(1, Ordering::Relaxed);
        Ok(test_pattern(self.width, self.height, tick))
    }

    fn handle_mouse_event(&self, event: &MouseEventData) -> Result<(), DeviceError> {
        self.check()?;
        if let Ok(mut events) = self.mouse_events.lock() {
            events.push(*event);
        }
        Ok(())
    }

    fn handle_keyboard_event(&self, event: &KeyboardEventData) -> Result<(), DeviceError> {
        self.check()?;
        if let Ok(mut events) = self.keyboard_events.lock() {
            events.push(*event);
        }
        Ok(())
    }
}
