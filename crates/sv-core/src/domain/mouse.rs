//! Bit flags carried in [`MouseEventData::button_mask`].
//!
//! Each button occupies the bit at position `button_id - 1`, where the id is
//! the X11 core-protocol button number. Two extra bits mark a press (as
//! opposed to a release) and a pure pointer move.
//!
//! ```text
//! bit   8      7       6     5        4         3          2      1     0
//!      BACK  FORWARD  MOVE  CLICKED  SCROLL_DN  SCROLL_UP  RIGHT  MID  LEFT
//! ```
//!
//! [`MouseEventData::button_mask`]: crate::protocol::MouseEventData::button_mask

use serde::{Deserialize, Serialize};

pub const LEFT_BUTTON_MASK: i32 = 1 << 0;
pub const MID_BUTTON_MASK: i32 = 1 << 1;
pub const RIGHT_BUTTON_MASK: i32 = 1 << 2;
pub const SCROLL_UP_MASK: i32 = 1 << 3;
pub const SCROLL_DOWN_MASK: i32 = 1 << 4;
pub const IS_CLICKED_MASK: i32 = 1 << 5;
pub const MOVE_MASK: i32 = 1 << 6;
pub const FORWARD_BUTTON_MASK: i32 = 1 << 7;
pub const BACK_BUTTON_MASK: i32 = 1 << 8;

/// A physical or virtual mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    ScrollUp,
    ScrollDown,
    Forward,
    Back,
}

impl MouseButton {
    /// The X11 core-protocol button number.
    pub fn id(self) -> u32 {
        match self {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
            MouseButton::ScrollUp => 4,
            MouseButton::ScrollDown => 5,
            MouseButton::Forward => 8,
            MouseButton::Back => 9,
        }
    }

    /// The flag this button sets in a button mask.
    pub fn mask(self) -> i32 {
        match self {
            MouseButton::Left => LEFT_BUTTON_MASK,
            MouseButton::Middle => MID_BUTTON_MASK,
            MouseButton::Right => RIGHT_BUTTON_MASK,
            MouseButton::ScrollUp => SCROLL_UP_MASK,
            MouseButton::ScrollDown => SCROLL_DOWN_MASK,
            MouseButton::Forward => FORWARD_BUTTON_MASK,
            MouseButton::Back => BACK_BUTTON_MASK,
        }
    }
}

/// Returns the button a mask refers to.
///
/// When several button bits are set the first one in the order
/// left, middle, right, scroll-up, scroll-down, forward, back wins.
pub fn button_from_mask(mask: i32) -> Option<MouseButton> {
    [
        MouseButton::Left,
        MouseButton::Middle,
        MouseButton::Right,
        MouseButton::ScrollUp,
        MouseButton::ScrollDown,
        MouseButton::Forward,
        MouseButton::Back,
    ]
    .into_iter()
    .find(|button| mask & button.mask() != 0)
}

/// `true` if the mask describes a press rather than a release.
pub fn is_clicked(mask: i32) -> bool {
    mask & IS_CLICKED_MASK != 0
}

/// `true` if the mask describes a scroll wheel step in either direction.
pub fn is_scroll(mask: i32) -> bool {
    mask & (SCROLL_UP_MASK | SCROLL_DOWN_MASK) != 0
}

/// `true` if the mask describes a pointer move.
pub fn is_move(mask: i32) -> bool {
    mask & MOVE_MASK != 0
}

/// Returns `mask` with the press flag set or cleared.
pub fn with_clicked(mask: i32, clicked: bool) -> i32 {
    if clicked {
        mask | IS_CLICKED_MASK
    } else {
        mask & !IS_CLICKED_MASK
    }
}
