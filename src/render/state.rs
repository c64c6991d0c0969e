//! Terminal-state cache and the desired cursor state.
//!
//! `TermState` mirrors what was last emitted to the terminal so the diff
//! renderer can skip redundant CUP/SGR output. Everything is invalidated on
//! resize or whenever a sequence with unmodeled side effects is emitted.

use crate::buffer::Style;
use crate::drawlist::wire::CursorShape;

/// Desired cursor after a present: position, visibility, shape.
///
/// An x or y of -1 leaves the position where the last emission put it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    /// Column, or -1 for "unchanged".
    pub x: i32,
    /// Row, or -1 for "unchanged".
    pub y: i32,
    /// Shape to request (capability-gated at emission).
    pub shape: CursorShape,
    /// Whether the cursor should be visible.
    pub visible: bool,
    /// Whether the cursor should blink.
    pub blink: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            x: -1,
            y: -1,
            shape: CursorShape::Block,
            visible: true,
            blink: true,
        }
    }
}

/// Cache of the terminal's last-known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermState {
    /// Cursor column last emitted.
    pub cursor_x: i32,
    /// Cursor row last emitted.
    pub cursor_y: i32,
    /// Whether the cursor position is known.
    pub cursor_valid: bool,
    /// Style last emitted.
    pub style: Style,
    /// Whether the style is known.
    pub style_valid: bool,
    /// Last emitted visibility, if any.
    pub visible: Option<bool>,
    /// Last emitted shape and blink, if any.
    pub shape: Option<(CursorShape, bool)>,
}

impl Default for TermState {
    fn default() -> Self {
        Self {
            cursor_x: 0,
            cursor_y: 0,
            cursor_valid: false,
            style: Style::DEFAULT,
            style_valid: false,
            visible: None,
            shape: None,
        }
    }
}

impl TermState {
    /// Fresh state with everything unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all knowledge; used after resize and unmodeled emissions.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}
