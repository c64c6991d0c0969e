//! Normalized input events.
//!
//! Everything the parser produces is one of seven tagged variants with
//! fixed-size payloads; PASTE and USER additionally reference a range in the
//! queue's shared payload ring.

use bitflags::bitflags;

bitflags! {
    /// Key and mouse modifier set.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mods: u8 {
        /// Shift held.
        const SHIFT = 0b001;
        /// Alt/Option held.
        const ALT = 0b010;
        /// Control held.
        const CTRL = 0b100;
    }
}

impl std::fmt::Debug for Mods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// Key identity for KEY events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A character key (control-chorded or alt-chorded printables land
    /// here; plain printables become TEXT events instead).
    Char(char),
    /// Enter/Return.
    Enter,
    /// Tab.
    Tab,
    /// Shift+Tab.
    BackTab,
    /// Backspace.
    Backspace,
    /// Escape.
    Esc,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Home.
    Home,
    /// End.
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Insert.
    Insert,
    /// Delete.
    Delete,
    /// Function key (1-12).
    F(u8),
    /// Terminal gained focus (CSI I).
    FocusIn,
    /// Terminal lost focus (CSI O).
    FocusOut,
}

/// KEY event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key.
    pub code: KeyCode,
    /// Held modifiers.
    pub mods: Mods,
}

/// TEXT event payload: one decoded scalar plus its original bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEvent {
    /// Decoded scalar.
    pub ch: char,
    /// Original encoding (UTF-8, at most 4 bytes).
    pub bytes: [u8; 4],
    /// Number of meaningful bytes.
    pub len: u8,
}

impl TextEvent {
    /// Build from a scalar, re-encoding for the original-bytes field.
    pub fn from_char(ch: char) -> Self {
        let mut bytes = [0u8; 4];
        let len = ch.encode_utf8(&mut bytes).len() as u8;
        Self { ch, bytes, len }
    }

    /// The original byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Mouse action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    /// Button pressed.
    Down,
    /// Button released.
    Up,
    /// Motion with no button held.
    Move,
    /// Motion with a button held.
    Drag,
    /// Wheel up.
    ScrollUp,
    /// Wheel down.
    ScrollDown,
}

/// Mouse buttons as reported by SGR 1006.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    /// Left button.
    Left,
    /// Middle button.
    Middle,
    /// Right button.
    Right,
    /// No button (moves, scrolls).
    None,
}

/// MOUSE event payload, coordinates 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// Action.
    pub kind: MouseKind,
    /// Button involved.
    pub button: MouseButton,
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Held modifiers.
    pub mods: Mods,
}

/// The tagged event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Key press.
    Key(KeyEvent),
    /// Printable text.
    Text(TextEvent),
    /// Mouse action.
    Mouse(MouseEvent),
    /// Terminal resized.
    Resize {
        /// New column count.
        cols: i32,
        /// New row count.
        rows: i32,
    },
    /// Timer tick (posted by the poll loop on timeout).
    Tick,
    /// Bracketed paste; payload lives in the queue ring.
    Paste {
        /// Ring offset.
        off: u32,
        /// Payload length.
        len: u32,
    },
    /// Cross-thread user event; payload lives in the queue ring.
    User {
        /// Caller tag.
        tag: u32,
        /// Ring offset.
        off: u32,
        /// Payload length.
        len: u32,
    },
}

impl EventKind {
    /// Stable wire code for the packed batch format.
    pub const fn type_code(&self) -> u16 {
        match self {
            Self::Key(_) => 1,
            Self::Text(_) => 2,
            Self::Mouse(_) => 3,
            Self::Resize { .. } => 4,
            Self::Tick => 5,
            Self::Paste { .. } => 6,
            Self::User { .. } => 7,
        }
    }

    /// True for the variants carrying a payload-ring range.
    pub const fn has_payload(&self) -> bool {
        matches!(self, Self::Paste { .. } | Self::User { .. })
    }
}

/// A timestamped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Milliseconds timestamp supplied by the producer.
    pub time_ms: u64,
    /// Payload.
    pub kind: EventKind,
}

impl Event {
    /// Convenience constructor.
    pub const fn new(time_ms: u64, kind: EventKind) -> Self {
        Self { time_ms, kind }
    }
}

/// Encode a key code as a u32 for the packed batch: characters map to
/// their scalar value, specials to a range above Unicode.
pub const fn key_code_u32(code: KeyCode) -> u32 {
    const BASE: u32 = 0x0120_0000;
    match code {
        KeyCode::Char(c) => c as u32,
        KeyCode::Enter => BASE,
        KeyCode::Tab => BASE + 1,
        KeyCode::BackTab => BASE + 2,
        KeyCode::Backspace => BASE + 3,
        KeyCode::Esc => BASE + 4,
        KeyCode::Left => BASE + 5,
        KeyCode::Right => BASE + 6,
        KeyCode::Up => BASE + 7,
        KeyCode::Down => BASE + 8,
        KeyCode::Home => BASE + 9,
        KeyCode::End => BASE + 10,
        KeyCode::PageUp => BASE + 11,
        KeyCode::PageDown => BASE + 12,
        KeyCode::Insert => BASE + 13,
        KeyCode::Delete => BASE + 14,
        KeyCode::FocusIn => BASE + 15,
        KeyCode::FocusOut => BASE + 16,
        KeyCode::F(n) => BASE + 32 + n as u32,
    }
}
