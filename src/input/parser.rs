//! Input parser: raw terminal bytes to normalized events.
//!
//! A byte-driven state machine covering ground, ESC, CSI (params +
//! intermediates), SS3, OSC, and the bracketed-paste capture. Incomplete
//! trailing sequences are held in a small fixed pending area so reads can
//! split sequences arbitrarily; an idle flush interprets whatever is held
//! as-is, which is how a bare ESC becomes the Escape key after one quiet
//! read cycle.

use super::event::{
    Event, EventKind, KeyCode, KeyEvent, Mods, MouseButton, MouseEvent, MouseKind, TextEvent,
};
use super::queue::EventQueue;
use crate::unicode::{decode_scalar, utf8_len};

/// Pending-area capacity; longer unfinished sequences are force-parsed.
const PENDING_CAP: usize = 64;
/// Paste payloads beyond this are discarded (overflow flag set).
const PASTE_MAX_BYTES: usize = 64 * 1024;
/// Idle polls before an unterminated paste capture is force-flushed.
const PASTE_IDLE_FLUSH_POLLS: u32 = 3;
/// Bracketed paste end marker.
const PASTE_END: &[u8] = b"\x1b[201~";

/// Byte-stream to event-stream parser.
#[derive(Debug)]
pub struct InputParser {
    pending: [u8; PENDING_CAP],
    pending_len: usize,
    bracketed_paste: bool,
    paste_active: bool,
    paste_buf: Vec<u8>,
    paste_overflow: bool,
    paste_idle_polls: u32,
}

enum Step {
    /// Bytes consumed, nothing to emit.
    Consumed(usize),
    /// Bytes consumed, one event out.
    Emit(usize, EventKind),
    /// Paste-begin marker consumed.
    PasteBegin(usize),
    /// The tail is an incomplete sequence.
    NeedMore,
}

enum PasteStep {
    Consumed(usize),
    End(usize),
    NeedMore,
}

impl InputParser {
    /// Create a parser; `bracketed_paste` mirrors the terminal capability.
    pub fn new(bracketed_paste: bool) -> Self {
        Self {
            pending: [0u8; PENDING_CAP],
            pending_len: 0,
            bracketed_paste,
            paste_active: false,
            paste_buf: Vec::new(),
            paste_overflow: false,
            paste_idle_polls: 0,
        }
    }

    /// True while a paste capture is open.
    pub const fn paste_active(&self) -> bool {
        self.paste_active
    }

    /// Bytes currently held as an incomplete sequence.
    pub fn pending(&self) -> &[u8] {
        &self.pending[..self.pending_len]
    }

    /// Parse everything, interpreting a trailing incomplete sequence
    /// as-is (no bytes are held back).
    pub fn parse_bytes(&mut self, bytes: &[u8], time_ms: u64, queue: &EventQueue) {
        self.run(bytes, time_ms, queue, false);
    }

    /// Parse only complete sequences; a trailing partial sequence stays in
    /// the pending area for the next read.
    pub fn parse_bytes_prefix(&mut self, bytes: &[u8], time_ms: u64, queue: &EventQueue) {
        self.run(bytes, time_ms, queue, true);
    }

    /// Idle-timeout hook: force-interpret held bytes and advance the
    /// paste-capture watchdog so an unterminated paste can never wedge the
    /// parser.
    pub fn idle_flush(&mut self, time_ms: u64, queue: &EventQueue) {
        if self.paste_active {
            self.paste_idle_polls += 1;
            if self.paste_idle_polls >= PASTE_IDLE_FLUSH_POLLS {
                self.finish_paste(time_ms, queue);
            }
        }
        if self.pending_len > 0 {
            let mut held = [0u8; PENDING_CAP];
            let len = self.pending_len;
            held[..len].copy_from_slice(&self.pending[..len]);
            self.pending_len = 0;
            self.run(&held[..len], time_ms, queue, false);
        }
    }

    fn run(&mut self, bytes: &[u8], time_ms: u64, queue: &EventQueue, keep_partial: bool) {
        let combined;
        let data: &[u8] = if self.pending_len == 0 {
            bytes
        } else {
            let mut v = Vec::with_capacity(self.pending_len + bytes.len());
            v.extend_from_slice(&self.pending[..self.pending_len]);
            v.extend_from_slice(bytes);
            self.pending_len = 0;
            combined = v;
            &combined
        };

        let mut i = 0;
        while i < data.len() {
            if self.paste_active {
                self.paste_idle_polls = 0;
                match self.paste_step(&data[i..]) {
                    PasteStep::Consumed(n) => i += n,
                    PasteStep::End(n) => {
                        i += n;
                        self.finish_paste(time_ms, queue);
                    }
                    PasteStep::NeedMore => {
                        if keep_partial && self.stash(&data[i..]) {
                            return;
                        }
                        // Forced: the marker prefix becomes paste content.
                        let rest: Vec<u8> = data[i..].to_vec();
                        self.paste_append(&rest);
                        i = data.len();
                    }
                }
                continue;
            }

            match self.step(&data[i..]) {
                Step::Consumed(n) => i += n,
                Step::Emit(n, kind) => {
                    queue.push(Event::new(time_ms, kind));
                    i += n;
                }
                Step::PasteBegin(n) => {
                    i += n;
                    if self.bracketed_paste {
                        self.paste_active = true;
                        self.paste_buf.clear();
                        self.paste_overflow = false;
                        self.paste_idle_polls = 0;
                    }
                }
                Step::NeedMore => {
                    if keep_partial && self.stash(&data[i..]) {
                        return;
                    }
                    // Interpret the lead byte as-is and keep going.
                    let (n, kind) = force_one(&data[i..]);
                    if let Some(kind) = kind {
                        queue.push(Event::new(time_ms, kind));
                    }
                    i += n;
                }
            }
        }
    }

    /// Hold trailing bytes for the next read. False when they cannot fit,
    /// in which case the caller force-parses instead of wedging.
    fn stash(&mut self, tail: &[u8]) -> bool {
        if tail.len() > PENDING_CAP {
            return false;
        }
        self.pending[..tail.len()].copy_from_slice(tail);
        self.pending_len = tail.len();
        true
    }

    fn step(&self, d: &[u8]) -> Step {
        match d[0] {
            0x1b => self.step_escape(d),
            b if b < 0x20 || b == 0x7f => Step::Emit(1, control_key(b, Mods::empty())),
            _ => match decode_scalar(d) {
                Some((ch, n)) => Step::Emit(n, EventKind::Text(TextEvent::from_char(ch))),
                None => {
                    if utf8_len(d[0]).is_some_and(|need| d.len() < need) {
                        Step::NeedMore
                    } else {
                        Step::Emit(1, EventKind::Text(TextEvent::from_char('\u{FFFD}')))
                    }
                }
            },
        }
    }

    fn step_escape(&self, d: &[u8]) -> Step {
        if d.len() < 2 {
            return Step::NeedMore;
        }
        match d[1] {
            b'[' => self.step_csi(d),
            b'O' => {
                if d.len() < 3 {
                    return Step::NeedMore;
                }
                match ss3_key(d[2]) {
                    Some(code) => Step::Emit(
                        3,
                        EventKind::Key(KeyEvent {
                            code,
                            mods: Mods::empty(),
                        }),
                    ),
                    None => Step::Consumed(3),
                }
            }
            b']' => step_osc(d),
            0x1b => Step::Emit(
                1,
                EventKind::Key(KeyEvent {
                    code: KeyCode::Esc,
                    mods: Mods::empty(),
                }),
            ),
            b if b < 0x20 || b == 0x7f => Step::Emit(2, control_key(b, Mods::ALT)),
            _ => match decode_scalar(&d[1..]) {
                Some((ch, n)) => Step::Emit(
                    1 + n,
                    EventKind::Key(KeyEvent {
                        code: KeyCode::Char(ch),
                        mods: Mods::ALT,
                    }),
                ),
                None => {
                    if utf8_len(d[1]).is_some_and(|need| d.len() - 1 < need) {
                        Step::NeedMore
                    } else {
                        Step::Consumed(2)
                    }
                }
            },
        }
    }

    fn step_csi(&self, d: &[u8]) -> Step {
        // d starts with ESC [. Params 0x30-0x3F, intermediates 0x20-0x2F,
        // final 0x40-0x7E.
        let mut i = 2;
        while i < d.len() && (0x30..=0x3f).contains(&d[i]) {
            i += 1;
        }
        while i < d.len() && (0x20..=0x2f).contains(&d[i]) {
            i += 1;
        }
        if i >= d.len() {
            return Step::NeedMore;
        }
        let final_byte = d[i];
        if !(0x40..=0x7e).contains(&final_byte) {
            // Malformed: drop the introducer and resynchronize.
            return Step::Consumed(2);
        }
        let params = &d[2..i];
        let consumed = i + 1;
        match dispatch_csi(params, final_byte) {
            CsiAction::Event(kind) => Step::Emit(consumed, kind),
            CsiAction::PasteBegin => Step::PasteBegin(consumed),
            CsiAction::Ignore => Step::Consumed(consumed),
        }
    }

    fn paste_step(&mut self, d: &[u8]) -> PasteStep {
        match d.iter().position(|&b| b == 0x1b) {
            None => {
                self.paste_append(d);
                PasteStep::Consumed(d.len())
            }
            Some(0) => {
                if d.len() < PASTE_END.len() {
                    if PASTE_END.starts_with(d) {
                        PasteStep::NeedMore
                    } else {
                        let b = [d[0]];
                        self.paste_append(&b);
                        PasteStep::Consumed(1)
                    }
                } else if &d[..PASTE_END.len()] == PASTE_END {
                    PasteStep::End(PASTE_END.len())
                } else {
                    let b = [d[0]];
                    self.paste_append(&b);
                    PasteStep::Consumed(1)
                }
            }
            Some(j) => {
                let section: Vec<u8> = d[..j].to_vec();
                self.paste_append(&section);
                PasteStep::Consumed(j)
            }
        }
    }

    fn paste_append(&mut self, bytes: &[u8]) {
        if self.paste_overflow {
            return;
        }
        if self.paste_buf.len() + bytes.len() > PASTE_MAX_BYTES {
            self.paste_overflow = true;
            self.paste_buf.clear();
            return;
        }
        self.paste_buf.extend_from_slice(bytes);
    }

    /// Close the capture and post a single PASTE event, best-effort: an
    /// overflowed payload is discarded, and a full queue drops the paste.
    fn finish_paste(&mut self, time_ms: u64, queue: &EventQueue) {
        self.paste_active = false;
        self.paste_idle_polls = 0;
        if !self.paste_overflow && !self.paste_buf.is_empty() {
            let _ = queue.post_paste(&self.paste_buf, time_ms);
        }
        self.paste_buf.clear();
        self.paste_overflow = false;
    }
}

/// Minimal as-is interpretation of one lead byte (idle flush and pending
/// overflow).
fn force_one(d: &[u8]) -> (usize, Option<EventKind>) {
    match d[0] {
        0x1b => (
            1,
            Some(EventKind::Key(KeyEvent {
                code: KeyCode::Esc,
                mods: Mods::empty(),
            })),
        ),
        b if b < 0x20 || b == 0x7f => (1, Some(control_key(b, Mods::empty()))),
        _ => match decode_scalar(d) {
            Some((ch, n)) => (n, Some(EventKind::Text(TextEvent::from_char(ch)))),
            None => (1, Some(EventKind::Text(TextEvent::from_char('\u{FFFD}')))),
        },
    }
}

fn control_key(b: u8, extra: Mods) -> EventKind {
    let (code, mods) = match b {
        0x0d | 0x0a => (KeyCode::Enter, Mods::empty()),
        0x09 => (KeyCode::Tab, Mods::empty()),
        0x7f => (KeyCode::Backspace, Mods::empty()),
        0x08 => (KeyCode::Backspace, Mods::CTRL),
        0x00 => (KeyCode::Char(' '), Mods::CTRL),
        0x01..=0x1a => (KeyCode::Char((b'a' + b - 1) as char), Mods::CTRL),
        0x1c => (KeyCode::Char('\\'), Mods::CTRL),
        0x1d => (KeyCode::Char(']'), Mods::CTRL),
        0x1e => (KeyCode::Char('^'), Mods::CTRL),
        0x1f => (KeyCode::Char('_'), Mods::CTRL),
        _ => (KeyCode::Char(b as char), Mods::CTRL),
    };
    EventKind::Key(KeyEvent {
        code,
        mods: mods | extra,
    })
}

const fn ss3_key(b: u8) -> Option<KeyCode> {
    Some(match b {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        _ => return None,
    })
}

fn step_osc(d: &[u8]) -> Step {
    // ESC ] ... terminated by BEL or ST (ESC \). Content is discarded.
    let mut i = 2;
    while i < d.len() {
        match d[i] {
            0x07 => return Step::Consumed(i + 1),
            0x1b => {
                if i + 1 >= d.len() {
                    return Step::NeedMore;
                }
                if d[i + 1] == b'\\' {
                    return Step::Consumed(i + 2);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Step::NeedMore
}

enum CsiAction {
    Event(EventKind),
    PasteBegin,
    Ignore,
}

fn parse_params(params: &[u8]) -> (bool, Vec<u32>) {
    let (private, body) = match params.first() {
        Some(b'<') => (true, &params[1..]),
        Some(b'?') => (true, &params[1..]),
        _ => (false, params),
    };
    let values = body
        .split(|&b| b == b';')
        .map(|part| {
            part.iter()
                .take_while(|b| b.is_ascii_digit())
                .fold(0u32, |acc, &b| {
                    acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
                })
        })
        .collect();
    (private, values)
}

fn mods_from_param(p: u32) -> Mods {
    if p < 2 {
        return Mods::empty();
    }
    let bits = p - 1;
    let mut mods = Mods::empty();
    if bits & 1 != 0 {
        mods |= Mods::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Mods::ALT;
    }
    if bits & 4 != 0 {
        mods |= Mods::CTRL;
    }
    mods
}

fn key_event(code: KeyCode, mods: Mods) -> CsiAction {
    CsiAction::Event(EventKind::Key(KeyEvent { code, mods }))
}

fn dispatch_csi(params: &[u8], final_byte: u8) -> CsiAction {
    let sgr_mouse = params.first() == Some(&b'<');
    let (_, values) = parse_params(params);
    let p1 = values.first().copied().unwrap_or(0);
    let p2 = values.get(1).copied().unwrap_or(0);

    if sgr_mouse && (final_byte == b'M' || final_byte == b'm') {
        return mouse_event(&values, final_byte == b'M');
    }

    match final_byte {
        b'A' => key_event(KeyCode::Up, mods_from_param(p2)),
        b'B' => key_event(KeyCode::Down, mods_from_param(p2)),
        b'C' => key_event(KeyCode::Right, mods_from_param(p2)),
        b'D' => key_event(KeyCode::Left, mods_from_param(p2)),
        b'H' => key_event(KeyCode::Home, mods_from_param(p2)),
        b'F' => key_event(KeyCode::End, mods_from_param(p2)),
        b'Z' => key_event(KeyCode::BackTab, Mods::SHIFT),
        b'I' => key_event(KeyCode::FocusIn, Mods::empty()),
        b'O' => key_event(KeyCode::FocusOut, Mods::empty()),
        b'u' => match char::from_u32(p1) {
            Some(ch) => key_event(KeyCode::Char(ch), mods_from_param(p2)),
            None => CsiAction::Ignore,
        },
        b'~' => {
            let mods = mods_from_param(p2);
            let code = match p1 {
                1 | 7 => KeyCode::Home,
                2 => KeyCode::Insert,
                3 => KeyCode::Delete,
                4 | 8 => KeyCode::End,
                5 => KeyCode::PageUp,
                6 => KeyCode::PageDown,
                11..=15 => KeyCode::F((p1 - 10) as u8),
                17..=21 => KeyCode::F((p1 - 11) as u8),
                23 | 24 => KeyCode::F((p1 - 12) as u8),
                200 => return CsiAction::PasteBegin,
                201 => return CsiAction::Ignore, // stray end marker
                _ => return CsiAction::Ignore,
            };
            key_event(code, mods)
        }
        _ => CsiAction::Ignore,
    }
}

fn mouse_event(values: &[u32], press: bool) -> CsiAction {
    let b = values.first().copied().unwrap_or(0);
    let x = values.get(1).copied().unwrap_or(1).max(1) as i32 - 1;
    let y = values.get(2).copied().unwrap_or(1).max(1) as i32 - 1;

    let mut mods = Mods::empty();
    if b & 4 != 0 {
        mods |= Mods::SHIFT;
    }
    if b & 8 != 0 {
        mods |= Mods::ALT;
    }
    if b & 16 != 0 {
        mods |= Mods::CTRL;
    }

    let button = match b & 3 {
        0 => MouseButton::Left,
        1 => MouseButton::Middle,
        2 => MouseButton::Right,
        _ => MouseButton::None,
    };

    let kind = if b & 64 != 0 {
        if b & 1 == 0 {
            MouseKind::ScrollUp
        } else {
            MouseKind::ScrollDown
        }
    } else if b & 32 != 0 {
        if button == MouseButton::None {
            MouseKind::Move
        } else {
            MouseKind::Drag
        }
    } else if press {
        MouseKind::Down
    } else {
        MouseKind::Up
    };

    let button = if matches!(kind, MouseKind::ScrollUp | MouseKind::ScrollDown) {
        MouseButton::None
    } else {
        button
    };

    CsiAction::Event(EventKind::Mouse(MouseEvent {
        kind,
        button,
        x,
        y,
        mods,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> (InputParser, EventQueue) {
        (InputParser::new(true), EventQueue::new(64, 1 << 16).unwrap())
    }

    fn drain(q: &EventQueue) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Some(ev) = q.pop() {
            out.push(ev.kind);
        }
        out
    }

    #[test]
    fn test_plain_text() {
        let (mut p, q) = rig();
        p.parse_bytes(b"hi", 0, &q);
        let events = drain(&q);
        assert_eq!(events.len(), 2);
        match events[0] {
            EventKind::Text(t) => assert_eq!(t.ch, 'h'),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_utf8_scalar_with_bytes() {
        let (mut p, q) = rig();
        p.parse_bytes("é".as_bytes(), 0, &q);
        match drain(&q)[0] {
            EventKind::Text(t) => {
                assert_eq!(t.ch, 'é');
                assert_eq!(t.as_bytes(), "é".as_bytes());
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_utf8_split_across_reads() {
        let (mut p, q) = rig();
        let bytes = "漢".as_bytes();
        p.parse_bytes_prefix(&bytes[..1], 0, &q);
        assert!(q.is_empty());
        assert_eq!(p.pending(), &bytes[..1]);
        p.parse_bytes_prefix(&bytes[1..], 0, &q);
        match drain(&q)[0] {
            EventKind::Text(t) => assert_eq!(t.ch, '漢'),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ctrl_letters() {
        let (mut p, q) = rig();
        p.parse_bytes(&[0x03, 0x0d, 0x09, 0x7f], 0, &q);
        let events = drain(&q);
        assert_eq!(
            events[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::Char('c'),
                mods: Mods::CTRL
            })
        );
        assert_eq!(
            events[1],
            EventKind::Key(KeyEvent {
                code: KeyCode::Enter,
                mods: Mods::empty()
            })
        );
        assert_eq!(
            events[2],
            EventKind::Key(KeyEvent {
                code: KeyCode::Tab,
                mods: Mods::empty()
            })
        );
        assert_eq!(
            events[3],
            EventKind::Key(KeyEvent {
                code: KeyCode::Backspace,
                mods: Mods::empty()
            })
        );
    }

    #[test]
    fn test_arrow_keys() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[A\x1b[B\x1b[C\x1b[D", 0, &q);
        let events = drain(&q);
        let codes: Vec<_> = events
            .iter()
            .map(|e| match e {
                EventKind::Key(k) => k.code,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            codes,
            vec![KeyCode::Up, KeyCode::Down, KeyCode::Right, KeyCode::Left]
        );
    }

    #[test]
    fn test_modified_arrow() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[1;5C", 0, &q);
        assert_eq!(
            drain(&q)[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::Right,
                mods: Mods::CTRL
            })
        );
    }

    #[test]
    fn test_function_keys() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1bOP\x1b[15~\x1b[24~", 0, &q);
        let events = drain(&q);
        assert_eq!(
            events[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::F(1),
                mods: Mods::empty()
            })
        );
        assert_eq!(
            events[1],
            EventKind::Key(KeyEvent {
                code: KeyCode::F(5),
                mods: Mods::empty()
            })
        );
        assert_eq!(
            events[2],
            EventKind::Key(KeyEvent {
                code: KeyCode::F(12),
                mods: Mods::empty()
            })
        );
    }

    #[test]
    fn test_alt_chord() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1bx", 0, &q);
        assert_eq!(
            drain(&q)[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::Char('x'),
                mods: Mods::ALT
            })
        );
    }

    #[test]
    fn test_sgr_mouse_press_release() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[<0;10;5M\x1b[<0;10;5m", 0, &q);
        let events = drain(&q);
        match events[0] {
            EventKind::Mouse(m) => {
                assert_eq!(m.kind, MouseKind::Down);
                assert_eq!(m.button, MouseButton::Left);
                assert_eq!((m.x, m.y), (9, 4));
            }
            ref other => panic!("unexpected {other:?}"),
        }
        match events[1] {
            EventKind::Mouse(m) => assert_eq!(m.kind, MouseKind::Up),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sgr_mouse_motion_coalesces() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[<35;2;2M\x1b[<35;3;3M\x1b[<35;4;4M", 0, &q);
        let events = drain(&q);
        assert_eq!(events.len(), 1);
        match events[0] {
            EventKind::Mouse(m) => {
                assert_eq!(m.kind, MouseKind::Move);
                assert_eq!((m.x, m.y), (3, 3));
            }
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(q.dropped(), 2);
    }

    #[test]
    fn test_mouse_scroll_and_ctrl() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[<64;1;1M\x1b[<81;1;1M", 0, &q);
        let events = drain(&q);
        match events[0] {
            EventKind::Mouse(m) => assert_eq!(m.kind, MouseKind::ScrollUp),
            ref other => panic!("unexpected {other:?}"),
        }
        match events[1] {
            EventKind::Mouse(m) => {
                assert_eq!(m.kind, MouseKind::ScrollDown);
                assert!(m.mods.contains(Mods::CTRL));
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_focus_events() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[I\x1b[O", 0, &q);
        let events = drain(&q);
        assert_eq!(
            events[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::FocusIn,
                mods: Mods::empty()
            })
        );
        assert_eq!(
            events[1],
            EventKind::Key(KeyEvent {
                code: KeyCode::FocusOut,
                mods: Mods::empty()
            })
        );
    }

    #[test]
    fn test_bracketed_paste_single_event() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[200~hello world\x1b[201~x", 0, &q);
        let events = drain_with_payload(&q);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], (6, Some(b"hello world".to_vec())));
        // Trailing 'x' parsed normally after the capture closed.
        assert_eq!(events[1].0, 2);
    }

    fn drain_with_payload(q: &EventQueue) -> Vec<(u16, Option<Vec<u8>>)> {
        let mut out = Vec::new();
        while let Some(ev) = q.peek() {
            let payload = q.payload(&ev).map(|v| v.to_vec());
            q.pop();
            out.push((ev.kind.type_code(), payload));
        }
        out
    }

    #[test]
    fn test_paste_split_across_reads() {
        let (mut p, q) = rig();
        p.parse_bytes_prefix(b"\x1b[200~par", 0, &q);
        assert!(p.paste_active());
        p.parse_bytes_prefix(b"tial\x1b[2", 0, &q);
        assert!(q.is_empty());
        p.parse_bytes_prefix(b"01~", 0, &q);
        assert!(!p.paste_active());
        let events = drain_with_payload(&q);
        assert_eq!(events[0], (6, Some(b"partial".to_vec())));
    }

    #[test]
    fn test_paste_with_embedded_escape() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b[200~a\x1b[Bb\x1b[201~", 0, &q);
        let events = drain_with_payload(&q);
        // The arrow sequence is paste content, not a key.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], (6, Some(b"a\x1b[Bb".to_vec())));
    }

    #[test]
    fn test_paste_disabled_flows_through() {
        let mut p = InputParser::new(false);
        let q = EventQueue::new(64, 1 << 16).unwrap();
        p.parse_bytes(b"\x1b[200~hi\x1b[201~", 0, &q);
        let events = drain(&q);
        // Markers ignored; content parsed as normal text.
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EventKind::Text(t) if t.ch == 'h'));
        assert!(matches!(events[1], EventKind::Text(t) if t.ch == 'i'));
    }

    #[test]
    fn test_paste_idle_timeout_never_wedges() {
        let (mut p, q) = rig();
        p.parse_bytes_prefix(b"\x1b[200~stuck", 0, &q);
        assert!(p.paste_active());
        for _ in 0..PASTE_IDLE_FLUSH_POLLS {
            p.idle_flush(0, &q);
        }
        assert!(!p.paste_active());
        let events = drain_with_payload(&q);
        assert_eq!(events[0], (6, Some(b"stuck".to_vec())));
    }

    #[test]
    fn test_paste_overflow_discards() {
        let (mut p, q) = rig();
        p.parse_bytes_prefix(b"\x1b[200~", 0, &q);
        let chunk = vec![b'a'; PASTE_MAX_BYTES + 1];
        p.parse_bytes_prefix(&chunk, 0, &q);
        p.parse_bytes_prefix(b"\x1b[201~", 0, &q);
        assert!(!p.paste_active());
        // Payload discarded: no paste event.
        assert!(q.is_empty());
    }

    #[test]
    fn test_lone_esc_held_then_flushed() {
        let (mut p, q) = rig();
        p.parse_bytes_prefix(b"\x1b", 0, &q);
        assert!(q.is_empty());
        assert_eq!(p.pending(), b"\x1b");
        p.idle_flush(0, &q);
        assert_eq!(
            drain(&q)[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::Esc,
                mods: Mods::empty()
            })
        );
        assert!(p.pending().is_empty());
    }

    #[test]
    fn test_esc_prefix_completed_next_read() {
        let (mut p, q) = rig();
        p.parse_bytes_prefix(b"\x1b[1;", 0, &q);
        assert!(q.is_empty());
        p.parse_bytes_prefix(b"5C", 0, &q);
        assert_eq!(
            drain(&q)[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::Right,
                mods: Mods::CTRL
            })
        );
    }

    #[test]
    fn test_idle_flush_interprets_partial_csi_as_is() {
        let (mut p, q) = rig();
        p.parse_bytes_prefix(b"\x1b[1", 0, &q);
        p.idle_flush(0, &q);
        let events = drain(&q);
        assert_eq!(
            events[0],
            EventKind::Key(KeyEvent {
                code: KeyCode::Esc,
                mods: Mods::empty()
            })
        );
        assert!(matches!(events[1], EventKind::Text(t) if t.ch == '['));
        assert!(matches!(events[2], EventKind::Text(t) if t.ch == '1'));
    }

    #[test]
    fn test_osc_discarded() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b]0;title\x07after", 0, &q);
        let events = drain(&q);
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], EventKind::Text(t) if t.ch == 'a'));
    }

    #[test]
    fn test_osc_st_terminator() {
        let (mut p, q) = rig();
        p.parse_bytes(b"\x1b]0;t\x1b\\z", 0, &q);
        let events = drain(&q);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EventKind::Text(t) if t.ch == 'z'));
    }
}
