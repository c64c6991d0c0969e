//! Packed event batch: the self-framed byte format handed to callers.
//!
//! Layout: a 12-byte header (`total_size`, `event_count`, `batch_flags`)
//! followed by records. Every record is `u16 kind; u16 flags; u32 size;
//! u64 time_ms` plus a fixed payload per type; PASTE and USER append their
//! payload bytes zero-padded to 4-byte alignment. The writer appends whole
//! records or none: the first record that does not fit sets the TRUNCATED
//! bit, leaves the event queued, and the batch ends there.

use super::event::{key_code_u32, Event, EventKind, MouseButton, MouseKind};
use super::queue::EventQueue;
use crate::drawlist::wire::align4;

/// Batch header length.
pub const BATCH_HEADER_SIZE: usize = 12;
/// Record header length (kind + flags + size + time).
pub const RECORD_HEADER_SIZE: usize = 16;
/// batch_flags bit: at least one event did not fit.
pub const BATCH_FLAG_TRUNCATED: u32 = 1;

/// Result of one pack call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Bytes written into the caller's buffer (header included).
    pub bytes: usize,
    /// Records written.
    pub events: u32,
    /// True when the TRUNCATED bit was set.
    pub truncated: bool,
}

fn payload_size(kind: &EventKind) -> usize {
    match kind {
        EventKind::Key(_) => 8,
        EventKind::Text(_) => 12,
        EventKind::Mouse(_) => 24,
        EventKind::Resize { .. } => 8,
        EventKind::Tick => 0,
        EventKind::Paste { len, .. } => 4 + align4(*len as usize),
        EventKind::User { len, .. } => 8 + align4(*len as usize),
    }
}

struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn u16(&mut self, v: u16) {
        self.out[self.pos..self.pos + 2].copy_from_slice(&v.to_le_bytes());
        self.pos += 2;
    }

    fn u32(&mut self, v: u32) {
        self.out[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn u64(&mut self, v: u64) {
        self.out[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
    }

    fn bytes_padded(&mut self, bytes: &[u8]) {
        self.out[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        let padded = align4(bytes.len());
        self.out[self.pos + bytes.len()..self.pos + padded].fill(0);
        self.pos += padded;
    }
}

/// Drain queued events into `out`, in FIFO order, as many whole records as
/// fit. Events that do not fit stay queued.
pub fn pack_events(queue: &EventQueue, out: &mut [u8]) -> BatchSummary {
    if out.len() < BATCH_HEADER_SIZE {
        return BatchSummary {
            bytes: 0,
            events: 0,
            truncated: true,
        };
    }
    let mut w = Writer {
        out,
        pos: BATCH_HEADER_SIZE,
    };
    let mut count = 0u32;
    let mut truncated = false;

    while let Some(ev) = queue.peek() {
        let record_size = RECORD_HEADER_SIZE + payload_size(&ev.kind);
        if w.pos + record_size > w.out.len() {
            truncated = true;
            break;
        }
        write_record(queue, &mut w, &ev, record_size);
        queue.pop();
        count += 1;
    }

    let total = w.pos;
    let mut flags = 0u32;
    if truncated {
        flags |= BATCH_FLAG_TRUNCATED;
    }
    w.pos = 0;
    w.u32(total as u32);
    w.u32(count);
    w.u32(flags);

    BatchSummary {
        bytes: total,
        events: count,
        truncated,
    }
}

fn write_record(queue: &EventQueue, w: &mut Writer<'_>, ev: &Event, record_size: usize) {
    w.u16(ev.kind.type_code());
    w.u16(0);
    w.u32(record_size as u32);
    w.u64(ev.time_ms);
    match &ev.kind {
        EventKind::Key(k) => {
            w.u32(key_code_u32(k.code));
            w.u32(u32::from(k.mods.bits()));
        }
        EventKind::Text(t) => {
            w.u32(t.ch as u32);
            w.u32(u32::from(t.len));
            w.bytes_padded(t.as_bytes());
        }
        EventKind::Mouse(m) => {
            w.u32(mouse_kind_u32(m.kind));
            w.u32(mouse_button_u32(m.button));
            w.u32(m.x as u32);
            w.u32(m.y as u32);
            w.u32(u32::from(m.mods.bits()));
            w.u32(0);
        }
        EventKind::Resize { cols, rows } => {
            w.u32(*cols as u32);
            w.u32(*rows as u32);
        }
        EventKind::Tick => {}
        EventKind::Paste { len, .. } => {
            w.u32(*len);
            let payload = queue.payload(ev).expect("paste payload");
            w.bytes_padded(&payload);
        }
        EventKind::User { tag, len, .. } => {
            w.u32(*tag);
            w.u32(*len);
            let payload = queue.payload(ev).expect("user payload");
            w.bytes_padded(&payload);
        }
    }
}

const fn mouse_kind_u32(kind: MouseKind) -> u32 {
    match kind {
        MouseKind::Down => 0,
        MouseKind::Up => 1,
        MouseKind::Move => 2,
        MouseKind::Drag => 3,
        MouseKind::ScrollUp => 4,
        MouseKind::ScrollDown => 5,
    }
}

const fn mouse_button_u32(button: MouseButton) -> u32 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
        MouseButton::None => 3,
    }
}
