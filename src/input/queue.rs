//! Bounded event queue with a variable-length payload ring.
//!
//! The queue is the only structure shared across threads: every field sits
//! behind one spinlock. The engine thread pushes parsed events and pops
//! batches; external threads may only call [`EventQueue::post_user`], which
//! is gated by teardown flags so backing memory is never freed under a
//! racing post.
//!
//! Coalescing keeps the queue small under floods: a RESIZE replaces the
//! latest queued RESIZE in place, and a mouse MOVE/DRAG replaces the latest
//! queued MOVE/DRAG. Everything else appends, dropping the head (and
//! counting the drop) when full.

use super::event::{Event, EventKind, MouseKind};
use crate::error::{Error, Result};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Contiguous byte ring for PASTE/USER payloads.
///
/// Allocations are contiguous: when the tail space is too small the
/// allocation wraps to offset 0 and `pad_end` records the dead bytes at the
/// end until frees reclaim them. Frees run in allocation (FIFO) order.
#[derive(Debug)]
struct PayloadRing {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    used: usize,
    pad_end: usize,
}

impl PayloadRing {
    fn new(cap: usize) -> Self {
        Self {
            buf: vec![0u8; cap].into_boxed_slice(),
            head: 0,
            tail: 0,
            used: 0,
            pad_end: 0,
        }
    }

    const fn cap(&self) -> usize {
        self.buf.len()
    }

    /// Would `len` contiguous bytes fit right now?
    fn can_alloc(&self, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        if self.used == 0 {
            return self.cap() >= len;
        }
        if self.tail > self.head {
            // Unwrapped: end space, or wrap to the front.
            self.cap() - self.tail >= len || self.head >= len
        } else if self.tail < self.head {
            // Wrapped: only the gap between tail and head.
            self.head - self.tail >= len
        } else {
            // tail == head with data: completely full.
            false
        }
    }

    /// Allocate `len` contiguous bytes, returning their offset.
    fn alloc(&mut self, len: usize) -> Option<usize> {
        if !self.can_alloc(len) {
            return None;
        }
        if len == 0 {
            return Some(self.tail);
        }
        // An empty ring always sits at head == tail == 0.
        let unwrapped = self.used == 0 || self.tail > self.head;
        if unwrapped && self.cap() - self.tail < len {
            // Wrap: record the dead tail space.
            self.pad_end = self.cap() - self.tail;
            self.tail = len;
            self.used += len;
            return Some(0);
        }
        let off = self.tail;
        self.tail += len;
        self.used += len;
        Some(off)
    }

    fn write(&mut self, off: usize, bytes: &[u8]) {
        self.buf[off..off + bytes.len()].copy_from_slice(bytes);
    }

    /// Free the oldest allocation (frees mirror allocation order).
    fn free(&mut self, len: usize) {
        debug_assert!(self.used >= len);
        self.used -= len;
        self.head += len;
        if self.head == self.cap() - self.pad_end {
            self.head = 0;
            self.pad_end = 0;
        }
        if self.used == 0 {
            self.head = 0;
            self.tail = 0;
            self.pad_end = 0;
        }
    }
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Option<Event>>,
    head: usize,
    count: usize,
    ring: PayloadRing,
    dropped: u64,
}

impl Inner {
    fn slot_index(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }

    fn drop_head(&mut self) {
        if self.count == 0 {
            return;
        }
        let idx = self.head;
        if let Some(ev) = self.slots[idx].take() {
            self.free_payload(&ev);
        }
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        self.dropped += 1;
    }

    fn free_payload(&mut self, ev: &Event) {
        match ev.kind {
            EventKind::Paste { len, .. } | EventKind::User { len, .. } => {
                self.ring.free(len as usize);
            }
            _ => {}
        }
    }

    fn append(&mut self, ev: Event) {
        debug_assert!(self.count < self.slots.len());
        let idx = self.slot_index(self.count);
        self.slots[idx] = Some(ev);
        self.count += 1;
    }

    /// Find the newest queued event matching `pred`, scanning tail-first.
    fn latest_matching(&self, pred: impl Fn(&EventKind) -> bool) -> Option<usize> {
        (0..self.count)
            .rev()
            .map(|logical| self.slot_index(logical))
            .find(|&idx| self.slots[idx].as_ref().is_some_and(|e| pred(&e.kind)))
    }
}

fn is_mouse_motion(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Mouse(m) if matches!(m.kind, MouseKind::Move | MouseKind::Drag)
    )
}

/// Multi-producer (user posts) / single-consumer event queue.
#[derive(Debug)]
pub struct EventQueue {
    inner: spin::Mutex<Inner>,
    destroy_started: AtomicBool,
    post_inflight: AtomicU32,
}

impl EventQueue {
    /// Create with fixed event and payload-ring capacities.
    pub fn new(event_cap: usize, ring_cap: usize) -> Result<Self> {
        if event_cap == 0 || ring_cap == 0 {
            return Err(Error::InvalidArgument("queue capacities must be positive"));
        }
        Ok(Self {
            inner: spin::Mutex::new(Inner {
                slots: vec![None; event_cap],
                head: 0,
                count: 0,
                ring: PayloadRing::new(ring_cap),
                dropped: 0,
            }),
            destroy_started: AtomicBool::new(false),
            post_inflight: AtomicU32::new(0),
        })
    }

    /// Push with coalescing; drops (and counts) the head when full.
    pub fn push(&self, ev: Event) {
        let mut inner = self.inner.lock();
        if self.coalesce(&mut inner, &ev) {
            return;
        }
        if inner.count == inner.slots.len() {
            inner.drop_head();
        }
        inner.append(ev);
    }

    /// Push without the drop policy: LIMIT when full.
    pub fn try_push_no_drop(&self, ev: Event) -> Result<()> {
        let mut inner = self.inner.lock();
        if self.coalesce(&mut inner, &ev) {
            return Ok(());
        }
        if inner.count == inner.slots.len() {
            return Err(Error::Limit("event queue full"));
        }
        inner.append(ev);
        Ok(())
    }

    fn coalesce(&self, inner: &mut Inner, ev: &Event) -> bool {
        let target = match ev.kind {
            EventKind::Resize { .. } => {
                inner.latest_matching(|k| matches!(k, EventKind::Resize { .. }))
            }
            ref kind if is_mouse_motion(kind) => inner.latest_matching(is_mouse_motion),
            _ => None,
        };
        if let Some(idx) = target {
            inner.slots[idx] = Some(*ev);
            inner.dropped += 1;
            return true;
        }
        false
    }

    /// Copy payload bytes into the ring and enqueue a USER event.
    ///
    /// The only cross-thread entry. Never drops queued events; fails with
    /// LIMIT when either the queue or the ring is full, and with
    /// INVALID_ARGUMENT once teardown has begun.
    pub fn post_user(&self, tag: u32, bytes: &[u8], time_ms: u64) -> Result<()> {
        if self.destroy_started.load(Ordering::Acquire) {
            return Err(Error::InvalidArgument("queue is shutting down"));
        }
        self.post_inflight.fetch_add(1, Ordering::AcqRel);
        // Re-check after announcing: teardown waits for inflight to drain.
        if self.destroy_started.load(Ordering::Acquire) {
            self.post_inflight.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::InvalidArgument("queue is shutting down"));
        }
        let result = (|| {
            let mut inner = self.inner.lock();
            if inner.count == inner.slots.len() {
                return Err(Error::Limit("event queue full"));
            }
            let Some(off) = inner.ring.alloc(bytes.len()) else {
                return Err(Error::Limit("payload ring full"));
            };
            inner.ring.write(off, bytes);
            inner.append(Event::new(
                time_ms,
                EventKind::User {
                    tag,
                    off: off as u32,
                    len: bytes.len() as u32,
                },
            ));
            Ok(())
        })();
        self.post_inflight.fetch_sub(1, Ordering::AcqRel);
        result
    }

    /// Copy a paste payload and enqueue a PASTE event; drops the head when
    /// the queue is full, fails with LIMIT when the ring cannot take the
    /// payload.
    pub fn post_paste(&self, bytes: &[u8], time_ms: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.count == inner.slots.len() {
            inner.drop_head();
        }
        if !inner.ring.can_alloc(bytes.len()) {
            return Err(Error::Limit("payload ring full"));
        }
        let off = inner.ring.alloc(bytes.len()).expect("preflighted alloc");
        inner.ring.write(off, bytes);
        inner.append(Event::new(
            time_ms,
            EventKind::Paste {
                off: off as u32,
                len: bytes.len() as u32,
            },
        ));
        Ok(())
    }

    /// Copy of the head event without consuming it.
    pub fn peek(&self) -> Option<Event> {
        let inner = self.inner.lock();
        if inner.count == 0 {
            None
        } else {
            inner.slots[inner.head]
        }
    }

    /// Consume the head event, releasing its payload bytes.
    pub fn pop(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        if inner.count == 0 {
            return None;
        }
        let idx = inner.head;
        let ev = inner.slots[idx].take()?;
        inner.head = (inner.head + 1) % inner.slots.len();
        inner.count -= 1;
        inner.free_payload(&ev);
        Some(ev)
    }

    /// Queued event count.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events lost to coalescing or head drops.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Borrow the payload of a PASTE or USER event still in the queue.
    ///
    /// The view holds the queue lock; it stays valid until dropped and the
    /// bytes it covers stay allocated until the event is popped.
    pub fn payload(&self, ev: &Event) -> Option<PayloadView<'_>> {
        let (off, len) = match ev.kind {
            EventKind::Paste { off, len } => (off, len),
            EventKind::User { off, len, .. } => (off, len),
            _ => return None,
        };
        Some(PayloadView {
            guard: self.inner.lock(),
            off: off as usize,
            len: len as usize,
        })
    }

    /// Begin teardown: refuse new posts and spin until in-flight posts
    /// drain. After this returns the backing memory may be freed.
    pub fn begin_destroy(&self) {
        self.destroy_started.store(true, Ordering::Release);
        while self.post_inflight.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
    }
}

/// Lock-holding borrowed view into the payload ring.
pub struct PayloadView<'a> {
    guard: spin::MutexGuard<'a, Inner>,
    off: usize,
    len: usize,
}

impl Deref for PayloadView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard.ring.buf[self.off..self.off + self.len]
    }
}
