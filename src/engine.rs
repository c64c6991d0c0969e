//! Engine orchestrator: submit → present sequencing over a platform.
//!
//! The engine owns both framebuffers, the staging buffer, the resource
//! store, the event queue consumer side, and the platform handle. Every
//! top-level entry commits all of its effects or none: submissions execute
//! into a staging copy swapped in on success, presents write the terminal
//! in exactly one flush before swapping buffers, and resizes allocate every
//! replacement buffer before committing any.

use crate::arena::Arena;
use crate::buffer::FrameBuffer;
use crate::drawlist::exec::{self, ExecConfig, ImagePlacement};
use crate::drawlist::resources::ResourceStore;
use crate::drawlist::validate;
use crate::drawlist::wire::WireVersion;
use crate::error::{Error, Result};
use crate::input::batch::{pack_events, BatchSummary};
use crate::input::event::{Event, EventKind};
use crate::input::parser::InputParser;
use crate::input::queue::EventQueue;
use crate::limits::Limits;
use crate::platform::{Platform, PlatformOptions, TermPlatform};
use crate::render::caps::TermCaps;
use crate::render::diff::{DiffRenderer, DiffStats};
use crate::render::seq::SeqBuffer;
use crate::render::state::{CursorState, TermState};
use crate::unicode::WidthPolicy;
use std::sync::Arc;
use std::time::Instant;

/// Read-chunk size for the poll loop.
const READ_CHUNK: usize = 4096;

/// Engine configuration, pinned at creation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Accepted drawlist wire version.
    pub version: WireVersion,
    /// Grapheme width policy.
    pub width_policy: WidthPolicy,
    /// Tab stop width (>= 1).
    pub tab_width: u32,
    /// Capability override; `None` detects from the environment.
    pub caps: Option<TermCaps>,
    /// Modes requested from the platform at raw-mode entry.
    pub platform: PlatformOptions,
    /// Event queue slot count.
    pub event_queue_cap: usize,
    /// Payload ring byte capacity.
    pub payload_ring_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: WireVersion::V1,
            width_policy: WidthPolicy::EmojiNarrow,
            tab_width: 8,
            caps: None,
            platform: PlatformOptions::default(),
            event_queue_cap: 256,
            payload_ring_cap: 64 * 1024,
        }
    }
}

/// Counters accumulated across the engine's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics {
    /// Successful submits.
    pub submits: u64,
    /// Successful presents.
    pub frames: u64,
    /// Bytes flushed to the platform.
    pub bytes_written: u64,
    /// Microseconds spent in the last present.
    pub last_present_us: u64,
    /// Smoothed present time in microseconds.
    pub avg_present_us: u64,
}

/// A drawlist-driven terminal rendering engine over platform `P`.
pub struct Engine<P: Platform = TermPlatform> {
    platform: P,
    cfg: EngineConfig,
    limits: Limits,
    caps: TermCaps,
    caps_baseline: TermCaps,
    exec_cfg: ExecConfig,
    fb_prev: FrameBuffer,
    fb_next: FrameBuffer,
    fb_stage: FrameBuffer,
    resources: ResourceStore,
    frame_arena: Arena,
    images: Vec<ImagePlacement>,
    cursor: Option<CursorState>,
    term_state: TermState,
    differ: DiffRenderer,
    out: SeqBuffer,
    parser: InputParser,
    queue: Arc<EventQueue>,
    metrics: EngineMetrics,
    read_buf: Vec<u8>,
    epoch: Instant,
}

impl Engine<TermPlatform> {
    /// Create an engine on the real terminal with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_platform(TermPlatform::new(), EngineConfig::default(), Limits::default())
    }
}

impl<P: Platform> Engine<P> {
    /// Create an engine over `platform`, entering raw mode immediately.
    pub fn with_platform(mut platform: P, cfg: EngineConfig, limits: Limits) -> Result<Self> {
        limits.validate()?;
        if cfg.tab_width == 0 {
            return Err(Error::InvalidArgument("tab_width must be positive"));
        }
        let (cols, rows) = platform.enter_raw(&cfg.platform)?;
        let caps = cfg.caps.unwrap_or_else(|| {
            TermCaps::detect_from_env(
                std::env::var("TERM").ok().as_deref(),
                std::env::var("COLORTERM").ok().as_deref(),
                std::env::var("NO_COLOR").ok().as_deref(),
            )
        });
        let fb_prev = FrameBuffer::new(cols, rows)?;
        let fb_next = FrameBuffer::new(cols, rows)?;
        let fb_stage = FrameBuffer::new(cols, rows)?;
        let frame_arena = Arena::new(
            limits.arena_initial_bytes as usize,
            limits.arena_max_total_bytes as usize,
        )?;
        let queue = Arc::new(EventQueue::new(cfg.event_queue_cap, cfg.payload_ring_cap)?);
        let parser = InputParser::new(caps.bracketed_paste && cfg.platform.bracketed_paste);
        let out = SeqBuffer::new(limits.out_max_bytes_per_frame as usize);
        let exec_cfg = ExecConfig {
            width_policy: cfg.width_policy,
            tab_width: cfg.tab_width,
        };
        log::debug!("engine up: {cols}x{rows}, caps {caps:?}");
        Ok(Self {
            platform,
            cfg,
            limits,
            caps,
            caps_baseline: caps,
            exec_cfg,
            fb_prev,
            fb_next,
            fb_stage,
            resources: ResourceStore::new(),
            frame_arena,
            images: Vec::new(),
            cursor: None,
            term_state: TermState::new(),
            differ: DiffRenderer::new(),
            out,
            parser,
            queue,
            metrics: EngineMetrics::default(),
            read_buf: vec![0u8; READ_CHUNK],
            epoch: Instant::now(),
        })
    }

    /// Current column count.
    pub fn cols(&self) -> i32 {
        self.fb_next.cols()
    }

    /// Current row count.
    pub fn rows(&self) -> i32 {
        self.fb_next.rows()
    }

    /// Active capabilities.
    pub const fn caps(&self) -> &TermCaps {
        &self.caps
    }

    /// The next frame's content (what submit has built so far).
    pub const fn frame(&self) -> &FrameBuffer {
        &self.fb_next
    }

    /// The content last shown on the terminal.
    pub const fn displayed(&self) -> &FrameBuffer {
        &self.fb_prev
    }

    /// Lifetime counters.
    pub const fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// A cloneable handle for cross-thread `post_user` calls.
    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    /// Image placements staged by submissions since the last present.
    pub fn images(&self) -> &[ImagePlacement] {
        &self.images
    }

    /// Payload bytes of a staged image placement.
    pub fn image_data(&self, placement: &ImagePlacement) -> &[u8] {
        self.frame_arena.get(placement.data.clone())
    }

    /// Reconfigure capabilities at runtime.
    ///
    /// Only downgrades are accepted: requesting a color depth or an optional
    /// sequence the terminal was not created with fails with UNSUPPORTED.
    /// On success the terminal-state cache is invalidated so the next
    /// present re-establishes style and cursor from scratch.
    pub fn set_caps(&mut self, caps: TermCaps) -> Result<()> {
        let base = &self.caps_baseline;
        let color_rank = |mode: crate::render::ColorMode| match mode {
            crate::render::ColorMode::Ansi16 => 0,
            crate::render::ColorMode::Xterm256 => 1,
            crate::render::ColorMode::TrueColor => 2,
        };
        let exceeds = color_rank(caps.color_mode) > color_rank(base.color_mode)
            || !base.attrs_supported.contains(caps.attrs_supported)
            || (caps.scroll_region && !base.scroll_region)
            || (caps.cursor_shape && !base.cursor_shape)
            || (caps.bracketed_paste && !base.bracketed_paste)
            || (caps.mouse_sgr && !base.mouse_sgr)
            || (caps.focus_events && !base.focus_events);
        if exceeds {
            return Err(Error::Unsupported("capability not available on this terminal"));
        }
        self.caps = caps;
        self.term_state.invalidate();
        self.differ.invalidate();
        Ok(())
    }

    /// Validate and execute a drawlist into the next frame.
    ///
    /// Failure at any stage leaves the next frame, the resource store, and
    /// the pending cursor untouched.
    pub fn submit(&mut self, drawlist: &[u8]) -> Result<()> {
        let view = validate::validate(drawlist, self.cfg.version, &self.limits)?;
        exec::preflight(&view, &self.resources, &self.limits, &self.frame_arena)?;
        self.fb_stage.copy_from(&self.fb_next);
        let output = exec::execute(
            &view,
            &mut self.fb_stage,
            &mut self.resources,
            &mut self.frame_arena,
            &self.limits,
            &self.exec_cfg,
        )?;
        self.fb_stage.swap(&mut self.fb_next);
        if let Some(cursor) = output.cursor {
            self.cursor = Some(cursor);
        }
        self.images.extend(output.images);
        self.metrics.submits += 1;
        log::trace!("submit ok: {} cmds", view.cmd_count);
        Ok(())
    }

    /// Diff the frames and flush the result to the platform in one write.
    ///
    /// A failing present writes nothing and leaves both framebuffers and
    /// the terminal-state cache as they were.
    pub fn present(&mut self) -> Result<DiffStats> {
        let started = Instant::now();
        let saved_state = self.term_state.clone();
        let stats = self.differ.render(
            &self.fb_prev,
            &self.fb_next,
            &self.caps,
            &mut self.term_state,
            self.cursor.as_ref(),
            &self.limits,
            &mut self.out,
        )?;
        if let Err(err) = self.platform.write(self.out.as_bytes()) {
            self.term_state = saved_state;
            self.out.reset();
            return Err(err);
        }
        self.fb_prev.swap(&mut self.fb_next);
        self.fb_next.copy_from(&self.fb_prev);
        self.differ.commit_hashes();
        self.frame_arena.reset();
        self.images.clear();

        let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.metrics.frames += 1;
        self.metrics.bytes_written += stats.bytes_emitted;
        self.metrics.last_present_us = elapsed_us;
        self.metrics.avg_present_us = if self.metrics.avg_present_us == 0 {
            elapsed_us
        } else {
            (self.metrics.avg_present_us * 15 + elapsed_us) / 16
        };
        log::trace!(
            "present ok: {} bytes, {} dirty lines",
            stats.bytes_emitted,
            stats.dirty_lines
        );
        Ok(stats)
    }

    /// Resize every buffer, committing only when all allocations succeed.
    ///
    /// The previous frame is cleared so the next present repaints fully,
    /// and a RESIZE event is queued for the caller.
    pub fn resize(&mut self, cols: i32, rows: i32) -> Result<()> {
        let mut new_prev = FrameBuffer::new(cols, rows)?;
        let mut new_next = self.fb_next.clone();
        new_next.resize(cols, rows)?;
        let new_stage = FrameBuffer::new(cols, rows)?;

        new_prev.clear(crate::buffer::Style::DEFAULT);
        self.fb_prev = new_prev;
        self.fb_next = new_next;
        self.fb_stage = new_stage;
        self.term_state.invalidate();
        self.differ.invalidate();
        self.queue
            .push(Event::new(self.now_ms(), EventKind::Resize { cols, rows }));
        log::debug!("resize to {cols}x{rows}");
        Ok(())
    }

    /// Wait for input up to `timeout_ms`, parse whatever arrived, and
    /// return the queued event count. A timeout queues a TICK and lets the
    /// parser flush held bytes (ESC disambiguation, paste watchdog).
    pub fn poll(&mut self, timeout_ms: u64) -> Result<usize> {
        let readable = self.platform.wait_input(timeout_ms)?;
        let now = self.now_ms();
        if readable {
            let mut buf = std::mem::take(&mut self.read_buf);
            let result = self.drain_input(&mut buf, now);
            self.read_buf = buf;
            result?;
        } else {
            self.parser.idle_flush(now, &self.queue);
            self.queue.push(Event::new(now, EventKind::Tick));
        }
        Ok(self.queue.len())
    }

    fn drain_input(&mut self, buf: &mut [u8], now: u64) -> Result<()> {
        loop {
            let outcome = self.platform.read_input(buf)?;
            if let Some((cols, rows)) = outcome.resized {
                self.resize(cols, rows)?;
            }
            if outcome.bytes == 0 {
                break;
            }
            self.parser
                .parse_bytes_prefix(&buf[..outcome.bytes], now, &self.queue);
            if outcome.bytes < buf.len() {
                break;
            }
        }
        Ok(())
    }

    /// Drain queued events into `out` as a packed batch.
    pub fn pack_events(&mut self, out: &mut [u8]) -> BatchSummary {
        pack_events(&self.queue, out)
    }

    /// Milliseconds since engine creation; the timestamp source for
    /// engine-side events.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl<P: Platform> Drop for Engine<P> {
    fn drop(&mut self) {
        // Refuse new posts and wait out in-flight ones before the queue's
        // backing memory can go away with this struct.
        self.queue.begin_destroy();
        let _ = self.platform.leave_raw();
    }
}
