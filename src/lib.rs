//! # ZRDL
//!
//! A deterministic drawlist-driven terminal rendering engine.
//!
//! ZRDL accepts self-framed binary command lists ('ZRDL' drawlists),
//! validates every byte of them, executes them into a styled cell grid, and
//! emits the minimal VT/ANSI sequence that transforms what is on screen
//! into the new frame — in a single flush. Input bytes come back as a
//! normalized event stream with deterministic coalescing.
//!
//! ## Core concepts
//!
//! - **Double-buffered frames**: submissions build `next`, presents diff it
//!   against `prev` and swap.
//! - **No partial effects**: every failing top-level call is a no-op on
//!   observable state.
//! - **Deterministic output**: the emitted bytes are a pure function of the
//!   two frames, the capabilities, and the cached terminal state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use zrdl::{DrawlistBuilder, Engine, WireStyle};
//!
//! let mut engine = Engine::new()?;
//! let mut dl = DrawlistBuilder::new();
//! let text = dl.intern_string(b"hello terminal");
//! dl.draw_text(2, 1, text, 0, 14, &WireStyle::default());
//! engine.submit(&dl.finish())?;
//! engine.present()?;
//! ```

pub mod arena;
pub mod buffer;
pub mod drawlist;
pub mod engine;
pub mod error;
pub mod geom;
pub mod input;
pub mod limits;
pub mod platform;
pub mod render;
pub mod unicode;

// Re-exports for convenience
pub use buffer::{Attrs, Cell, FrameBuffer, Painter, Rgb, Style};
pub use drawlist::{DrawlistBuilder, ResourceStore, WireStyle, WireVersion};
pub use engine::{Engine, EngineConfig, EngineMetrics};
pub use error::{Error, Result};
pub use geom::Rect;
pub use input::{Event, EventKind, EventQueue, InputParser, KeyCode, Mods};
pub use limits::Limits;
pub use platform::{Platform, PlatformOptions, TermPlatform};
pub use render::{CursorState, DiffRenderer, DiffStats, TermCaps, TermState};
pub use unicode::WidthPolicy;
