//! Input pipeline: byte parsing, the shared event queue, batch packing.

pub mod batch;
pub mod event;
pub mod parser;
pub mod queue;

pub use batch::{pack_events, BatchSummary};
pub use event::{Event, EventKind, KeyCode, KeyEvent, Mods, MouseButton, MouseEvent, MouseKind, TextEvent};
pub use parser::InputParser;
pub use queue::{EventQueue, PayloadView};
