//! Cell grid, styles, and clip-aware drawing primitives.

pub mod cell;
pub mod framebuffer;
pub mod painter;

pub use cell::{Attrs, Cell, Fnv64, Rgb, Style};
pub use framebuffer::{FrameBuffer, LinkEntry, LinkTable, LINK_ID_MAX_BYTES, LINK_URI_MAX_BYTES};
pub use painter::Painter;
