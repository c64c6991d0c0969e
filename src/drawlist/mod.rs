//! Drawlist pipeline: wire format, validation, resources, execution.

pub mod builder;
pub mod canvas;
pub mod exec;
pub mod resources;
pub mod validate;
pub mod wire;

pub use builder::DrawlistBuilder;
pub use exec::{ExecConfig, ExecOutput, ImagePlacement};
pub use resources::{ResKind, ResourceStore};
pub use validate::{validate, DrawlistView};
pub use wire::{Blitter, Command, CursorShape, Opcode, WireStyle, WireVersion};
