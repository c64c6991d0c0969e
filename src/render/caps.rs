//! Terminal capabilities and deterministic color downgrade.
//!
//! Every style passes through the downgrade before comparison and emission:
//! attribute bits are masked to what the terminal supports and colors are
//! quantized to the active color mode. Downgrade is a pure function, so the
//! same frame always produces the same bytes on the same terminal.

use crate::buffer::{Attrs, Rgb};

/// Color depth the terminal accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// 24-bit SGR 38;2 / 48;2.
    #[default]
    TrueColor,
    /// xterm 256-color SGR 38;5 / 48;5.
    Xterm256,
    /// Classic 16-color SGR 30-37 / 90-97.
    Ansi16,
}

/// What the engine may emit. Sequences for unsupported capabilities are
/// never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermCaps {
    /// Active color depth.
    pub color_mode: ColorMode,
    /// Attribute bits the terminal renders.
    pub attrs_supported: Attrs,
    /// DECSTBM + SU/SD scroll optimization allowed.
    pub scroll_region: bool,
    /// DECSCUSR cursor shape allowed.
    pub cursor_shape: bool,
    /// Bracketed paste mode enabled on input.
    pub bracketed_paste: bool,
    /// SGR 1006 mouse reporting enabled on input.
    pub mouse_sgr: bool,
    /// Focus in/out reporting enabled on input.
    pub focus_events: bool,
}

impl TermCaps {
    /// Everything on: truecolor, all attributes, scroll region, shapes.
    pub const fn full() -> Self {
        Self {
            color_mode: ColorMode::TrueColor,
            attrs_supported: Attrs::all(),
            scroll_region: true,
            cursor_shape: true,
            bracketed_paste: true,
            mouse_sgr: true,
            focus_events: true,
        }
    }

    /// Conservative floor: 16 colors, bold/underline/reverse only, no
    /// optional sequences.
    pub const fn basic() -> Self {
        Self {
            color_mode: ColorMode::Ansi16,
            attrs_supported: Attrs::BOLD.union(Attrs::UNDERLINE).union(Attrs::REVERSE),
            scroll_region: false,
            cursor_shape: false,
            bracketed_paste: false,
            mouse_sgr: false,
            focus_events: false,
        }
    }

    /// Derive capabilities from environment values. Pure: pass the values
    /// of `TERM`, `COLORTERM`, and `NO_COLOR` in.
    ///
    /// Unknown terminals degrade deterministically to 16-color.
    pub fn detect_from_env(
        term: Option<&str>,
        colorterm: Option<&str>,
        no_color: Option<&str>,
    ) -> Self {
        let term = term.unwrap_or("");
        let truecolor = matches!(colorterm, Some("truecolor" | "24bit"));
        let color256 = term.contains("256color");
        let xterm_like = term.starts_with("xterm")
            || term.starts_with("screen")
            || term.starts_with("tmux")
            || term.starts_with("rxvt")
            || term == "linux";

        let color_mode = if no_color.is_some_and(|v| !v.is_empty()) {
            ColorMode::Ansi16
        } else if truecolor {
            ColorMode::TrueColor
        } else if color256 {
            ColorMode::Xterm256
        } else {
            ColorMode::Ansi16
        };

        Self {
            color_mode,
            attrs_supported: Attrs::all(),
            scroll_region: xterm_like,
            cursor_shape: xterm_like,
            bracketed_paste: xterm_like,
            mouse_sgr: xterm_like,
            focus_events: xterm_like,
        }
    }

    /// Mask attributes to the supported set.
    #[inline]
    pub fn downgrade_attrs(&self, attrs: Attrs) -> Attrs {
        attrs & self.attrs_supported
    }
}

impl Default for TermCaps {
    fn default() -> Self {
        Self::full()
    }
}

/// A color quantized for emission under a [`ColorMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedColor {
    /// Emit as 38;2;r;g;b.
    Rgb(Rgb),
    /// Emit as 38;5;n.
    Idx256(u8),
    /// Emit as 30-37 / 90-97 (index 0-15).
    Idx16(u8),
}

/// The 16-color palette, xterm default values. These exact values are part
/// of the downgrade contract; do not substitute other ANSI tables.
pub const ANSI16_PALETTE: [Rgb; 16] = [
    Rgb::new(0, 0, 0),
    Rgb::new(205, 0, 0),
    Rgb::new(0, 205, 0),
    Rgb::new(205, 205, 0),
    Rgb::new(0, 0, 238),
    Rgb::new(205, 0, 205),
    Rgb::new(0, 205, 205),
    Rgb::new(229, 229, 229),
    Rgb::new(127, 127, 127),
    Rgb::new(255, 0, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(255, 255, 0),
    Rgb::new(92, 92, 255),
    Rgb::new(255, 0, 255),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 255, 255),
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

#[inline]
fn dist2(a: Rgb, b: Rgb) -> u32 {
    let dr = i32::from(a.r) - i32::from(b.r);
    let dg = i32::from(a.g) - i32::from(b.g);
    let db = i32::from(a.b) - i32::from(b.b);
    (dr * dr + dg * dg + db * db) as u32
}

/// Nearest xterm-256 index: 6x6x6 cube entries (16-231) and the 24-step
/// gray ramp (232-255) compete on squared distance; ties go to the smaller
/// index.
pub fn xterm256_index(c: Rgb) -> u8 {
    let mut best_idx = 16u8;
    let mut best_d = u32::MAX;
    for r in 0..6u8 {
        for g in 0..6u8 {
            for b in 0..6u8 {
                let entry = Rgb::new(CUBE_LEVELS[r as usize], CUBE_LEVELS[g as usize], CUBE_LEVELS[b as usize]);
                let d = dist2(c, entry);
                if d < best_d {
                    best_d = d;
                    best_idx = 16 + 36 * r + 6 * g + b;
                }
            }
        }
    }
    for i in 0..24u8 {
        let v = 8 + 10 * i;
        let d = dist2(c, Rgb::new(v, v, v));
        if d < best_d {
            best_d = d;
            best_idx = 232 + i;
        }
    }
    best_idx
}

/// Nearest 16-color palette index; ties prefer the smaller index.
pub fn ansi16_index(c: Rgb) -> u8 {
    let mut best_idx = 0u8;
    let mut best_d = u32::MAX;
    for (i, &entry) in ANSI16_PALETTE.iter().enumerate() {
        let d = dist2(c, entry);
        if d < best_d {
            best_d = d;
            best_idx = i as u8;
        }
    }
    best_idx
}

/// Quantize a color for the given mode.
pub fn resolve_color(c: Rgb, mode: ColorMode) -> ResolvedColor {
    match mode {
        ColorMode::TrueColor => ResolvedColor::Rgb(c),
        ColorMode::Xterm256 => ResolvedColor::Idx256(xterm256_index(c)),
        ColorMode::Ansi16 => ResolvedColor::Idx16(ansi16_index(c)),
    }
}
