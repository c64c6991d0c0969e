//! Cell: the atomic unit of terminal display.
//!
//! Each cell stores a grapheme cluster inline (up to [`GLYPH_MAX`] bytes), a
//! display width, and a full [`Style`]. Width 0 marks a continuation cell,
//! the second half of a width-2 lead.

use crate::unicode::GLYPH_MAX;
use bitflags::bitflags;

/// True-color RGB representation, 3 bytes for 24-bit depth.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rgb {
    /// Red channel (0-255)
    pub r: u8,
    /// Green channel (0-255)
    pub g: u8,
    /// Blue channel (0-255)
    pub b: u8,
}

impl Rgb {
    /// Create a new RGB color.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Black (0, 0, 0)
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// White (255, 255, 255)
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Create from a 24-bit hex color (e.g., 0xFF5500).
    #[inline]
    pub const fn from_u32(hex: u32) -> Self {
        Self::new(
            ((hex >> 16) & 0xFF) as u8,
            ((hex >> 8) & 0xFF) as u8,
            (hex & 0xFF) as u8,
        )
    }

    /// Pack into the low 24 bits of a u32.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

impl std::fmt::Debug for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<u32> for Rgb {
    #[inline]
    fn from(hex: u32) -> Self {
        Self::from_u32(hex)
    }
}

bitflags! {
    /// Text style attributes.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attrs: u8 {
        /// Bold text
        const BOLD = 0b0000_0001;
        /// Italic text
        const ITALIC = 0b0000_0010;
        /// Underlined text
        const UNDERLINE = 0b0000_0100;
        /// Reversed colors (fg/bg swapped)
        const REVERSE = 0b0000_1000;
        /// Strikethrough text
        const STRIKETHROUGH = 0b0001_0000;
    }
}

impl std::fmt::Debug for Attrs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// A cell style: colors, attributes, and an interned link handle.
///
/// The link field is an opaque handle into the owning framebuffer's
/// interning table; 0 means "no link".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Style {
    /// Foreground color.
    pub fg: Rgb,
    /// Background color.
    pub bg: Rgb,
    /// Underline color.
    pub underline: Rgb,
    /// Attribute set.
    pub attrs: Attrs,
    /// Interned hyperlink handle (0 = none).
    pub link: u32,
}

impl Style {
    /// The default style: white on black, no attributes, no link.
    pub const DEFAULT: Self = Self {
        fg: Rgb::WHITE,
        bg: Rgb::BLACK,
        underline: Rgb::WHITE,
        attrs: Attrs::empty(),
        link: 0,
    };

    /// Set the foreground color (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_fg(mut self, fg: Rgb) -> Self {
        self.fg = fg;
        self
    }

    /// Set the background color (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_bg(mut self, bg: Rgb) -> Self {
        self.bg = bg;
        self
    }

    /// Set the attribute set (builder pattern).
    #[inline]
    #[must_use]
    pub const fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Debug for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Style")
            .field("fg", &self.fg)
            .field("bg", &self.bg)
            .field("attrs", &self.attrs)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

/// A single terminal cell: inline glyph bytes, display width, style.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    glyph: [u8; GLYPH_MAX],
    glyph_len: u8,
    width: u8,
    style: Style,
}

impl Cell {
    /// An empty cell: width-1 space in the default style.
    pub const EMPTY: Self = Self::space(Style::DEFAULT);

    /// A width-1 space in the given style.
    #[inline]
    pub const fn space(style: Style) -> Self {
        let mut glyph = [0u8; GLYPH_MAX];
        glyph[0] = b' ';
        Self {
            glyph,
            glyph_len: 1,
            width: 1,
            style,
        }
    }

    /// A continuation cell: empty glyph, width 0, style carried from the
    /// lead so background diffs stay coherent.
    #[inline]
    pub const fn continuation(style: Style) -> Self {
        Self {
            glyph: [0u8; GLYPH_MAX],
            glyph_len: 0,
            width: 0,
            style,
        }
    }

    /// Build a cell from pre-validated grapheme bytes.
    ///
    /// Callers must have run the safety check (`unicode::grapheme_is_safe`)
    /// and width computation; this only copies.
    pub fn from_glyph(bytes: &[u8], width: u8, style: Style) -> Self {
        debug_assert!(!bytes.is_empty() && bytes.len() <= GLYPH_MAX);
        debug_assert!(width == 1 || width == 2);
        let mut glyph = [0u8; GLYPH_MAX];
        glyph[..bytes.len()].copy_from_slice(bytes);
        Self {
            glyph,
            glyph_len: bytes.len() as u8,
            width,
            style,
        }
    }

    /// The glyph as a string slice; empty for continuation cells.
    #[inline]
    pub fn glyph(&self) -> &str {
        std::str::from_utf8(&self.glyph[..self.glyph_len as usize]).unwrap_or("\u{FFFD}")
    }

    /// Raw glyph bytes.
    #[inline]
    pub fn glyph_bytes(&self) -> &[u8] {
        &self.glyph[..self.glyph_len as usize]
    }

    /// Display width: 0 (continuation), 1, or 2.
    #[inline]
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// True for the second half of a wide glyph.
    #[inline]
    pub const fn is_continuation(&self) -> bool {
        self.width == 0
    }

    /// True for a width-2 lead cell.
    #[inline]
    pub const fn is_wide(&self) -> bool {
        self.width == 2
    }

    /// The cell style.
    #[inline]
    pub const fn style(&self) -> Style {
        self.style
    }

    /// Mutable access to the style.
    #[inline]
    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.style
    }

    /// Feed the cell's identity into a hasher; deterministic across runs.
    #[inline]
    pub fn hash_into(&self, h: &mut Fnv64) {
        h.write(self.glyph_bytes());
        h.write_u8(self.glyph_len);
        h.write_u8(self.width);
        h.write_u8(self.style.fg.r);
        h.write_u8(self.style.fg.g);
        h.write_u8(self.style.fg.b);
        h.write_u8(self.style.bg.r);
        h.write_u8(self.style.bg.g);
        h.write_u8(self.style.bg.b);
        h.write_u8(self.style.underline.r);
        h.write_u8(self.style.underline.g);
        h.write_u8(self.style.underline.b);
        h.write_u8(self.style.attrs.bits());
        h.write_u32(self.style.link);
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("glyph", &self.glyph())
            .field("width", &self.width)
            .field("style", &self.style)
            .finish()
    }
}

/// 64-bit FNV-1a, the row-hash function of the diff renderer.
#[derive(Clone, Copy)]
pub struct Fnv64(u64);

impl Fnv64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    /// Fresh hasher at the FNV offset basis.
    #[inline]
    pub const fn new() -> Self {
        Self(Self::OFFSET)
    }

    /// Mix a byte slice.
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 ^ u64::from(b)).wrapping_mul(Self::PRIME);
        }
    }

    /// Mix a single byte.
    #[inline]
    pub fn write_u8(&mut self, b: u8) {
        self.0 = (self.0 ^ u64::from(b)).wrapping_mul(Self::PRIME);
    }

    /// Mix a u32 in little-endian order.
    #[inline]
    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Final hash value.
    #[inline]
    pub const fn finish(self) -> u64 {
        self.0
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cell_is_space() {
        assert_eq!(Cell::EMPTY.glyph(), " ");
        assert_eq!(Cell::EMPTY.width(), 1);
        assert!(!Cell::EMPTY.is_continuation());
    }

    #[test]
    fn test_continuation() {
        let c = Cell::continuation(Style::DEFAULT);
        assert!(c.is_continuation());
        assert_eq!(c.width(), 0);
        assert_eq!(c.glyph(), "");
    }

    #[test]
    fn test_from_glyph_wide() {
        let c = Cell::from_glyph("漢".as_bytes(), 2, Style::DEFAULT);
        assert_eq!(c.glyph(), "漢");
        assert!(c.is_wide());
    }

    #[test]
    fn test_style_equality_affects_cell() {
        let red = Style::DEFAULT.with_fg(Rgb::new(255, 0, 0));
        let a = Cell::space(Style::DEFAULT);
        let b = Cell::space(red);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fnv_known_vector() {
        // FNV-1a("a") = 0xaf63dc4c8601ec8c
        let mut h = Fnv64::new();
        h.write(b"a");
        assert_eq!(h.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_hash_distinguishes_styles() {
        let mut a = Fnv64::new();
        let mut b = Fnv64::new();
        Cell::space(Style::DEFAULT).hash_into(&mut a);
        Cell::space(Style::DEFAULT.with_attrs(Attrs::BOLD)).hash_into(&mut b);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_rgb_round_trip() {
        let c = Rgb::from_u32(0xFF8000);
        assert_eq!((c.r, c.g, c.b), (255, 128, 0));
        assert_eq!(c.to_u32(), 0xFF8000);
    }
}
