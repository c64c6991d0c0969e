//! Unicode helpers: UTF-8 decoding, grapheme safety, and cell width policy.
//!
//! Width is pinned at engine creation so a frame renders identically on every
//! run: `unicode-width` supplies the base measurement and the emoji policy
//! decides whether presentation-style emoji occupy one or two cells.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Maximum glyph byte length stored inline in a cell.
pub const GLYPH_MAX: usize = 16;

/// The replacement grapheme used for oversized or unsafe input.
pub const REPLACEMENT: &str = "\u{FFFD}";

/// Cell-width policy for emoji-presentation clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidthPolicy {
    /// Emoji take the width `unicode-width` reports (often 1 for text-style).
    #[default]
    EmojiNarrow,
    /// Clusters with emoji presentation are forced to width 2.
    EmojiWide,
}

/// True for scalars that must never reach a cell: C0 controls, DEL, and C1
/// controls.
#[inline]
pub const fn is_control_scalar(c: char) -> bool {
    let v = c as u32;
    v < 0x20 || v == 0x7F || (v >= 0x80 && v < 0xA0)
}

/// True when `s` is safe to store as a single cell glyph: exactly one
/// grapheme cluster, no control scalars, and at most [`GLYPH_MAX`] bytes.
pub fn grapheme_is_safe(s: &str) -> bool {
    if s.is_empty() || s.len() > GLYPH_MAX {
        return false;
    }
    if s.chars().any(is_control_scalar) {
        return false;
    }
    s.graphemes(true).count() == 1
}

/// Iterate the grapheme clusters of `s`.
pub fn graphemes(s: &str) -> impl Iterator<Item = &str> {
    s.graphemes(true)
}

/// Expected byte length of a UTF-8 sequence from its first byte, or `None`
/// for a continuation or invalid lead byte.
#[inline]
pub const fn utf8_len(first: u8) -> Option<usize> {
    match first {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

/// Decode one scalar from the front of `bytes`.
///
/// Returns the scalar and the bytes it consumed, or `None` when the prefix
/// is not a complete, valid sequence.
pub fn decode_scalar(bytes: &[u8]) -> Option<(char, usize)> {
    let len = utf8_len(*bytes.first()?)?;
    if bytes.len() < len {
        return None;
    }
    let s = std::str::from_utf8(&bytes[..len]).ok()?;
    s.chars().next().map(|c| (c, len))
}

/// Display width of a single grapheme cluster under `policy`, in {1, 2}.
///
/// Zero-width clusters (lone combining marks) occupy one cell so layout
/// stays stable; anything wider than 2 is clamped to 2.
pub fn grapheme_width(s: &str, policy: WidthPolicy) -> usize {
    let base = UnicodeWidthStr::width(s);
    let w = base.clamp(1, 2);
    if policy == WidthPolicy::EmojiWide && w == 1 && is_emoji_presentation(s) {
        return 2;
    }
    w
}

/// True for clusters an emoji-wide terminal renders double-width: anything
/// carrying VS16 (U+FE0F) or a scalar in the emoji-dominant SMP blocks.
fn is_emoji_presentation(s: &str) -> bool {
    s.chars().any(|c| {
        let v = c as u32;
        v == 0xFE0F || (0x1F000..=0x1FAFF).contains(&v) || (0x2600..=0x27BF).contains(&v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_scalars() {
        assert!(is_control_scalar('\x00'));
        assert!(is_control_scalar('\x1b'));
        assert!(is_control_scalar('\x7f'));
        assert!(is_control_scalar('\u{85}'));
        assert!(!is_control_scalar(' '));
        assert!(!is_control_scalar('\u{a0}'));
    }

    #[test]
    fn test_grapheme_safety() {
        assert!(grapheme_is_safe("A"));
        assert!(grapheme_is_safe("漢"));
        assert!(grapheme_is_safe("é"));
        assert!(!grapheme_is_safe(""));
        assert!(!grapheme_is_safe("ab"));
        assert!(!grapheme_is_safe("\t"));
        assert!(!grapheme_is_safe("\x1b[31m"));
    }

    #[test]
    fn test_oversized_cluster_unsafe() {
        // Family emoji ZWJ sequence is 25 bytes, over GLYPH_MAX.
        assert!(!grapheme_is_safe("👨‍👩‍👧‍👦"));
    }

    #[test]
    fn test_decode_scalar() {
        assert_eq!(decode_scalar(b"A rest"), Some(('A', 1)));
        assert_eq!(decode_scalar("漢x".as_bytes()), Some(('漢', 3)));
        assert_eq!(decode_scalar(&[0xE6, 0xBC]), None); // incomplete
        assert_eq!(decode_scalar(&[0xFF]), None);
        assert_eq!(decode_scalar(&[]), None);
    }

    #[test]
    fn test_widths() {
        assert_eq!(grapheme_width("A", WidthPolicy::EmojiNarrow), 1);
        assert_eq!(grapheme_width("漢", WidthPolicy::EmojiNarrow), 2);
        // Combining mark alone still occupies a cell.
        assert_eq!(grapheme_width("\u{0301}", WidthPolicy::EmojiNarrow), 1);
    }

    #[test]
    fn test_emoji_policy() {
        // U+2764 U+FE0F (red heart with VS16): narrow policy keeps the base
        // width, wide policy forces 2.
        let heart = "\u{2764}\u{FE0F}";
        assert_eq!(grapheme_width(heart, WidthPolicy::EmojiWide), 2);
    }
}
