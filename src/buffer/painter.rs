//! Painter: clip-aware drawing primitives over a framebuffer.
//!
//! A painter is a transient handle: open one, draw, drop it. The clip stack
//! has fixed capacity with the full framebuffer bounds as its initial entry;
//! every push intersects with the current top and the bounds.
//!
//! The painter is the only place the wide-glyph invariants are maintained
//! during drawing. One exception to clipping is allowed: repairing the pair
//! of a wide glyph may touch exactly one immediate neighbor (x-1 or x+1)
//! outside the current clip. No other out-of-clip write exists.

use super::cell::{Cell, Style};
use super::framebuffer::FrameBuffer;
use crate::error::{Error, Result};
use crate::geom::Rect;
use crate::unicode::{self, WidthPolicy, REPLACEMENT};

/// Transient drawing handle with a bounded clip stack.
pub struct Painter<'fb> {
    fb: &'fb mut FrameBuffer,
    clips: Vec<Rect>,
    max_depth: usize,
}

impl<'fb> Painter<'fb> {
    /// Open a painter over `fb` allowing at most `max_clip_depth` pushes
    /// beyond the initial full-bounds entry.
    pub fn new(fb: &'fb mut FrameBuffer, max_clip_depth: usize) -> Self {
        let bounds = Rect::from_size(fb.cols(), fb.rows());
        let mut clips = Vec::with_capacity(max_clip_depth + 1);
        clips.push(bounds);
        Self {
            fb,
            clips,
            max_depth: max_clip_depth,
        }
    }

    /// The current clip (top of the stack).
    #[inline]
    pub fn clip(&self) -> Rect {
        *self.clips.last().unwrap_or(&Rect::ZERO)
    }

    /// Current stack depth including the initial entry.
    #[inline]
    pub fn clip_depth(&self) -> usize {
        self.clips.len()
    }

    /// Push a clip: the intersection of `rect`, the current top, and the
    /// framebuffer bounds. Fails with LIMIT when the stack is full.
    pub fn push_clip(&mut self, rect: Rect) -> Result<()> {
        if self.clips.len() > self.max_depth {
            return Err(Error::Limit("clip stack depth"));
        }
        let bounds = Rect::from_size(self.fb.cols(), self.fb.rows());
        let next = rect.intersect(&self.clip()).intersect(&bounds);
        self.clips.push(next);
        Ok(())
    }

    /// Pop a clip. Fails with LIMIT when only the initial entry remains.
    pub fn pop_clip(&mut self) -> Result<()> {
        if self.clips.len() <= 1 {
            return Err(Error::Limit("clip stack underflow"));
        }
        self.clips.pop();
        Ok(())
    }

    /// Borrow the underlying framebuffer.
    #[inline]
    pub fn fb(&self) -> &FrameBuffer {
        self.fb
    }

    /// Intern a hyperlink into the framebuffer's link table.
    #[inline]
    pub fn intern_link(&mut self, uri: &[u8], id: &[u8]) -> u32 {
        self.fb.links_mut().intern(uri, id)
    }

    #[inline]
    fn writable(&self, x: i32, y: i32) -> bool {
        self.clip().contains(x, y)
    }

    /// Clear the partner of any wide glyph occupying (x, y), so the position
    /// can be overwritten. This is the locked out-of-clip exception: the one
    /// neighbor write may land outside the clip.
    fn clear_pair(&mut self, x: i32, y: i32) {
        let Some(cell) = self.fb.cell(x, y).copied() else {
            return;
        };
        if cell.is_wide() {
            if let Some(next) = self.fb.cell_mut(x + 1, y) {
                if next.is_continuation() {
                    *next = Cell::space(next.style());
                }
            }
        } else if cell.is_continuation() {
            if let Some(prev) = self.fb.cell_mut(x - 1, y) {
                if prev.is_wide() {
                    *prev = Cell::space(prev.style());
                }
            }
        }
    }

    #[inline]
    fn write_cell(&mut self, x: i32, y: i32, cell: Cell) {
        self.clear_pair(x, y);
        if let Some(slot) = self.fb.cell_mut(x, y) {
            *slot = cell;
        }
    }

    /// Fill the intersection of `rect`, the clip, and the bounds with
    /// width-1 space cells in `style`.
    pub fn fill_rect(&mut self, rect: Rect, style: &Style) {
        let target = rect.intersect(&self.clip());
        if target.is_empty() {
            return;
        }
        for y in target.y..target.bottom() {
            // Splitting a wide glyph at either edge must clear its partner.
            self.clear_pair(target.x, y);
            self.clear_pair(target.right() - 1, y);
            for x in target.x..target.right() {
                if let Some(slot) = self.fb.cell_mut(x, y) {
                    *slot = Cell::space(*style);
                }
            }
        }
    }

    /// Place a single grapheme with a declared width of 1 or 2.
    ///
    /// Canonicalization: empty input becomes a width-1 space; bytes that are
    /// not one safe UTF-8 grapheme become U+FFFD at width 1. When width 2 is
    /// requested but the continuation cell cannot be written (clip or
    /// bounds), U+FFFD is rendered at width 1 instead; the caller still
    /// advances by the logical width it asked for.
    pub fn put_grapheme(&mut self, x: i32, y: i32, bytes: &[u8], width: u8, style: &Style) {
        debug_assert!(width == 1 || width == 2);
        let (glyph, width): (&[u8], u8) = if bytes.is_empty() {
            (b" ", 1)
        } else {
            match std::str::from_utf8(bytes) {
                Ok(s) if unicode::grapheme_is_safe(s) => (bytes, width),
                _ => (REPLACEMENT.as_bytes(), 1),
            }
        };

        if !self.writable(x, y) {
            return;
        }
        if width == 2 {
            if self.writable(x + 1, y) {
                self.write_cell(x, y, Cell::from_glyph(glyph, 2, *style));
                // clear_pair ran inside write_cell for the lead position;
                // the continuation slot also needs its old pair cleared.
                self.clear_pair(x + 1, y);
                if let Some(slot) = self.fb.cell_mut(x + 1, y) {
                    *slot = Cell::continuation(*style);
                }
            } else {
                self.write_cell(x, y, Cell::from_glyph(REPLACEMENT.as_bytes(), 1, *style));
            }
        } else {
            self.write_cell(x, y, Cell::from_glyph(glyph, 1, *style));
        }
    }

    /// Draw UTF-8 text at (x, y), one grapheme cluster per cell position.
    ///
    /// The cursor advances by each cluster's logical width whether or not
    /// the cells were clipped, so layout stays stable. A tab expands to
    /// spaces up to the next `tab_width` stop; other control scalars render
    /// as U+FFFD. Invalid byte ranges render one U+FFFD each.
    ///
    /// Returns the column after the last logical advance.
    pub fn draw_text(
        &mut self,
        x: i32,
        y: i32,
        text: &[u8],
        style: &Style,
        policy: WidthPolicy,
        tab_width: u32,
    ) -> i32 {
        debug_assert!(tab_width >= 1);
        let mut col = x;
        let mut rest = text;
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(chunk) => {
                    col = self.draw_str(col, y, chunk, style, policy, tab_width);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if valid > 0 {
                        let chunk = std::str::from_utf8(&rest[..valid]).unwrap_or("");
                        col = self.draw_str(col, y, chunk, style, policy, tab_width);
                    }
                    self.put_grapheme(col, y, REPLACEMENT.as_bytes(), 1, style);
                    col += 1;
                    let skip = err.error_len().unwrap_or(rest.len() - valid);
                    rest = &rest[valid + skip..];
                }
            }
        }
        col
    }

    fn draw_str(
        &mut self,
        x: i32,
        y: i32,
        text: &str,
        style: &Style,
        policy: WidthPolicy,
        tab_width: u32,
    ) -> i32 {
        let mut col = x;
        for cluster in unicode::graphemes(text) {
            if cluster == "\t" {
                let stop = next_tab_stop(col, tab_width);
                while col < stop {
                    self.put_grapheme(col, y, b" ", 1, style);
                    col += 1;
                }
                continue;
            }
            let width = unicode::grapheme_width(cluster, policy) as u8;
            self.put_grapheme(col, y, cluster.as_bytes(), width, style);
            col += i32::from(width);
        }
        col
    }

    /// Copy a rectangular region to (dst_x, dst_y) with overlap safety.
    ///
    /// Iteration runs bottom-up when the destination is below the source and
    /// right-to-left on same-row rightward moves, so unread source cells are
    /// never overwritten first. Continuation cells are never copied
    /// directly; each wide lead re-places its pair.
    pub fn blit_rect(&mut self, src: Rect, dst_x: i32, dst_y: i32) {
        let bounds = Rect::from_size(self.fb.cols(), self.fb.rows());
        let src = src.intersect(&bounds);
        if src.is_empty() || (dst_x == src.x && dst_y == src.y) {
            return;
        }
        let reverse_y = dst_y > src.y;
        let reverse_x = dst_y == src.y && dst_x > src.x;

        let mut dy = 0;
        while dy < src.h {
            let ry = if reverse_y { src.h - 1 - dy } else { dy };
            let mut dx = 0;
            while dx < src.w {
                let rx = if reverse_x { src.w - 1 - dx } else { dx };
                let cell = match self.fb.cell(src.x + rx, src.y + ry) {
                    Some(c) => *c,
                    None => {
                        dx += 1;
                        continue;
                    }
                };
                if cell.is_continuation() {
                    // Produced by its lead's re-placement.
                    dx += 1;
                    continue;
                }
                let style = cell.style();
                let width = cell.width();
                self.put_grapheme(dst_x + rx, dst_y + ry, cell.glyph_bytes(), width, &style);
                dx += 1;
            }
            dy += 1;
        }
    }
}

#[inline]
const fn next_tab_stop(col: i32, tab_width: u32) -> i32 {
    let tw = tab_width as i32;
    (col / tw + 1) * tw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::cell::Rgb;

    fn fb(cols: i32, rows: i32) -> FrameBuffer {
        FrameBuffer::new(cols, rows).unwrap()
    }

    fn row_string(fb: &FrameBuffer, y: i32) -> String {
        fb.row(y).iter().map(Cell::glyph).collect()
    }

    #[test]
    fn test_put_ascii() {
        let mut fb = fb(4, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(1, 0, b"A", 1, &Style::DEFAULT);
        drop(p);
        assert_eq!(row_string(&fb, 0), " A  ");
    }

    #[test]
    fn test_put_wide_sets_continuation() {
        let mut fb = fb(4, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(0, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        drop(p);
        assert!(fb.cell(0, 0).unwrap().is_wide());
        assert!(fb.cell(1, 0).unwrap().is_continuation());
        assert!(fb.check_invariants());
    }

    #[test]
    fn test_overwrite_wide_lead_clears_pair() {
        // Scenario: wide glyph then 'x' over its lead.
        let mut fb = fb(4, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(0, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        p.put_grapheme(0, 0, b"x", 1, &Style::DEFAULT);
        drop(p);
        assert_eq!(row_string(&fb, 0), "x   ");
        assert!(fb.check_invariants());
    }

    #[test]
    fn test_overwrite_continuation_clears_lead() {
        let mut fb = fb(4, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(0, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        p.put_grapheme(1, 0, b"y", 1, &Style::DEFAULT);
        drop(p);
        assert_eq!(row_string(&fb, 0), " y  ");
        assert!(fb.check_invariants());
    }

    #[test]
    fn test_wide_at_right_edge_degrades() {
        let mut fb = fb(3, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(2, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        drop(p);
        assert_eq!(fb.cell(2, 0).unwrap().glyph(), "\u{FFFD}");
        assert_eq!(fb.cell(2, 0).unwrap().width(), 1);
        assert!(fb.check_invariants());
    }

    #[test]
    fn test_wide_split_by_clip_degrades() {
        let mut fb = fb(6, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.push_clip(Rect::new(0, 0, 3, 1)).unwrap();
        // Continuation would land at x=3, outside the clip.
        p.put_grapheme(2, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        drop(p);
        assert_eq!(fb.cell(2, 0).unwrap().glyph(), "\u{FFFD}");
        assert_eq!(fb.cell(3, 0).unwrap().glyph(), " ");
    }

    #[test]
    fn test_unsafe_bytes_replaced() {
        let mut fb = fb(4, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(0, 0, b"\x1b", 1, &Style::DEFAULT);
        p.put_grapheme(1, 0, &[0xFF, 0xFE], 1, &Style::DEFAULT);
        drop(p);
        assert_eq!(fb.cell(0, 0).unwrap().glyph(), "\u{FFFD}");
        assert_eq!(fb.cell(1, 0).unwrap().glyph(), "\u{FFFD}");
    }

    #[test]
    fn test_empty_grapheme_is_space() {
        let mut fb = fb(2, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(0, 0, b"", 2, &Style::DEFAULT);
        drop(p);
        assert_eq!(fb.cell(0, 0).unwrap().glyph(), " ");
        assert_eq!(fb.cell(0, 0).unwrap().width(), 1);
    }

    #[test]
    fn test_draw_text_advances_past_clip() {
        let mut fb = fb(10, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.push_clip(Rect::new(0, 0, 2, 1)).unwrap();
        let end = p.draw_text(0, 0, b"hello", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        assert_eq!(end, 5); // logical advance unaffected by clipping
        drop(p);
        assert_eq!(row_string(&fb, 0), "he        ");
    }

    #[test]
    fn test_draw_text_wide_mix() {
        let mut fb = fb(8, 1);
        let mut p = Painter::new(&mut fb, 8);
        let end = p.draw_text(0, 0, "a漢b".as_bytes(), &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        assert_eq!(end, 4);
        drop(p);
        assert_eq!(fb.cell(0, 0).unwrap().glyph(), "a");
        assert_eq!(fb.cell(1, 0).unwrap().glyph(), "漢");
        assert!(fb.cell(2, 0).unwrap().is_continuation());
        assert_eq!(fb.cell(3, 0).unwrap().glyph(), "b");
    }

    #[test]
    fn test_draw_text_tab_expansion() {
        let mut fb = fb(10, 1);
        let mut p = Painter::new(&mut fb, 8);
        let end = p.draw_text(1, 0, b"a\tb", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        // 'a' at 1, tab expands to stop 4, 'b' at 4.
        assert_eq!(end, 5);
        drop(p);
        assert_eq!(row_string(&fb, 0), " a  b     ");
    }

    #[test]
    fn test_draw_text_invalid_utf8_replacement() {
        let mut fb = fb(6, 1);
        let mut p = Painter::new(&mut fb, 8);
        let end = p.draw_text(0, 0, b"a\xFFb", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        assert_eq!(end, 3);
        drop(p);
        assert_eq!(fb.cell(1, 0).unwrap().glyph(), "\u{FFFD}");
        assert_eq!(fb.cell(2, 0).unwrap().glyph(), "b");
    }

    #[test]
    fn test_fill_rect_clipped() {
        let mut fb = fb(6, 3);
        let style = Style::DEFAULT.with_bg(Rgb::new(10, 20, 30));
        let mut p = Painter::new(&mut fb, 8);
        p.push_clip(Rect::new(1, 1, 3, 1)).unwrap();
        p.fill_rect(Rect::new(0, 0, 6, 3), &style);
        drop(p);
        assert_eq!(fb.cell(1, 1).unwrap().style().bg, Rgb::new(10, 20, 30));
        assert_eq!(fb.cell(0, 0).unwrap().style().bg, Rgb::BLACK);
        assert_eq!(fb.cell(4, 1).unwrap().style().bg, Rgb::BLACK);
    }

    #[test]
    fn test_fill_rect_splits_wide_glyph() {
        let mut fb = fb(6, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(1, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        // Fill covering only the continuation column.
        p.fill_rect(Rect::new(2, 0, 2, 1), &Style::DEFAULT);
        drop(p);
        assert_eq!(fb.cell(1, 0).unwrap().glyph(), " ");
        assert!(fb.check_invariants());
    }

    #[test]
    fn test_clip_stack_depth() {
        let mut fb = fb(4, 4);
        let mut p = Painter::new(&mut fb, 2);
        assert!(p.push_clip(Rect::new(0, 0, 3, 3)).is_ok());
        assert!(p.push_clip(Rect::new(0, 0, 2, 2)).is_ok());
        assert!(matches!(
            p.push_clip(Rect::new(0, 0, 1, 1)),
            Err(Error::Limit(_))
        ));
        assert!(p.pop_clip().is_ok());
        assert!(p.pop_clip().is_ok());
        assert!(matches!(p.pop_clip(), Err(Error::Limit(_))));
    }

    #[test]
    fn test_clip_intersects_with_parent() {
        let mut fb = fb(10, 10);
        let mut p = Painter::new(&mut fb, 8);
        p.push_clip(Rect::new(2, 2, 6, 6)).unwrap();
        p.push_clip(Rect::new(0, 0, 4, 4)).unwrap();
        assert_eq!(p.clip(), Rect::new(2, 2, 2, 2));
    }

    #[test]
    fn test_blit_non_overlapping() {
        let mut fb = fb(8, 2);
        let mut p = Painter::new(&mut fb, 8);
        p.draw_text(0, 0, b"ab", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        p.blit_rect(Rect::new(0, 0, 2, 1), 4, 1);
        drop(p);
        assert_eq!(fb.cell(4, 1).unwrap().glyph(), "a");
        assert_eq!(fb.cell(5, 1).unwrap().glyph(), "b");
    }

    #[test]
    fn test_blit_overlapping_right() {
        let mut fb = fb(8, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.draw_text(0, 0, b"abcd", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        // Shift right by 2 with overlap.
        p.blit_rect(Rect::new(0, 0, 4, 1), 2, 0);
        drop(p);
        assert_eq!(row_string(&fb, 0), "ababcd  ");
    }

    #[test]
    fn test_blit_overlapping_down() {
        let mut fb = fb(3, 3);
        let mut p = Painter::new(&mut fb, 8);
        p.draw_text(0, 0, b"x", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        p.draw_text(0, 1, b"y", &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
        p.blit_rect(Rect::new(0, 0, 3, 2), 0, 1);
        drop(p);
        assert_eq!(fb.cell(0, 1).unwrap().glyph(), "x");
        assert_eq!(fb.cell(0, 2).unwrap().glyph(), "y");
    }

    #[test]
    fn test_blit_carries_wide_glyphs() {
        let mut fb = fb(8, 1);
        let mut p = Painter::new(&mut fb, 8);
        p.put_grapheme(0, 0, "漢".as_bytes(), 2, &Style::DEFAULT);
        p.blit_rect(Rect::new(0, 0, 2, 1), 4, 0);
        drop(p);
        assert_eq!(fb.cell(4, 0).unwrap().glyph(), "漢");
        assert!(fb.cell(5, 0).unwrap().is_continuation());
        assert!(fb.check_invariants());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Put { x: i32, y: i32, glyph: String },
        Text { x: i32, y: i32, text: String },
        Fill { rect: Rect },
        Blit { src: Rect, dx: i32, dy: i32 },
        Push { rect: Rect },
        Pop,
    }

    fn glyph_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("a".to_string()),
            Just("Z".to_string()),
            Just(" ".to_string()),
            Just("é".to_string()),
            Just("漢".to_string()),
            Just("日".to_string()),
        ]
    }

    fn rect_strategy(cols: i32, rows: i32) -> impl Strategy<Value = Rect> {
        (
            -2..cols + 2,
            -2..rows + 2,
            0..cols + 2,
            0..rows + 2,
        )
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    fn op_strategy(cols: i32, rows: i32) -> impl Strategy<Value = Op> {
        prop_oneof![
            ((-2..cols + 2), (-1..rows + 1), glyph_strategy())
                .prop_map(|(x, y, glyph)| Op::Put { x, y, glyph }),
            ((-2..cols + 2), (-1..rows + 1), "[a-z漢 ]{0,8}")
                .prop_map(|(x, y, text)| Op::Text { x, y, text }),
            rect_strategy(cols, rows).prop_map(|rect| Op::Fill { rect }),
            (rect_strategy(cols, rows), -2..cols + 2, -1..rows + 1)
                .prop_map(|(src, dx, dy)| Op::Blit { src, dx, dy }),
            rect_strategy(cols, rows).prop_map(|rect| Op::Push { rect }),
            Just(Op::Pop),
        ]
    }

    fn apply(p: &mut Painter<'_>, op: &Op) {
        match op {
            Op::Put { x, y, glyph } => {
                let w = crate::unicode::grapheme_width(glyph, WidthPolicy::EmojiNarrow) as u8;
                p.put_grapheme(*x, *y, glyph.as_bytes(), w, &Style::DEFAULT);
            }
            Op::Text { x, y, text } => {
                p.draw_text(*x, *y, text.as_bytes(), &Style::DEFAULT, WidthPolicy::EmojiNarrow, 4);
            }
            Op::Fill { rect } => p.fill_rect(*rect, &Style::DEFAULT),
            Op::Blit { src, dx, dy } => p.blit_rect(*src, *dx, *dy),
            Op::Push { rect } => {
                let _ = p.push_clip(*rect);
            }
            Op::Pop => {
                let _ = p.pop_clip();
            }
        }
    }

    proptest! {
        /// Wide-glyph continuation invariants hold after every drawing op.
        #[test]
        fn continuation_invariants_hold(
            cols in 2i32..14,
            rows in 1i32..6,
            ops in prop::collection::vec(op_strategy(12, 5), 1..40),
        ) {
            let mut fb = FrameBuffer::new(cols, rows).unwrap();
            let mut painter = Painter::new(&mut fb, 8);
            for op in &ops {
                apply(&mut painter, op);
                prop_assert!(painter.fb().check_invariants(), "after {op:?}");
            }
        }

        /// No drawing op writes outside the clip, except the single-neighbor
        /// wide-glyph repair.
        #[test]
        fn clip_confines_writes(
            clip in rect_strategy(10, 5),
            ops in prop::collection::vec(op_strategy(10, 5), 1..20),
        ) {
            let mut fb = FrameBuffer::new(10, 5).unwrap();
            let mut painter = Painter::new(&mut fb, 8);
            painter.push_clip(clip).unwrap();
            let clip = painter.clip();
            let before: Vec<Cell> = painter.fb().cells().to_vec();
            for op in &ops {
                if matches!(op, Op::Push { .. } | Op::Pop) {
                    continue;
                }
                apply(&mut painter, op);
            }
            let after: Vec<Cell> = painter.fb().cells().to_vec();
            for y in 0..5i32 {
                for x in 0..10i32 {
                    let idx = (y * 10 + x) as usize;
                    if before[idx] == after[idx] || clip.contains(x, y) {
                        continue;
                    }
                    // The locked exception: one immediate horizontal
                    // neighbor of an in-clip cell may be repaired.
                    let adjacent_in_clip =
                        clip.contains(x - 1, y) || clip.contains(x + 1, y);
                    prop_assert!(
                        adjacent_in_clip,
                        "out-of-clip write at ({x},{y}) not adjacent to clip"
                    );
                    // And the repair only ever produces a space.
                    prop_assert_eq!(after[idx].glyph(), " ");
                }
            }
        }
    }
}
