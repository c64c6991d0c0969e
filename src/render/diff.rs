//! Diff renderer: minimal VT bytes transforming the previous frame into the
//! next one.
//!
//! The pipeline per present: row hashes narrow the search, a scroll plan may
//! convert a vertical shift into DECSTBM + SU/SD, then dirty rows emit cell
//! spans either by sweeping rows or through a coalesced damage-rect list.
//! Styles are downgraded to the terminal's capabilities before comparison,
//! so the emitted bytes are a pure function of (prev, next, caps, state).
//!
//! On any failure the output buffer is cleared and the terminal-state cache
//! restored; not a single byte of a failed present reaches the platform.

use super::caps::{resolve_color, ResolvedColor, TermCaps};
use super::seq::{SeqBuffer, SgrParams};
use super::state::{CursorState, TermState};
use crate::buffer::{Attrs, Cell, Fnv64, FrameBuffer};
use crate::drawlist::wire::CursorShape;
use crate::error::{Error, Result};
use crate::limits::Limits;

/// Scroll detection scans deltas up to this many rows.
const SCROLL_MAX_DELTA: i32 = 64;
/// A scroll plan must move at least this many dirty lines...
const SCROLL_MIN_LINES: i32 = 4;
/// ...or save at least this many cells, or it is rejected.
const SCROLL_MIN_CELLS: i64 = 256;
/// Damage emission switches to the indexed walk above this many rects.
const INDEXED_WALK_MIN_RECTS: usize = 8;
/// Link-list terminator for damage rects.
const LINK_NONE: u32 = u32::MAX;

/// Emission strategy chosen for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffPath {
    /// Nothing dirty; no cell bytes emitted.
    #[default]
    None,
    /// Row sweep over dirty rows.
    Sweep,
    /// Coalesced damage rectangles.
    Damage,
}

/// Per-present statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Rows with at least one differing cell (including exposed rows).
    pub dirty_lines: u32,
    /// Cells that differ between prev and next.
    pub dirty_cells: u64,
    /// Damage rectangles built (damage path only).
    pub damage_rects: u32,
    /// Cells covered by damage rectangles.
    pub damage_cells: u64,
    /// True when the damage cap forced a full-frame redraw.
    pub full_frame: bool,
    /// Bytes produced this present.
    pub bytes_emitted: u64,
    /// 1 when scroll detection ran.
    pub scroll_attempted: u32,
    /// 1 when a scroll plan was applied.
    pub scroll_hit: u32,
    /// Hash-equal rows that an exact compare proved different.
    pub collision_hits: u32,
    /// Strategy used.
    pub path: DiffPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    Clean,
    Dirty,
    /// Covered by the scroll plan; already correct on screen.
    Skip,
    /// Newly exposed by the scroll; redrawn full-width.
    Exposed,
}

#[derive(Debug, Clone, Copy)]
struct RowDirt {
    x0: i32,
    x1: i32,
    cells: u32,
}

#[derive(Debug, Clone, Copy)]
struct DamageRect {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    /// Spare field threaded into per-row lists during the indexed walk.
    link: u32,
}

#[derive(Debug, Clone, Copy)]
struct ScrollPlan {
    up: bool,
    delta: i32,
    top: i32,
    bottom: i32,
    moved_lines: i32,
    moved_cells: i64,
}

impl ScrollPlan {
    /// Plan ordering: most moved cells, most moved lines, smallest delta,
    /// smallest top, smallest bottom, up before down.
    fn better_than(&self, other: &Self) -> bool {
        (
            self.moved_cells,
            self.moved_lines,
            -self.delta,
            -self.top,
            -self.bottom,
            self.up,
        ) > (
            other.moved_cells,
            other.moved_lines,
            -other.delta,
            -other.top,
            -other.bottom,
            other.up,
        )
    }
}

/// Reusable scratch plus the row-hash cache carried across frames.
#[derive(Debug, Default)]
pub struct DiffRenderer {
    prev_hashes: Vec<u64>,
    next_hashes: Vec<u64>,
    prev_hashes_valid: bool,
    row_state: Vec<RowState>,
    row_dirt: Vec<Option<RowDirt>>,
    rects: Vec<DamageRect>,
    row_heads: Vec<u32>,
}

impl DiffRenderer {
    /// Fresh renderer with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the prev-hash cache (after resize or any external change to
    /// what is on screen).
    pub fn invalidate(&mut self) {
        self.prev_hashes_valid = false;
    }

    /// Adopt the just-rendered frame's hashes as the previous frame's.
    /// Call after the present's buffer swap.
    pub fn commit_hashes(&mut self) {
        std::mem::swap(&mut self.prev_hashes, &mut self.next_hashes);
        self.prev_hashes_valid = true;
    }

    fn prepare(&mut self, rows: usize) {
        if self.prev_hashes.len() != rows {
            self.prev_hashes.resize(rows, 0);
            self.next_hashes.resize(rows, 0);
            self.prev_hashes_valid = false;
        }
        self.row_state.clear();
        self.row_state.resize(rows, RowState::Clean);
        self.row_dirt.clear();
        self.row_dirt.resize(rows, None);
        self.rects.clear();
        self.row_heads.clear();
        self.row_heads.resize(rows, LINK_NONE);
    }

    /// Render the transition `prev -> next` into `out`.
    ///
    /// On success `state` reflects everything emitted; on failure `state`
    /// is restored, `out` is cleared, and nothing may be written to the
    /// terminal.
    #[allow(clippy::too_many_lines, clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        prev: &FrameBuffer,
        next: &FrameBuffer,
        caps: &TermCaps,
        state: &mut TermState,
        cursor: Option<&CursorState>,
        limits: &Limits,
        out: &mut SeqBuffer,
    ) -> Result<DiffStats> {
        if prev.cols() != next.cols() || prev.rows() != next.rows() {
            out.reset();
            return Err(Error::InvalidArgument("framebuffer shape mismatch"));
        }
        let cols = next.cols();
        let rows = next.rows();
        let saved_state = state.clone();
        out.reset();
        let mut stats = DiffStats::default();

        self.prepare(rows as usize);

        // Row cache: FNV-1a per row, prev side reused across frames.
        if !self.prev_hashes_valid {
            for y in 0..rows {
                self.prev_hashes[y as usize] = row_hash(prev, y);
            }
            self.prev_hashes_valid = true;
        }
        for y in 0..rows {
            self.next_hashes[y as usize] = row_hash(next, y);
        }

        // Classify rows. Hash-equal rows still get the exact compare as a
        // collision guard.
        for y in 0..rows {
            let yu = y as usize;
            let hashes_equal = self.prev_hashes[yu] == self.next_hashes[yu];
            if hashes_equal && prev.row(y) == next.row(y) {
                continue;
            }
            match scan_row(prev.row(y), next.row(y)) {
                Some(dirt) => {
                    if hashes_equal {
                        stats.collision_hits += 1;
                    }
                    self.row_state[yu] = RowState::Dirty;
                    self.row_dirt[yu] = Some(dirt);
                }
                None => {
                    debug_assert!(hashes_equal, "hash mismatch on equal rows");
                }
            }
        }

        // Scroll-region optimization.
        if caps.scroll_region && rows >= 2 {
            stats.scroll_attempted = 1;
            if let Some(plan) = self.find_scroll(prev, next, cols, rows) {
                stats.scroll_hit = 1;
                out.decstbm(plan.top as u32 + 1, plan.bottom as u32 + 1);
                if plan.up {
                    out.scroll_up(plan.delta as u32);
                } else {
                    out.scroll_down(plan.delta as u32);
                }
                out.decstbm_reset();
                // DECSTBM homes the cursor.
                state.cursor_valid = false;

                let (skip_lo, skip_hi, exp_lo, exp_hi) = if plan.up {
                    (
                        plan.top,
                        plan.bottom - plan.delta,
                        plan.bottom - plan.delta + 1,
                        plan.bottom,
                    )
                } else {
                    (
                        plan.top + plan.delta,
                        plan.bottom,
                        plan.top,
                        plan.top + plan.delta - 1,
                    )
                };
                for y in skip_lo..=skip_hi {
                    self.row_state[y as usize] = RowState::Skip;
                    self.row_dirt[y as usize] = None;
                }
                // Exposed lines are redrawn full-width right behind the
                // scroll emission.
                for y in exp_lo..=exp_hi {
                    self.row_state[y as usize] = RowState::Exposed;
                    self.row_dirt[y as usize] = None;
                    self.emit_full_row(next, y, cols, caps, state, out);
                    stats.dirty_lines += 1;
                    stats.dirty_cells += cols as u64;
                }
                for y in exp_lo..=exp_hi {
                    self.row_state[y as usize] = RowState::Skip;
                }
            }
        }

        // Tally and pick the emission path.
        let mut dirty_rows = 0i32;
        for y in 0..rows as usize {
            if self.row_state[y] == RowState::Dirty {
                dirty_rows += 1;
                let dirt = self.row_dirt[y].expect("dirty row has dirt");
                stats.dirty_lines += 1;
                stats.dirty_cells += u64::from(dirt.cells);
            }
        }

        if dirty_rows > 0 {
            let mut threshold = 35i64;
            if cols >= 120 {
                threshold = 30;
            }
            if rows <= 12 {
                threshold = 45;
            }
            if i64::from(dirty_rows) * 4 >= i64::from(rows) * 3 {
                threshold = 25;
            }
            let sweep = i64::from(dirty_rows) * 100 >= threshold * i64::from(rows);

            if sweep {
                stats.path = DiffPath::Sweep;
                for y in 0..rows {
                    if self.row_state[y as usize] == RowState::Dirty {
                        self.emit_row_spans(prev, next, y, 0, cols - 1, cols, caps, state, out);
                    }
                }
            } else {
                stats.path = DiffPath::Damage;
                if self.build_damage(rows, limits) {
                    stats.damage_rects = self.rects.len() as u32;
                    stats.damage_cells = self
                        .rects
                        .iter()
                        .map(|r| {
                            u64::from((r.x1 - r.x0 + 1) as u32) * u64::from((r.y1 - r.y0 + 1) as u32)
                        })
                        .sum();
                    if self.rects.len() > INDEXED_WALK_MIN_RECTS {
                        self.emit_damage_indexed(prev, next, cols, rows, caps, state, out);
                    } else {
                        self.emit_damage_rows(prev, next, cols, caps, state, out);
                    }
                } else {
                    // Damage cap exceeded: full-frame fallback.
                    stats.full_frame = true;
                    for y in 0..rows {
                        if self.row_state[y as usize] != RowState::Skip {
                            self.emit_full_row(next, y, cols, caps, state, out);
                        }
                    }
                }
            }
        }

        // Desired-cursor commit.
        if let Some(c) = cursor {
            if caps.cursor_shape && state.shape != Some((c.shape, c.blink)) {
                out.cursor_shape(shape_ps(c.shape, c.blink));
                state.shape = Some((c.shape, c.blink));
            }
            if c.x >= 0 && c.y >= 0 {
                let x = c.x.clamp(0, cols - 1);
                let y = c.y.clamp(0, rows - 1);
                if !(state.cursor_valid && state.cursor_x == x && state.cursor_y == y) {
                    out.cup(y as u32 + 1, x as u32 + 1);
                    state.cursor_x = x;
                    state.cursor_y = y;
                    state.cursor_valid = true;
                }
            }
            if state.visible != Some(c.visible) {
                if c.visible {
                    out.cursor_show();
                } else {
                    out.cursor_hide();
                }
                state.visible = Some(c.visible);
            }
        }

        if out.truncated() {
            *state = saved_state;
            out.reset();
            return Err(Error::Limit("present output exceeds out_max_bytes_per_frame"));
        }
        stats.bytes_emitted = out.len() as u64;
        Ok(stats)
    }

    /// Scan every delta and direction for the best contiguous run where
    /// `next[y] == prev[y +/- d]`.
    fn find_scroll(
        &self,
        prev: &FrameBuffer,
        next: &FrameBuffer,
        cols: i32,
        rows: i32,
    ) -> Option<ScrollPlan> {
        let max_d = (rows - 1).min(SCROLL_MAX_DELTA);
        let mut best: Option<ScrollPlan> = None;

        let mut consider = |plan: ScrollPlan| {
            if plan.moved_lines < SCROLL_MIN_LINES && plan.moved_cells < SCROLL_MIN_CELLS {
                return;
            }
            if best.is_none() || plan.better_than(best.as_ref().unwrap()) {
                best = Some(plan);
            }
        };

        for d in 1..=max_d {
            for up in [true, false] {
                let (lo, hi) = if up { (0, rows - d) } else { (d, rows) };
                let mut run_start: Option<i32> = None;
                let mut run_moved = 0i32;
                for y in lo..=hi {
                    let matched = y < hi && {
                        let py = if up { y + d } else { y - d };
                        self.next_hashes[y as usize] == self.prev_hashes[py as usize]
                            && next.row(y) == prev.row(py)
                    };
                    if matched {
                        if run_start.is_none() {
                            run_start = Some(y);
                            run_moved = 0;
                        }
                        // Only rows that would otherwise be redrawn count
                        // as saved.
                        if self.row_state[y as usize] == RowState::Dirty {
                            run_moved += 1;
                        }
                    } else if let Some(s) = run_start.take() {
                        let e = y - 1;
                        let plan = if up {
                            ScrollPlan {
                                up,
                                delta: d,
                                top: s,
                                bottom: e + d,
                                moved_lines: run_moved,
                                moved_cells: i64::from(run_moved) * i64::from(cols),
                            }
                        } else {
                            ScrollPlan {
                                up,
                                delta: d,
                                top: s - d,
                                bottom: e,
                                moved_lines: run_moved,
                                moved_cells: i64::from(run_moved) * i64::from(cols),
                            }
                        };
                        consider(plan);
                    }
                }
            }
        }
        best
    }

    /// Coalesce dirty-row extents into rects. Returns false when the cap is
    /// exceeded.
    fn build_damage(&mut self, rows: i32, limits: &Limits) -> bool {
        self.rects.clear();
        for y in 0..rows {
            let yu = y as usize;
            if self.row_state[yu] != RowState::Dirty {
                continue;
            }
            let dirt = self.row_dirt[yu].expect("dirty row has dirt");
            if let Some(last) = self.rects.last_mut() {
                if last.y1 == y - 1 && dirt.x0 <= last.x1 && last.x0 <= dirt.x1 {
                    last.x0 = last.x0.min(dirt.x0);
                    last.x1 = last.x1.max(dirt.x1);
                    last.y1 = y;
                    continue;
                }
            }
            if self.rects.len() >= limits.diff_max_damage_rects as usize {
                return false;
            }
            self.rects.push(DamageRect {
                x0: dirt.x0,
                y0: y,
                x1: dirt.x1,
                y1: y,
                link: LINK_NONE,
            });
        }
        true
    }

    /// Damage emission, small rect counts: iterate rects, scanning each
    /// rect's rows.
    #[allow(clippy::too_many_arguments)]
    fn emit_damage_rows(
        &mut self,
        prev: &FrameBuffer,
        next: &FrameBuffer,
        cols: i32,
        caps: &TermCaps,
        state: &mut TermState,
        out: &mut SeqBuffer,
    ) {
        let rects = std::mem::take(&mut self.rects);
        for rect in &rects {
            for y in rect.y0..=rect.y1 {
                self.emit_row_spans(prev, next, y, rect.x0, rect.x1, cols, caps, state, out);
            }
        }
        self.rects = rects;
    }

    /// Damage emission, large rect counts: an indexed walk threading
    /// per-row linked lists through each rect's spare link field. Rects
    /// activate at their top row and drop out at their bottom row.
    #[allow(clippy::too_many_arguments)]
    fn emit_damage_indexed(
        &mut self,
        prev: &FrameBuffer,
        next: &FrameBuffer,
        cols: i32,
        rows: i32,
        caps: &TermCaps,
        state: &mut TermState,
        out: &mut SeqBuffer,
    ) {
        let mut rects = std::mem::take(&mut self.rects);
        // Chain rects off their top row.
        for i in (0..rects.len()).rev() {
            let y0 = rects[i].y0 as usize;
            rects[i].link = self.row_heads[y0];
            self.row_heads[y0] = i as u32;
        }

        let mut active = LINK_NONE;
        for y in 0..rows {
            // Activate rects starting here.
            let mut i = self.row_heads[y as usize];
            while i != LINK_NONE {
                let next_start = rects[i as usize].link;
                rects[i as usize].link = active;
                active = i;
                i = next_start;
            }
            // Walk the active list, unlinking rects past their bottom row.
            let mut cur = active;
            let mut prev_link: Option<u32> = None;
            while cur != LINK_NONE {
                let rect = rects[cur as usize];
                self.emit_row_spans(prev, next, y, rect.x0, rect.x1, cols, caps, state, out);
                let following = rect.link;
                if rect.y1 == y {
                    match prev_link {
                        Some(p) => rects[p as usize].link = following,
                        None => active = following,
                    }
                } else {
                    prev_link = Some(cur);
                }
                cur = following;
            }
        }
        self.rects = rects;
    }

    /// Emit the dirty spans of row `y` within `[xa, xb]`.
    #[allow(clippy::too_many_arguments)]
    fn emit_row_spans(
        &self,
        prev: &FrameBuffer,
        next: &FrameBuffer,
        y: i32,
        xa: i32,
        xb: i32,
        cols: i32,
        caps: &TermCaps,
        state: &mut TermState,
        out: &mut SeqBuffer,
    ) {
        let prow = prev.row(y);
        let nrow = next.row(y);
        let mut x = xa.max(0);
        let xb = xb.min(cols - 1);
        while x <= xb {
            if !dirty_at(prow, nrow, x as usize) {
                x += 1;
                continue;
            }
            let mut start = x;
            while x <= xb && dirty_at(prow, nrow, x as usize) {
                x += 1;
            }
            let mut end = x - 1;
            // Never split a wide glyph: pull the lead in on the left, the
            // continuation in on the right.
            if nrow[start as usize].is_continuation() && start > 0 {
                start -= 1;
            }
            if nrow[end as usize].is_wide() && end + 1 < cols {
                end += 1;
            }
            for cx in start..=end {
                self.emit_cell(&nrow[cx as usize], cx, y, cols, caps, state, out);
            }
        }
    }

    /// Emit every cell of row `y` (exposed lines and full-frame fallback).
    fn emit_full_row(
        &self,
        next: &FrameBuffer,
        y: i32,
        cols: i32,
        caps: &TermCaps,
        state: &mut TermState,
        out: &mut SeqBuffer,
    ) {
        let nrow = next.row(y);
        for x in 0..cols {
            self.emit_cell(&nrow[x as usize], x, y, cols, caps, state, out);
        }
    }

    /// One cell: CUP when the cursor is elsewhere, an SGR delta, glyph
    /// bytes. Continuations emit nothing; the lead already advanced the
    /// cursor over them.
    #[allow(clippy::too_many_arguments)]
    fn emit_cell(
        &self,
        cell: &Cell,
        x: i32,
        y: i32,
        cols: i32,
        caps: &TermCaps,
        state: &mut TermState,
        out: &mut SeqBuffer,
    ) {
        if cell.is_continuation() {
            return;
        }
        if !(state.cursor_valid && state.cursor_x == x && state.cursor_y == y) {
            out.cup(y as u32 + 1, x as u32 + 1);
            state.cursor_x = x;
            state.cursor_y = y;
            state.cursor_valid = true;
        }
        emit_style_delta(caps, state, cell, out);
        let glyph = cell.glyph_bytes();
        if glyph.is_empty() {
            out.push_bytes(b" ");
        } else {
            out.push_bytes(glyph);
        }
        state.cursor_x += i32::from(cell.width().max(1));
        if state.cursor_x >= cols {
            // Wrap behavior is terminal-specific; drop the cached position.
            state.cursor_valid = false;
        }
    }
}

fn row_hash(fb: &FrameBuffer, y: i32) -> u64 {
    let mut h = Fnv64::new();
    for cell in fb.row(y) {
        cell.hash_into(&mut h);
    }
    h.finish()
}

/// Dirty test for one position: the cells differ, or the right neighbor is
/// a continuation that differs (repainting the lead repaints its pair).
#[inline]
fn dirty_at(prow: &[Cell], nrow: &[Cell], x: usize) -> bool {
    if prow[x] != nrow[x] {
        return true;
    }
    let xr = x + 1;
    xr < nrow.len()
        && (nrow[xr].is_continuation() || prow[xr].is_continuation())
        && prow[xr] != nrow[xr]
}

/// Per-row dirty summary: extent by the span rule, differing-cell count.
fn scan_row(prow: &[Cell], nrow: &[Cell]) -> Option<RowDirt> {
    let mut cells = 0u32;
    let mut x0 = i32::MAX;
    let mut x1 = i32::MIN;
    for x in 0..nrow.len() {
        if prow[x] != nrow[x] {
            cells += 1;
        }
        if dirty_at(prow, nrow, x) {
            x0 = x0.min(x as i32);
            x1 = x1.max(x as i32);
        }
    }
    if cells == 0 {
        None
    } else {
        Some(RowDirt { x0, x1, cells })
    }
}

const fn shape_ps(shape: CursorShape, blink: bool) -> u32 {
    let base = match shape {
        CursorShape::Block => 1,
        CursorShape::Underline => 3,
        CursorShape::Bar => 5,
    };
    if blink {
        base
    } else {
        base + 1
    }
}

/// Write the SGR delta from the cached style to the cell's style, both
/// downgraded to the terminal's capabilities first. A full reset is emitted
/// only when the style is unknown or an attribute must be cleared.
fn emit_style_delta(caps: &TermCaps, state: &mut TermState, cell: &Cell, out: &mut SeqBuffer) {
    let style = cell.style();
    let want_attrs = caps.downgrade_attrs(style.attrs);
    let want_fg = resolve_color(style.fg, caps.color_mode);
    let want_bg = resolve_color(style.bg, caps.color_mode);

    let mut params = SgrParams::new();
    if state.style_valid {
        let have_attrs = caps.downgrade_attrs(state.style.attrs);
        let removed = have_attrs.difference(want_attrs);
        if removed.is_empty() {
            push_attr_params(&mut params, want_attrs.difference(have_attrs));
            if resolve_color(state.style.fg, caps.color_mode) != want_fg {
                push_color_params(&mut params, want_fg, true);
            }
            if resolve_color(state.style.bg, caps.color_mode) != want_bg {
                push_color_params(&mut params, want_bg, false);
            }
        } else {
            // Clearing any attribute requires the absolute reset.
            params.push(0);
            push_attr_params(&mut params, want_attrs);
            push_color_params(&mut params, want_fg, true);
            push_color_params(&mut params, want_bg, false);
        }
    } else {
        params.push(0);
        push_attr_params(&mut params, want_attrs);
        push_color_params(&mut params, want_fg, true);
        push_color_params(&mut params, want_bg, false);
    }

    out.sgr(&params);
    state.style = style;
    state.style_valid = true;
}

fn push_attr_params(params: &mut SgrParams, attrs: Attrs) {
    if attrs.contains(Attrs::BOLD) {
        params.push(1);
    }
    if attrs.contains(Attrs::ITALIC) {
        params.push(3);
    }
    if attrs.contains(Attrs::UNDERLINE) {
        params.push(4);
    }
    if attrs.contains(Attrs::REVERSE) {
        params.push(7);
    }
    if attrs.contains(Attrs::STRIKETHROUGH) {
        params.push(9);
    }
}

fn push_color_params(params: &mut SgrParams, color: ResolvedColor, is_fg: bool) {
    match color {
        ResolvedColor::Rgb(c) => {
            params.push(if is_fg { 38 } else { 48 });
            params.push(2);
            params.push(u32::from(c.r));
            params.push(u32::from(c.g));
            params.push(u32::from(c.b));
        }
        ResolvedColor::Idx256(n) => {
            params.push(if is_fg { 38 } else { 48 });
            params.push(5);
            params.push(u32::from(n));
        }
        ResolvedColor::Idx16(n) => {
            let code = if n < 8 {
                if is_fg {
                    30 + u32::from(n)
                } else {
                    40 + u32::from(n)
                }
            } else if is_fg {
                90 + u32::from(n - 8)
            } else {
                100 + u32::from(n - 8)
            };
            params.push(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Rgb, Style};
    use crate::unicode::WidthPolicy;

    fn fb(cols: i32, rows: i32) -> FrameBuffer {
        FrameBuffer::new(cols, rows).unwrap()
    }

    fn put(fbuf: &mut FrameBuffer, x: i32, y: i32, s: &str, style: Style) {
        let mut p = crate::buffer::Painter::new(fbuf, 8);
        let w = crate::unicode::grapheme_width(s, WidthPolicy::EmojiNarrow) as u8;
        p.put_grapheme(x, y, s.as_bytes(), w, &style);
    }

    struct Rig {
        renderer: DiffRenderer,
        state: TermState,
        limits: Limits,
        out: SeqBuffer,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                renderer: DiffRenderer::new(),
                state: TermState::new(),
                limits: Limits::default(),
                out: SeqBuffer::new(1 << 20),
            }
        }

        fn render(
            &mut self,
            prev: &FrameBuffer,
            next: &FrameBuffer,
            caps: &TermCaps,
            cursor: Option<&CursorState>,
        ) -> Result<DiffStats> {
            self.renderer.render(
                prev,
                next,
                caps,
                &mut self.state,
                cursor,
                &self.limits,
                &mut self.out,
            )
        }
    }

    #[test]
    fn test_scenario_a_empty_to_empty() {
        // 3x2 all spaces both sides, cursor already synced: zero bytes.
        let prev = fb(3, 2);
        let next = fb(3, 2);
        let mut rig = Rig::new();
        rig.state.cursor_valid = true;
        rig.state.cursor_x = 0;
        rig.state.cursor_y = 0;
        rig.state.visible = Some(true);
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(rig.out.as_bytes(), b"");
        assert_eq!(stats.dirty_lines, 0);
        assert_eq!(stats.dirty_cells, 0);
        assert_eq!(stats.bytes_emitted, 0);
        assert_eq!(stats.path, DiffPath::None);
    }

    #[test]
    fn test_scenario_b_single_cell_rgb() {
        let prev = fb(3, 1);
        let mut next = fb(3, 1);
        let style = Style::DEFAULT
            .with_fg(Rgb::from_u32(0xFF0000))
            .with_bg(Rgb::from_u32(0x000000));
        put(&mut next, 1, 0, "A", style);
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(
            rig.out.as_bytes(),
            b"\x1b[1;2H\x1b[0;38;2;255;0;0;48;2;0;0;0mA"
        );
        assert_eq!(stats.dirty_lines, 1);
        assert_eq!(stats.dirty_cells, 1);
    }

    #[test]
    fn test_scenario_e_scroll_up_hit() {
        let cols = 80;
        let rows = 30;
        let mut prev = fb(cols, rows);
        for y in 0..rows {
            for x in 0..cols {
                let ch = char::from(b'A' + ((x + y * 7) % 26) as u8);
                let mut buf = [0u8; 4];
                put(&mut prev, x, y, ch.encode_utf8(&mut buf), Style::DEFAULT);
            }
        }
        let mut next = fb(cols, rows);
        next.copy_from(&prev);
        // Shift up by 3.
        for y in 0..rows - 3 {
            let src: Vec<Cell> = prev.row(y + 3).to_vec();
            for x in 0..cols {
                *next.cell_mut(x, y).unwrap() = src[x as usize];
            }
        }
        for y in rows - 3..rows {
            for x in 0..cols {
                put(&mut next, x, y, "z", Style::DEFAULT);
            }
        }
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.scroll_attempted, 1);
        assert_eq!(stats.scroll_hit, 1);
        let bytes = rig.out.as_bytes();
        let s = String::from_utf8_lossy(bytes);
        assert!(s.starts_with("\x1b[1;30r\x1b[3S\x1b[r"), "got {s:?}");
        // Exactly one DECSTBM pair.
        assert_eq!(s.matches("\x1b[1;30r").count(), 1);
        // Exposed rows redrawn.
        assert!(s.contains('z'));
    }

    #[test]
    fn test_scroll_disabled_by_caps() {
        let mut caps = TermCaps::full();
        caps.scroll_region = false;
        let mut prev = fb(80, 30);
        for y in 0..30 {
            put(&mut prev, 0, y, "x", Style::DEFAULT);
        }
        let next = fb(80, 30);
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &caps, None).unwrap();
        assert_eq!(stats.scroll_attempted, 0);
        assert_eq!(stats.scroll_hit, 0);
        assert!(!String::from_utf8_lossy(rig.out.as_bytes()).contains("\x1b[r"));
    }

    #[test]
    fn test_small_scroll_rejected() {
        // 3-line shift on a narrow frame: under both thresholds.
        let cols = 20;
        let rows = 5;
        let mut prev = fb(cols, rows);
        for y in 0..rows {
            for x in 0..cols {
                let ch = char::from(b'a' + ((x * 3 + y * 11) % 26) as u8);
                let mut buf = [0u8; 4];
                put(&mut prev, x, y, ch.encode_utf8(&mut buf), Style::DEFAULT);
            }
        }
        let mut next = fb(cols, rows);
        next.copy_from(&prev);
        for y in 0..rows - 2 {
            let src: Vec<Cell> = prev.row(y + 2).to_vec();
            for x in 0..cols {
                *next.cell_mut(x, y).unwrap() = src[x as usize];
            }
        }
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.scroll_hit, 0);
    }

    #[test]
    fn test_wide_glyph_span_expansion() {
        // Changing only the continuation-side style repaints the lead too.
        let mut prev = fb(6, 1);
        put(&mut prev, 2, 0, "漢", Style::DEFAULT);
        let mut next = fb(6, 1);
        put(&mut next, 2, 0, "漢", Style::DEFAULT.with_bg(Rgb::new(0, 0, 99)));
        let mut rig = Rig::new();
        rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        // One CUP at the lead column (x=2 -> col 3), then the glyph.
        assert!(s.contains("\x1b[1;3H"), "got {s:?}");
        assert_eq!(s.matches('漢').count(), 1);
    }

    #[test]
    fn test_adjacent_cells_single_cup() {
        let prev = fb(10, 1);
        let mut next = fb(10, 1);
        for (i, ch) in ["a", "b", "c"].iter().enumerate() {
            put(&mut next, i as i32, 0, ch, Style::DEFAULT);
        }
        let mut rig = Rig::new();
        rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        assert_eq!(s.matches("\x1b[1;1H").count(), 1);
        assert_eq!(s.matches('H').count(), 1, "one CUP for the run: {s:?}");
        assert!(s.contains("abc"));
    }

    #[test]
    fn test_sgr_delta_no_reset_on_additive_change() {
        let prev = fb(10, 1);
        let mut next = fb(10, 1);
        put(&mut next, 0, 0, "a", Style::DEFAULT);
        put(&mut next, 1, 0, "b", Style::DEFAULT.with_attrs(Attrs::BOLD));
        let mut rig = Rig::new();
        rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        // Exactly one reset (the initial unknown-state one).
        assert_eq!(s.matches("\x1b[0;").count(), 1, "{s:?}");
        // Bold added without reset.
        assert!(s.contains("\x1b[1m"), "{s:?}");
    }

    #[test]
    fn test_sgr_reset_on_attribute_clear() {
        let mut prev = fb(4, 1);
        put(&mut prev, 0, 0, "a", Style::DEFAULT.with_attrs(Attrs::BOLD));
        let mut next = fb(4, 1);
        put(&mut next, 0, 0, "b", Style::DEFAULT);
        let mut rig = Rig::new();
        // Make the cached style bold first.
        let warm = fb(4, 1);
        rig.render(&warm, &prev, &TermCaps::full(), None).unwrap();
        rig.renderer.invalidate();
        rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        // Clearing bold forces a reset-then-rebuild sequence.
        assert!(s.contains("\x1b[0;38;2;255;255;255;48;2;0;0;0m"), "{s:?}");
    }

    #[test]
    fn test_color_downgrade_256() {
        let mut caps = TermCaps::full();
        caps.color_mode = super::super::caps::ColorMode::Xterm256;
        let prev = fb(4, 1);
        let mut next = fb(4, 1);
        put(&mut next, 0, 0, "x", Style::DEFAULT.with_fg(Rgb::new(255, 0, 0)));
        let mut rig = Rig::new();
        rig.render(&prev, &next, &caps, None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        // 255,0,0 -> cube entry 196.
        assert!(s.contains(";38;5;196"), "{s:?}");
        assert!(!s.contains(";38;2;"), "{s:?}");
    }

    #[test]
    fn test_color_downgrade_16() {
        let caps = TermCaps::basic();
        let prev = fb(4, 1);
        let mut next = fb(4, 1);
        put(&mut next, 0, 0, "x", Style::DEFAULT.with_fg(Rgb::new(205, 0, 0)));
        let mut rig = Rig::new();
        rig.render(&prev, &next, &caps, None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        assert!(s.contains("\x1b[0;31;40m"), "{s:?}");
    }

    #[test]
    fn test_cells_equal_under_downgrade_still_emit() {
        // Two different RGB reds both quantize to palette red; the cells
        // differ at the data level so the glyph is re-emitted, but the SGR
        // stays at one sequence because the resolved colors match.
        let caps = TermCaps::basic();
        let mut prev = fb(4, 1);
        put(&mut prev, 0, 0, "x", Style::DEFAULT.with_fg(Rgb::new(204, 0, 0)));
        let mut next = fb(4, 1);
        put(&mut next, 0, 0, "x", Style::DEFAULT.with_fg(Rgb::new(205, 0, 0)));
        let mut rig = Rig::new();
        // Warm the style cache with prev's style.
        let warm = fb(4, 1);
        rig.render(&warm, &prev, &caps, None).unwrap();
        rig.renderer.invalidate();
        rig.render(&prev, &next, &caps, None).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        // No new SGR beyond cursor movement and glyph.
        assert!(!s.contains('m'), "{s:?}");
    }

    #[test]
    fn test_shape_mismatch_error() {
        let prev = fb(3, 2);
        let next = fb(4, 2);
        let mut rig = Rig::new();
        assert!(matches!(
            rig.render(&prev, &next, &TermCaps::full(), None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(rig.out.is_empty());
    }

    #[test]
    fn test_truncation_zeroes_outputs() {
        let prev = fb(40, 10);
        let mut next = fb(40, 10);
        for y in 0..10 {
            for x in 0..40 {
                put(&mut next, x, y, "q", Style::DEFAULT.with_fg(Rgb::new(1, 2, 3)));
            }
        }
        let mut rig = Rig::new();
        rig.out = SeqBuffer::new(16);
        let before = rig.state.clone();
        let err = rig.render(&prev, &next, &TermCaps::full(), None).unwrap_err();
        assert!(matches!(err, Error::Limit(_)));
        assert!(rig.out.is_empty());
        assert_eq!(rig.state, before);
    }

    #[test]
    fn test_cursor_commit_clamped() {
        let prev = fb(5, 3);
        let next = fb(5, 3);
        let cursor = CursorState {
            x: 99,
            y: 99,
            shape: CursorShape::Bar,
            visible: true,
            blink: false,
        };
        let mut rig = Rig::new();
        rig.render(&prev, &next, &TermCaps::full(), Some(&cursor)).unwrap();
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        assert!(s.contains("\x1b[6 q"), "{s:?}"); // bar, steady
        assert!(s.contains("\x1b[3;5H"), "{s:?}"); // clamped to 4,2 -> 1-based 3;5
        assert!(s.contains("\x1b[?25h"), "{s:?}");
    }

    #[test]
    fn test_cursor_visibility_idempotent() {
        let prev = fb(5, 3);
        let next = fb(5, 3);
        let cursor = CursorState {
            x: -1,
            y: -1,
            shape: CursorShape::Block,
            visible: true,
            blink: true,
        };
        let mut caps = TermCaps::full();
        caps.cursor_shape = false;
        let mut rig = Rig::new();
        rig.render(&prev, &next, &caps, Some(&cursor)).unwrap();
        assert_eq!(rig.out.as_bytes(), b"\x1b[?25h");
        rig.renderer.invalidate();
        rig.render(&prev, &next, &caps, Some(&cursor)).unwrap();
        assert_eq!(rig.out.as_bytes(), b"");
    }

    #[test]
    fn test_shape_gated_on_capability() {
        let prev = fb(5, 3);
        let next = fb(5, 3);
        let cursor = CursorState {
            x: 0,
            y: 0,
            shape: CursorShape::Bar,
            visible: true,
            blink: false,
        };
        let mut caps = TermCaps::full();
        caps.cursor_shape = false;
        let mut rig = Rig::new();
        rig.render(&prev, &next, &caps, Some(&cursor)).unwrap();
        assert!(!String::from_utf8_lossy(rig.out.as_bytes()).contains(" q"));
    }

    #[test]
    fn test_damage_path_for_sparse_change() {
        let prev = fb(80, 40);
        let mut next = fb(80, 40);
        put(&mut next, 10, 35, "x", Style::DEFAULT);
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.path, DiffPath::Damage);
        assert_eq!(stats.damage_rects, 1);
        assert_eq!(stats.damage_cells, 1);
    }

    #[test]
    fn test_sweep_path_for_dense_change() {
        let prev = fb(20, 20);
        let mut next = fb(20, 20);
        for y in 0..20 {
            put(&mut next, 0, y, "x", Style::DEFAULT);
        }
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.path, DiffPath::Sweep);
    }

    #[test]
    fn test_damage_cap_forces_full_frame() {
        let mut rig = Rig::new();
        rig.limits.diff_max_damage_rects = 2;
        let prev = fb(40, 30);
        let mut next = fb(40, 30);
        // Disjoint rows -> one rect each, exceeding the cap of 2; still
        // sparse enough to pick the damage path.
        for y in [2, 10, 20] {
            put(&mut next, 5, y, "x", Style::DEFAULT);
        }
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert!(stats.full_frame);
        assert_eq!(stats.path, DiffPath::Damage);
        assert!(String::from_utf8_lossy(rig.out.as_bytes()).contains('x'));
    }

    #[test]
    fn test_damage_rects_coalesce_vertically() {
        let prev = fb(80, 40);
        let mut next = fb(80, 40);
        for y in 5..8 {
            put(&mut next, 10, y, "x", Style::DEFAULT);
        }
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.damage_rects, 1);
        assert_eq!(stats.damage_cells, 3);
    }

    #[test]
    fn test_hash_cache_reused_across_frames() {
        let mut prev = fb(10, 4);
        let mut rig = Rig::new();
        let mut next = fb(10, 4);
        put(&mut next, 0, 0, "a", Style::DEFAULT);
        rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        rig.renderer.commit_hashes();
        // Simulate the engine swap.
        prev.copy_from(&next);
        let mut next2 = fb(10, 4);
        next2.copy_from(&prev);
        put(&mut next2, 1, 0, "b", Style::DEFAULT);
        let stats = rig.render(&prev, &next2, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.dirty_lines, 1);
        assert_eq!(stats.dirty_cells, 1);
    }

    #[test]
    fn test_model_terminal_round_trip_basic() {
        // Deterministic spot check of the property suite's oracle: apply
        // the emitted bytes to a vt100 model primed with prev.
        let mut prev = fb(12, 4);
        put(&mut prev, 0, 0, "o", Style::DEFAULT);
        put(&mut prev, 3, 2, "漢", Style::DEFAULT);
        let mut next = fb(12, 4);
        next.copy_from(&prev);
        put(&mut next, 3, 2, "x", Style::DEFAULT.with_fg(Rgb::new(0, 255, 0)));
        put(&mut next, 5, 1, "é", Style::DEFAULT);

        let mut caps = TermCaps::full();
        caps.scroll_region = false;
        let mut rig = Rig::new();
        rig.render(&prev, &next, &caps, None).unwrap();

        let mut model = vt100::Parser::new(4, 12, 0);
        model.process(&proptests::full_paint(&prev));
        model.process(rig.out.as_bytes());
        proptests::assert_model_eq(&model, &next);
    }

    #[test]
    fn test_indexed_walk_many_rects() {
        let prev = fb(120, 60);
        let mut next = fb(120, 60);
        // 12 disjoint dirty rows -> 12 rects -> indexed walk.
        for i in 0..12 {
            put(&mut next, (i * 3) % 100, i * 5, "x", Style::DEFAULT);
        }
        let mut rig = Rig::new();
        let stats = rig.render(&prev, &next, &TermCaps::full(), None).unwrap();
        assert_eq!(stats.path, DiffPath::Damage);
        assert_eq!(stats.damage_rects, 12);
        let s = String::from_utf8_lossy(rig.out.as_bytes());
        assert_eq!(s.matches('x').count(), 12);
    }
}
