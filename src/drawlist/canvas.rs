//! RGBA canvas blitters: map a pixel grid onto cells using block mosaics.
//!
//! Each blitter is a deterministic function of the pixel data and the
//! destination extent; no dithering, no randomness. Colors ride on the cell
//! style (foreground for lit sub-cells, background for unlit ones).

use super::wire::Blitter;
use crate::buffer::{Cell, Painter, Rgb, Style};

/// Quadrant mosaics indexed by lit-bit mask (TL=1, TR=2, BL=4, BR=8).
const QUADRANTS: [&str; 16] = [
    " ", "\u{2598}", "\u{259D}", "\u{2580}", "\u{2596}", "\u{258C}", "\u{259E}", "\u{259B}",
    "\u{2597}", "\u{259A}", "\u{2590}", "\u{259C}", "\u{2584}", "\u{2599}", "\u{259F}",
    "\u{2588}",
];

/// Braille dot bit for sub-cell (col, row) per U+2800 dot numbering.
const BRAILLE_BITS: [[u8; 4]; 2] = [[0x01, 0x02, 0x04, 0x40], [0x08, 0x10, 0x20, 0x80]];

/// Render `px_w x px_h` RGBA pixels into a `cols x rows` cell rect at
/// (x, y), clip-aware through the painter.
#[allow(clippy::too_many_arguments)]
pub fn draw_canvas(
    p: &mut Painter<'_>,
    x: i32,
    y: i32,
    cols: u32,
    rows: u32,
    px_w: u32,
    px_h: u32,
    rgba: &[u8],
    blitter: Blitter,
) {
    debug_assert_eq!(rgba.len(), px_w as usize * px_h as usize * 4);
    let sampler = Sampler {
        rgba,
        px_w,
        px_h,
    };
    match blitter {
        Blitter::HalfBlock => half_block(p, x, y, cols, rows, &sampler),
        Blitter::Quadrant => mosaic(p, x, y, cols, rows, &sampler, 2, 2, quadrant_cell),
        Blitter::Braille => mosaic(p, x, y, cols, rows, &sampler, 2, 4, braille_cell),
    }
}

struct Sampler<'a> {
    rgba: &'a [u8],
    px_w: u32,
    px_h: u32,
}

impl Sampler<'_> {
    /// Nearest-neighbor sample of the sub-cell grid position.
    fn at(&self, sx: u32, sy: u32, grid_w: u32, grid_h: u32) -> Rgb {
        let px = (u64::from(sx) * u64::from(self.px_w) / u64::from(grid_w)) as u32;
        let py = (u64::from(sy) * u64::from(self.px_h) / u64::from(grid_h)) as u32;
        let px = px.min(self.px_w - 1);
        let py = py.min(self.px_h - 1);
        let i = (py as usize * self.px_w as usize + px as usize) * 4;
        Rgb::new(self.rgba[i], self.rgba[i + 1], self.rgba[i + 2])
    }
}

#[inline]
fn luma(c: Rgb) -> u32 {
    (u32::from(c.r) * 299 + u32::from(c.g) * 587 + u32::from(c.b) * 114) / 1000
}

fn average(colors: &[Rgb]) -> Rgb {
    if colors.is_empty() {
        return Rgb::BLACK;
    }
    let n = colors.len() as u32;
    let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);
    for c in colors {
        r += u32::from(c.r);
        g += u32::from(c.g);
        b += u32::from(c.b);
    }
    Rgb::new((r / n) as u8, (g / n) as u8, (b / n) as u8)
}

fn half_block(p: &mut Painter<'_>, x: i32, y: i32, cols: u32, rows: u32, s: &Sampler<'_>) {
    for cy in 0..rows {
        for cx in 0..cols {
            let top = s.at(cx, 2 * cy, cols, rows * 2);
            let bottom = s.at(cx, 2 * cy + 1, cols, rows * 2);
            let style = Style::DEFAULT.with_fg(top).with_bg(bottom);
            if top == bottom {
                // Solid cell: a plain space with the color as background.
                p.put_grapheme(x + cx as i32, y + cy as i32, b" ", 1, &Style::DEFAULT.with_bg(top));
                continue;
            }
            p.put_grapheme(x + cx as i32, y + cy as i32, "\u{2580}".as_bytes(), 1, &style);
        }
    }
}

/// Generic sub-cell mosaic driver: `sub_w x sub_h` samples per cell, cell
/// glyph and colors picked by `pick`.
#[allow(clippy::too_many_arguments)]
fn mosaic(
    p: &mut Painter<'_>,
    x: i32,
    y: i32,
    cols: u32,
    rows: u32,
    s: &Sampler<'_>,
    sub_w: u32,
    sub_h: u32,
    pick: fn(&[Rgb]) -> (Cell, Style),
) {
    let mut samples = Vec::with_capacity((sub_w * sub_h) as usize);
    for cy in 0..rows {
        for cx in 0..cols {
            samples.clear();
            for sy in 0..sub_h {
                for sx in 0..sub_w {
                    samples.push(s.at(
                        cx * sub_w + sx,
                        cy * sub_h + sy,
                        cols * sub_w,
                        rows * sub_h,
                    ));
                }
            }
            let (cell, style) = pick(&samples);
            p.put_grapheme(x + cx as i32, y + cy as i32, cell.glyph_bytes(), 1, &style);
        }
    }
}

/// Samples arrive row-major (TL, TR, BL, BR).
fn quadrant_cell(samples: &[Rgb]) -> (Cell, Style) {
    let mean = average(samples);
    let threshold = luma(mean);
    let mut mask = 0usize;
    let mut lit = Vec::with_capacity(4);
    let mut unlit = Vec::with_capacity(4);
    for (i, &c) in samples.iter().enumerate() {
        if luma(c) > threshold {
            mask |= 1 << i;
            lit.push(c);
        } else {
            unlit.push(c);
        }
    }
    let style = Style::DEFAULT.with_fg(average(&lit)).with_bg(average(&unlit));
    (
        Cell::from_glyph(QUADRANTS[mask].as_bytes(), 1, style),
        style,
    )
}

/// Samples arrive row-major over a 2x4 dot grid.
fn braille_cell(samples: &[Rgb]) -> (Cell, Style) {
    let mut mask = 0u8;
    let mut lit = Vec::with_capacity(8);
    let mut unlit = Vec::with_capacity(8);
    for (i, &c) in samples.iter().enumerate() {
        let (sx, sy) = (i % 2, i / 2);
        if luma(c) > 127 {
            mask |= BRAILLE_BITS[sx][sy];
            lit.push(c);
        } else {
            unlit.push(c);
        }
    }
    let style = Style::DEFAULT.with_fg(average(&lit)).with_bg(average(&unlit));
    let ch = char::from_u32(0x2800 + u32::from(mask)).unwrap_or(' ');
    let mut buf = [0u8; 4];
    let glyph = ch.encode_utf8(&mut buf);
    (Cell::from_glyph(glyph.as_bytes(), 1, style), style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBuffer;

    fn solid(px_w: u32, px_h: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::with_capacity((px_w * px_h * 4) as usize);
        for _ in 0..px_w * px_h {
            out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        out
    }

    #[test]
    fn test_half_block_solid_color() {
        let mut fb = FrameBuffer::new(4, 2).unwrap();
        let mut p = Painter::new(&mut fb, 8);
        let rgba = solid(4, 4, [10, 20, 30]);
        draw_canvas(&mut p, 0, 0, 4, 2, 4, 4, &rgba, Blitter::HalfBlock);
        drop(p);
        // Uniform color collapses to background-colored spaces.
        let cell = fb.cell(0, 0).unwrap();
        assert_eq!(cell.glyph(), " ");
        assert_eq!(cell.style().bg, Rgb::new(10, 20, 30));
    }

    #[test]
    fn test_half_block_split_colors() {
        // Top half red, bottom half blue, one cell.
        let mut rgba = solid(1, 1, [255, 0, 0]);
        rgba.extend_from_slice(&[0, 0, 255, 255]);
        let mut fb = FrameBuffer::new(1, 1).unwrap();
        let mut p = Painter::new(&mut fb, 8);
        draw_canvas(&mut p, 0, 0, 1, 1, 1, 2, &rgba, Blitter::HalfBlock);
        drop(p);
        let cell = fb.cell(0, 0).unwrap();
        assert_eq!(cell.glyph(), "\u{2580}");
        assert_eq!(cell.style().fg, Rgb::new(255, 0, 0));
        assert_eq!(cell.style().bg, Rgb::new(0, 0, 255));
    }

    #[test]
    fn test_braille_all_dark_is_blank() {
        let rgba = solid(2, 4, [0, 0, 0]);
        let mut fb = FrameBuffer::new(1, 1).unwrap();
        let mut p = Painter::new(&mut fb, 8);
        draw_canvas(&mut p, 0, 0, 1, 1, 2, 4, &rgba, Blitter::Braille);
        drop(p);
        assert_eq!(fb.cell(0, 0).unwrap().glyph(), "\u{2800}");
    }

    #[test]
    fn test_braille_all_bright_is_full() {
        let rgba = solid(2, 4, [255, 255, 255]);
        let mut fb = FrameBuffer::new(1, 1).unwrap();
        let mut p = Painter::new(&mut fb, 8);
        draw_canvas(&mut p, 0, 0, 1, 1, 2, 4, &rgba, Blitter::Braille);
        drop(p);
        assert_eq!(fb.cell(0, 0).unwrap().glyph(), "\u{28FF}");
    }

    #[test]
    fn test_canvas_respects_clip() {
        let rgba = solid(4, 4, [200, 200, 200]);
        let mut fb = FrameBuffer::new(8, 4).unwrap();
        let mut p = Painter::new(&mut fb, 8);
        p.push_clip(crate::geom::Rect::new(0, 0, 2, 2)).unwrap();
        draw_canvas(&mut p, 0, 0, 4, 4, 4, 4, &rgba, Blitter::Quadrant);
        drop(p);
        // Outside the clip nothing changed.
        assert_eq!(fb.cell(3, 3).unwrap(), &Cell::EMPTY);
    }
}
