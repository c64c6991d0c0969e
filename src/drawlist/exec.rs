//! Drawlist execution: validated commands applied to a framebuffer.
//!
//! Execution is two-phase. The preflight walk resolves every referenced
//! resource, checks blob framing and RGBA sizes, and reserves image staging
//! capacity; only when the whole list preflights clean does the execute walk
//! start mutating the destination. Resource mutations ride a [`StoreTxn`]
//! committed at the end, so a failed submission has no visible effect.

use super::canvas;
use super::resources::{ResKind, ResourceStore, StoreTxn};
use super::validate::DrawlistView;
use super::wire::{self, Command, FitMode, ImageFormat, ImageProtocol, WireStyle};
use crate::arena::Arena;
use crate::buffer::{Attrs, FrameBuffer, Painter, Rgb, Style};
use crate::error::{Error, Result};
use crate::geom::Rect;
use crate::limits::Limits;
use crate::render::state::CursorState;
use crate::unicode::WidthPolicy;
use std::ops::Range;

/// Execution-time configuration pinned at engine creation.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    /// Grapheme width policy.
    pub width_policy: WidthPolicy,
    /// Tab stop width (>= 1).
    pub tab_width: u32,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            width_policy: WidthPolicy::EmojiNarrow,
            tab_width: 8,
        }
    }
}

/// One image staged for the protocol layer, payload parked in the frame
/// arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlacement {
    /// Destination cell rect.
    pub rect: Rect,
    /// Source pixel dimensions.
    pub px_w: u32,
    /// Source pixel dimensions.
    pub px_h: u32,
    /// Caller-chosen image identity, stable across frames.
    pub image_id: u32,
    /// Payload encoding.
    pub format: ImageFormat,
    /// Requested transport.
    pub protocol: ImageProtocol,
    /// Stacking relative to text (-1 below, 0 inline, 1 above).
    pub z_layer: i32,
    /// Scaling mode.
    pub fit: FitMode,
    /// Payload range within the frame arena.
    pub data: Range<usize>,
}

/// Everything a successful execution produced besides cell mutations.
#[derive(Debug, Default)]
pub struct ExecOutput {
    /// Cursor state requested by the last SET_CURSOR, if any.
    pub cursor: Option<CursorState>,
    /// Image placements staged this frame.
    pub images: Vec<ImagePlacement>,
}

/// Resolve a string id: drawlist-local ids shadow the store for the
/// duration of the list.
fn resolve_string<'a>(
    view: &DrawlistView<'a>,
    store: &'a ResourceStore,
    txn: &'a StoreTxn,
    id: u32,
) -> Result<&'a [u8]> {
    match view.local_string(id) {
        Some(bytes) => Ok(bytes),
        None => txn.get(store, ResKind::String, id),
    }
}

fn resolve_blob<'a>(
    view: &DrawlistView<'a>,
    store: &'a ResourceStore,
    txn: &'a StoreTxn,
    id: u32,
) -> Result<&'a [u8]> {
    match view.local_blob(id) {
        Some(bytes) => Ok(bytes),
        None => txn.get(store, ResKind::Blob, id),
    }
}

fn check_substring(bytes: &[u8], off: u32, len: u32) -> Result<()> {
    let end = off.checked_add(len).ok_or(Error::Format("substring overflow"))?;
    if end as usize > bytes.len() {
        return Err(Error::Format("substring outside resource"));
    }
    Ok(())
}

fn check_style_refs(
    view: &DrawlistView<'_>,
    store: &ResourceStore,
    txn: &StoreTxn,
    style: &WireStyle,
) -> Result<()> {
    if style.link_uri_ref != 0 {
        resolve_string(view, store, txn, style.link_uri_ref)?;
    }
    if style.link_id_ref != 0 {
        resolve_string(view, store, txn, style.link_id_ref)?;
    }
    Ok(())
}

fn rgba_len(px_w: u32, px_h: u32) -> Result<usize> {
    (px_w as usize)
        .checked_mul(px_h as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or(Error::Format("pixel extent overflow"))
}

/// Walk every command without touching the destination: resolve resources,
/// check framing, and make sure the staged image payloads fit the arena.
pub fn preflight(
    view: &DrawlistView<'_>,
    store: &ResourceStore,
    limits: &Limits,
    frame_arena: &Arena,
) -> Result<()> {
    let mut txn = StoreTxn::new(store);
    let mut image_bytes = 0usize;

    for cmd in view.commands() {
        match cmd {
            Command::DefString { id, bytes } => {
                txn.define(ResKind::String, id, bytes);
                if txn.count(store, ResKind::String) > limits.dl_max_strings as usize {
                    return Err(Error::Limit("string store exceeds dl_max_strings"));
                }
            }
            Command::DefBlob { id, bytes } => {
                txn.define(ResKind::Blob, id, bytes);
                if txn.count(store, ResKind::Blob) > limits.dl_max_blobs as usize {
                    return Err(Error::Limit("blob store exceeds dl_max_blobs"));
                }
            }
            Command::FreeString { id } => txn.free(store, ResKind::String, id)?,
            Command::FreeBlob { id } => txn.free(store, ResKind::Blob, id)?,
            Command::FillRect { style, .. } => check_style_refs(view, store, &txn, &style)?,
            Command::DrawText {
                string_id,
                byte_off,
                byte_len,
                style,
                ..
            } => {
                let bytes = resolve_string(view, store, &txn, string_id)?;
                check_substring(bytes, byte_off, byte_len)?;
                check_style_refs(view, store, &txn, &style)?;
            }
            Command::DrawTextRun { blob_id, .. } => {
                let blob = resolve_blob(view, store, &txn, blob_id)?;
                for seg in text_run_segments(blob, limits)? {
                    let (style, string_id, off, len) = seg?;
                    let bytes = resolve_string(view, store, &txn, string_id)?;
                    check_substring(bytes, off, len)?;
                    check_style_refs(view, store, &txn, &style)?;
                }
            }
            Command::DrawCanvas {
                px_w, px_h, blob_id, ..
            } => {
                let blob = resolve_blob(view, store, &txn, blob_id)?;
                if blob.len() != rgba_len(px_w, px_h)? {
                    return Err(Error::Format("canvas blob size mismatch"));
                }
            }
            Command::DrawImage {
                px_w,
                px_h,
                blob_id,
                format,
                ..
            } => {
                let blob = resolve_blob(view, store, &txn, blob_id)?;
                if format == ImageFormat::Rgba8 && blob.len() != rgba_len(px_w, px_h)? {
                    return Err(Error::Format("image blob size mismatch"));
                }
                image_bytes += blob.len();
            }
            Command::Clear
            | Command::PushClip { .. }
            | Command::PopClip
            | Command::BlitRect { .. }
            | Command::SetCursor { .. } => {}
        }
    }

    if !frame_arena.can_fit(image_bytes) {
        return Err(Error::Limit("image staging exceeds arena ceiling"));
    }
    Ok(())
}

/// Iterate the segments of a text-run blob, enforcing its framing.
fn text_run_segments<'a>(
    blob: &'a [u8],
    limits: &Limits,
) -> Result<impl Iterator<Item = Result<(WireStyle, u32, u32, u32)>> + 'a> {
    if blob.len() < 4 {
        return Err(Error::Format("text run blob shorter than header"));
    }
    let seg_count = wire::read_u32(blob, 0) as usize;
    if seg_count > limits.dl_max_text_run_segments as usize {
        return Err(Error::Limit("text run segments exceed limit"));
    }
    let expect = 4 + seg_count * wire::TEXT_RUN_SEGMENT_SIZE;
    if blob.len() != expect {
        return Err(Error::Format("text run blob size mismatch"));
    }
    Ok((0..seg_count).map(move |i| {
        let start = 4 + i * wire::TEXT_RUN_SEGMENT_SIZE;
        wire::decode_text_run_segment(&blob[start..start + wire::TEXT_RUN_SEGMENT_SIZE])
    }))
}

/// Convert a wire style, interning any link reference.
fn convert_style(
    painter: &mut Painter<'_>,
    view: &DrawlistView<'_>,
    store: &ResourceStore,
    txn: &StoreTxn,
    ws: &WireStyle,
) -> Style {
    let link = if ws.link_uri_ref != 0 {
        // Preflight proved both references resolvable.
        let uri = resolve_string(view, store, txn, ws.link_uri_ref).unwrap_or(b"");
        let id = if ws.link_id_ref != 0 {
            resolve_string(view, store, txn, ws.link_id_ref).unwrap_or(b"")
        } else {
            b""
        };
        painter.intern_link(uri, id)
    } else {
        0
    };
    Style {
        fg: Rgb::from_u32(ws.fg_rgb),
        bg: Rgb::from_u32(ws.bg_rgb),
        underline: Rgb::from_u32(ws.underline_rgb),
        attrs: Attrs::from_bits_truncate(ws.attrs as u8),
        link,
    }
}

/// Execute a validated, preflighted drawlist against `fb`.
///
/// Returns the cursor request and staged images; the resource transaction
/// commits only when every command has executed.
pub fn execute(
    view: &DrawlistView<'_>,
    fb: &mut FrameBuffer,
    store: &mut ResourceStore,
    frame_arena: &mut Arena,
    limits: &Limits,
    cfg: &ExecConfig,
) -> Result<ExecOutput> {
    let mut txn = StoreTxn::new(store);
    let mut out = ExecOutput::default();
    let mut painter = Painter::new(fb, limits.dl_max_clip_depth as usize);

    for cmd in view.commands() {
        match cmd {
            Command::Clear => {
                let clip = painter.clip();
                painter.fill_rect(clip, &Style::DEFAULT);
            }
            Command::FillRect { x, y, w, h, style } => {
                let style = convert_style(&mut painter, view, store, &txn, &style);
                painter.fill_rect(Rect::new(x, y, w as i32, h as i32), &style);
            }
            Command::DrawText {
                x,
                y,
                string_id,
                byte_off,
                byte_len,
                style,
            } => {
                let style = convert_style(&mut painter, view, store, &txn, &style);
                let bytes = resolve_string(view, store, &txn, string_id)?;
                let text = &bytes[byte_off as usize..(byte_off + byte_len) as usize];
                painter.draw_text(x, y, text, &style, cfg.width_policy, cfg.tab_width);
            }
            Command::PushClip { x, y, w, h } => {
                painter.push_clip(Rect::new(x, y, w as i32, h as i32))?;
            }
            Command::PopClip => painter.pop_clip()?,
            Command::BlitRect {
                src_x,
                src_y,
                w,
                h,
                dst_x,
                dst_y,
            } => {
                painter.blit_rect(Rect::new(src_x, src_y, w as i32, h as i32), dst_x, dst_y);
            }
            Command::DrawTextRun { x, y, blob_id } => {
                let blob = resolve_blob(view, store, &txn, blob_id)?;
                let mut col = x;
                for seg in text_run_segments(blob, limits)? {
                    let (ws, string_id, off, len) = seg?;
                    let style = convert_style(&mut painter, view, store, &txn, &ws);
                    let bytes = resolve_string(view, store, &txn, string_id)?;
                    let text = &bytes[off as usize..(off + len) as usize];
                    col = painter.draw_text(col, y, text, &style, cfg.width_policy, cfg.tab_width);
                }
            }
            Command::SetCursor {
                x,
                y,
                shape,
                visible,
                blink,
            } => {
                out.cursor = Some(CursorState {
                    x,
                    y,
                    shape,
                    visible,
                    blink,
                });
            }
            Command::DrawCanvas {
                x,
                y,
                cols,
                rows,
                px_w,
                px_h,
                blob_id,
                blitter,
            } => {
                let rgba = resolve_blob(view, store, &txn, blob_id)?;
                canvas::draw_canvas(&mut painter, x, y, cols, rows, px_w, px_h, rgba, blitter);
            }
            Command::DrawImage {
                x,
                y,
                cols,
                rows,
                px_w,
                px_h,
                blob_id,
                image_id,
                format,
                protocol,
                z_layer,
                fit,
            } => {
                let blob = resolve_blob(view, store, &txn, blob_id)?;
                let data = frame_arena.alloc(blob)?;
                out.images.push(ImagePlacement {
                    rect: Rect::new(x, y, cols as i32, rows as i32),
                    px_w,
                    px_h,
                    image_id,
                    format,
                    protocol,
                    z_layer,
                    fit,
                    data,
                });
            }
            Command::DefString { id, bytes } => txn.define(ResKind::String, id, bytes),
            Command::DefBlob { id, bytes } => txn.define(ResKind::Blob, id, bytes),
            Command::FreeString { id } => txn.free(store, ResKind::String, id)?,
            Command::FreeBlob { id } => txn.free(store, ResKind::Blob, id)?,
        }
    }

    drop(painter);
    txn.commit(store);
    Ok(out)
}
