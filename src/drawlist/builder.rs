//! Drawlist encoder: assembles well-formed wire buffers.
//!
//! The builder is the encoding counterpart of the validator, used by tests
//! and by in-process callers that drive the engine without a foreign
//! wrapper. It always produces aligned sections and zero padding.

use super::wire::{align4, Blitter, CursorShape, Opcode, WireStyle, WireVersion, HEADER_SIZE, MAGIC};

/// Incrementally builds one drawlist buffer.
#[derive(Debug, Default)]
pub struct DrawlistBuilder {
    cmds: Vec<u8>,
    cmd_count: u32,
    string_spans: Vec<(u32, u32)>,
    string_bytes: Vec<u8>,
    blob_spans: Vec<(u32, u32)>,
    blob_bytes: Vec<u8>,
}

impl DrawlistBuilder {
    /// Start an empty drawlist.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, opcode: Opcode, payload: &[u8]) {
        debug_assert_eq!(payload.len() % 4, 0);
        let size = (8 + payload.len()) as u32;
        self.cmds.extend_from_slice(&(opcode as u16).to_le_bytes());
        self.cmds.extend_from_slice(&0u16.to_le_bytes());
        self.cmds.extend_from_slice(&size.to_le_bytes());
        self.cmds.extend_from_slice(payload);
        self.cmd_count += 1;
    }

    fn style_bytes(style: &WireStyle, out: &mut Vec<u8>) {
        for v in [
            style.fg_rgb,
            style.bg_rgb,
            style.attrs,
            0,
            style.underline_rgb,
            style.link_uri_ref,
            style.link_id_ref,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Intern bytes into the drawlist-local string section; the returned ID
    /// is usable by DRAW_TEXT and link references in this drawlist.
    pub fn intern_string(&mut self, bytes: &[u8]) -> u32 {
        let off = self.string_bytes.len() as u32;
        self.string_bytes.extend_from_slice(bytes);
        self.string_spans.push((off, bytes.len() as u32));
        self.string_spans.len() as u32
    }

    /// Intern bytes into the drawlist-local blob section.
    pub fn intern_blob(&mut self, bytes: &[u8]) -> u32 {
        let off = self.blob_bytes.len() as u32;
        self.blob_bytes.extend_from_slice(bytes);
        self.blob_spans.push((off, bytes.len() as u32));
        self.blob_spans.len() as u32
    }

    /// Append CLEAR.
    pub fn clear(&mut self) {
        self.record(Opcode::Clear, &[]);
    }

    /// Append FILL_RECT.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, style: &WireStyle) {
        let mut p = Vec::with_capacity(44);
        p.extend_from_slice(&x.to_le_bytes());
        p.extend_from_slice(&y.to_le_bytes());
        p.extend_from_slice(&w.to_le_bytes());
        p.extend_from_slice(&h.to_le_bytes());
        Self::style_bytes(style, &mut p);
        self.record(Opcode::FillRect, &p);
    }

    /// Append DRAW_TEXT referencing `string_id` (local or store-resident).
    pub fn draw_text(
        &mut self,
        x: i32,
        y: i32,
        string_id: u32,
        byte_off: u32,
        byte_len: u32,
        style: &WireStyle,
    ) {
        let mut p = Vec::with_capacity(52);
        p.extend_from_slice(&x.to_le_bytes());
        p.extend_from_slice(&y.to_le_bytes());
        p.extend_from_slice(&string_id.to_le_bytes());
        p.extend_from_slice(&byte_off.to_le_bytes());
        p.extend_from_slice(&byte_len.to_le_bytes());
        Self::style_bytes(style, &mut p);
        p.extend_from_slice(&0u32.to_le_bytes());
        self.record(Opcode::DrawText, &p);
    }

    /// Append PUSH_CLIP.
    pub fn push_clip(&mut self, x: i32, y: i32, w: u32, h: u32) {
        let mut p = Vec::with_capacity(16);
        p.extend_from_slice(&x.to_le_bytes());
        p.extend_from_slice(&y.to_le_bytes());
        p.extend_from_slice(&w.to_le_bytes());
        p.extend_from_slice(&h.to_le_bytes());
        self.record(Opcode::PushClip, &p);
    }

    /// Append POP_CLIP.
    pub fn pop_clip(&mut self) {
        self.record(Opcode::PopClip, &[]);
    }

    /// Append BLIT_RECT.
    pub fn blit_rect(&mut self, src_x: i32, src_y: i32, w: u32, h: u32, dst_x: i32, dst_y: i32) {
        let mut p = Vec::with_capacity(24);
        p.extend_from_slice(&src_x.to_le_bytes());
        p.extend_from_slice(&src_y.to_le_bytes());
        p.extend_from_slice(&w.to_le_bytes());
        p.extend_from_slice(&h.to_le_bytes());
        p.extend_from_slice(&dst_x.to_le_bytes());
        p.extend_from_slice(&dst_y.to_le_bytes());
        self.record(Opcode::BlitRect, &p);
    }

    /// Append DRAW_TEXT_RUN referencing a segment blob.
    pub fn draw_text_run(&mut self, x: i32, y: i32, blob_id: u32) {
        let mut p = Vec::with_capacity(16);
        p.extend_from_slice(&x.to_le_bytes());
        p.extend_from_slice(&y.to_le_bytes());
        p.extend_from_slice(&blob_id.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        self.record(Opcode::DrawTextRun, &p);
    }

    /// Encode a text-run segment blob from (style, string_id, off, len)
    /// tuples; pass the result to [`Self::intern_blob`] or DEF_BLOB.
    pub fn encode_text_run(segments: &[(WireStyle, u32, u32, u32)]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + segments.len() * 40);
        out.extend_from_slice(&(segments.len() as u32).to_le_bytes());
        for (style, id, off, len) in segments {
            Self::style_bytes(style, &mut out);
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&off.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
        out
    }

    /// Append SET_CURSOR.
    pub fn set_cursor(&mut self, x: i32, y: i32, shape: CursorShape, visible: bool, blink: bool) {
        let mut p = Vec::with_capacity(20);
        p.extend_from_slice(&x.to_le_bytes());
        p.extend_from_slice(&y.to_le_bytes());
        p.extend_from_slice(&(shape as u32).to_le_bytes());
        p.extend_from_slice(&u32::from(visible).to_le_bytes());
        p.extend_from_slice(&u32::from(blink).to_le_bytes());
        self.record(Opcode::SetCursor, &p);
    }

    /// Append DRAW_CANVAS.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_canvas(
        &mut self,
        x: i32,
        y: i32,
        cols: u32,
        rows: u32,
        px_w: u32,
        px_h: u32,
        blob_id: u32,
        blitter: Blitter,
    ) {
        let mut p = Vec::with_capacity(36);
        for v in [x as u32, y as u32, cols, rows, px_w, px_h, blob_id, blitter as u32, 0] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        self.record(Opcode::DrawCanvas, &p);
    }

    /// Append DRAW_IMAGE.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        x: i32,
        y: i32,
        cols: u32,
        rows: u32,
        px_w: u32,
        px_h: u32,
        blob_id: u32,
        image_id: u32,
        format: super::wire::ImageFormat,
        protocol: super::wire::ImageProtocol,
        z_layer: i32,
        fit: super::wire::FitMode,
    ) {
        let mut p = Vec::with_capacity(52);
        for v in [
            x as u32,
            y as u32,
            cols,
            rows,
            px_w,
            px_h,
            blob_id,
            image_id,
            format as u32,
            protocol as u32,
            z_layer as u32,
            fit as u32,
            0,
        ] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        self.record(Opcode::DrawImage, &p);
    }

    /// Append DEF_STRING.
    pub fn def_string(&mut self, id: u32, bytes: &[u8]) {
        self.define(Opcode::DefString, id, bytes);
    }

    /// Append DEF_BLOB.
    pub fn def_blob(&mut self, id: u32, bytes: &[u8]) {
        self.define(Opcode::DefBlob, id, bytes);
    }

    fn define(&mut self, opcode: Opcode, id: u32, bytes: &[u8]) {
        let mut p = Vec::with_capacity(8 + align4(bytes.len()));
        p.extend_from_slice(&id.to_le_bytes());
        p.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        p.extend_from_slice(bytes);
        p.resize(8 + align4(bytes.len()), 0);
        self.record(opcode, &p);
    }

    /// Append FREE_STRING.
    pub fn free_string(&mut self, id: u32) {
        self.record(Opcode::FreeString, &id.to_le_bytes());
    }

    /// Append FREE_BLOB.
    pub fn free_blob(&mut self, id: u32) {
        self.record(Opcode::FreeBlob, &id.to_le_bytes());
    }

    /// Assemble the final wire buffer.
    pub fn finish(self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];

        let cmd_offset = if self.cmds.is_empty() { 0 } else { out.len() as u32 };
        out.extend_from_slice(&self.cmds);

        let (strings_span_offset, strings_bytes_offset, strings_bytes_len) =
            Self::emit_section(&mut out, &self.string_spans, &self.string_bytes);
        let (blobs_span_offset, blobs_bytes_offset, blobs_bytes_len) =
            Self::emit_section(&mut out, &self.blob_spans, &self.blob_bytes);

        let total = out.len() as u32;
        for (i, v) in [
            MAGIC,
            WireVersion::V1 as u32,
            HEADER_SIZE as u32,
            total,
            cmd_offset,
            self.cmds.len() as u32,
            self.cmd_count,
            strings_span_offset,
            self.string_spans.len() as u32,
            strings_bytes_offset,
            strings_bytes_len,
            blobs_span_offset,
            self.blob_spans.len() as u32,
            blobs_bytes_offset,
            blobs_bytes_len,
            0,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn emit_section(out: &mut Vec<u8>, spans: &[(u32, u32)], bytes: &[u8]) -> (u32, u32, u32) {
        if spans.is_empty() {
            return (0, 0, 0);
        }
        let span_offset = out.len() as u32;
        for (off, len) in spans {
            out.extend_from_slice(&off.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
        let bytes_offset = out.len() as u32;
        let padded = align4(bytes.len());
        out.extend_from_slice(bytes);
        out.resize(bytes_offset as usize + padded, 0);
        (span_offset, bytes_offset, padded as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_layout() {
        let buf = DrawlistBuilder::new().finish();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], &MAGIC.to_le_bytes());
    }

    #[test]
    fn test_sections_are_aligned() {
        let mut b = DrawlistBuilder::new();
        b.intern_string(b"abc"); // 3 bytes, forces padding
        b.clear();
        let buf = b.finish();
        let span_off = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let bytes_len = u32::from_le_bytes(buf[40..44].try_into().unwrap());
        assert_eq!(span_off % 4, 0);
        assert_eq!(bytes_len % 4, 0);
        assert_eq!(buf.len() % 4, 0);
    }

    #[test]
    fn test_text_run_encoding() {
        let style = WireStyle::default();
        let blob = DrawlistBuilder::encode_text_run(&[(style, 1, 0, 5), (style, 2, 0, 3)]);
        assert_eq!(blob.len(), 4 + 2 * 40);
        assert_eq!(u32::from_le_bytes(blob[0..4].try_into().unwrap()), 2);
    }
}
