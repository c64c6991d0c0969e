//! Drawlist validation: every offset, index, size, and field checked before
//! any execution side effect.
//!
//! Validation is strict and pure: it reads the caller's buffer and produces
//! a [`DrawlistView`] borrowing it, or an error. Nothing else happens.

use super::wire::{
    self, decode_cmd, Command, Opcode, WireVersion, CMD_HEADER_SIZE, HEADER_SIZE, MAGIC, SPAN_SIZE,
};
use crate::error::{Error, Result};
use crate::limits::Limits;
use std::ops::Range;

/// Parsed header fields bound to the caller's buffer.
///
/// A view is proof of successful validation; execution requires one and the
/// view never outlives the buffer it borrows.
#[derive(Debug, Clone)]
pub struct DrawlistView<'buf> {
    buf: &'buf [u8],
    /// Validated wire version.
    pub version: WireVersion,
    /// Command section byte range.
    pub cmd_range: Range<usize>,
    /// Command count declared by the header.
    pub cmd_count: u32,
    strings_span: Range<usize>,
    strings_bytes: Range<usize>,
    /// Drawlist-local string count.
    pub strings_count: u32,
    blobs_span: Range<usize>,
    blobs_bytes: Range<usize>,
    /// Drawlist-local blob count.
    pub blobs_count: u32,
}

impl<'buf> DrawlistView<'buf> {
    /// Iterate the validated command stream.
    ///
    /// Records were fully checked during validation, so iteration cannot
    /// fail; a malformed record here would be an internal bug.
    pub fn commands(&self) -> CmdIter<'buf> {
        CmdIter {
            buf: &self.buf[self.cmd_range.clone()],
            version: self.version,
            pos: 0,
            remaining: self.cmd_count,
        }
    }

    /// Bytes of drawlist-local string `id` (1-based span index), if local.
    pub fn local_string(&self, id: u32) -> Option<&'buf [u8]> {
        self.local_span(id, self.strings_count, &self.strings_span, &self.strings_bytes)
    }

    /// Bytes of drawlist-local blob `id` (1-based span index), if local.
    pub fn local_blob(&self, id: u32) -> Option<&'buf [u8]> {
        self.local_span(id, self.blobs_count, &self.blobs_span, &self.blobs_bytes)
    }

    fn local_span(
        &self,
        id: u32,
        count: u32,
        span: &Range<usize>,
        bytes: &Range<usize>,
    ) -> Option<&'buf [u8]> {
        if id == 0 || id > count {
            return None;
        }
        let entry = span.start + (id as usize - 1) * SPAN_SIZE;
        let off = wire::read_u32(self.buf, entry) as usize;
        let len = wire::read_u32(self.buf, entry + 4) as usize;
        let payload = &self.buf[bytes.clone()];
        Some(&payload[off..off + len])
    }
}

/// Iterator over validated command records.
pub struct CmdIter<'buf> {
    buf: &'buf [u8],
    version: WireVersion,
    pos: usize,
    remaining: u32,
}

impl<'buf> Iterator for CmdIter<'buf> {
    type Item = Command<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let opcode = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        let size = wire::read_u32(self.buf, self.pos + 4) as usize;
        let payload = &self.buf[self.pos + CMD_HEADER_SIZE..self.pos + size];
        self.pos += size;
        let opcode = Opcode::from_u16(opcode)?;
        decode_cmd(opcode, payload, self.version).ok()
    }
}

/// Validate a drawlist buffer against `limits` and the engine's enabled
/// `version`. Pure; returns a view on success.
pub fn validate<'buf>(
    buf: &'buf [u8],
    version: WireVersion,
    limits: &Limits,
) -> Result<DrawlistView<'buf>> {
    if buf.len() > limits.dl_max_total_bytes as usize {
        return Err(Error::Limit("drawlist exceeds dl_max_total_bytes"));
    }
    if buf.len() < HEADER_SIZE {
        return Err(Error::Format("drawlist shorter than header"));
    }

    let field = |i: usize| wire::read_u32(buf, i * 4);

    if field(0) != MAGIC {
        return Err(Error::Format("bad magic"));
    }
    let Some(decl_version) = WireVersion::from_u32(field(1)) else {
        return Err(Error::Unsupported("unknown wire version"));
    };
    if decl_version != version {
        return Err(Error::Unsupported("wire version not enabled at create time"));
    }
    if field(2) as usize != HEADER_SIZE {
        return Err(Error::Format("bad header size"));
    }
    if field(3) as usize != buf.len() {
        return Err(Error::Format("total size does not match buffer length"));
    }
    if field(15) != 0 {
        return Err(Error::Format("header reserved field nonzero"));
    }

    let cmd_offset = field(4) as usize;
    let cmd_bytes = field(5) as usize;
    let cmd_count = field(6);
    let strings_span_offset = field(7) as usize;
    let strings_count = field(8);
    let strings_bytes_offset = field(9) as usize;
    let strings_bytes_len = field(10) as usize;
    let blobs_span_offset = field(11) as usize;
    let blobs_count = field(12);
    let blobs_bytes_offset = field(13) as usize;
    let blobs_bytes_len = field(14) as usize;

    if cmd_count > limits.dl_max_cmds {
        return Err(Error::Limit("command count exceeds dl_max_cmds"));
    }
    if strings_count > limits.dl_max_strings {
        return Err(Error::Limit("string count exceeds dl_max_strings"));
    }
    if blobs_count > limits.dl_max_blobs {
        return Err(Error::Limit("blob count exceeds dl_max_blobs"));
    }

    for &(off, len) in &[
        (cmd_offset, cmd_bytes),
        (strings_span_offset, strings_count as usize * SPAN_SIZE),
        (strings_bytes_offset, strings_bytes_len),
        (blobs_span_offset, blobs_count as usize * SPAN_SIZE),
        (blobs_bytes_offset, blobs_bytes_len),
    ] {
        if off % 4 != 0 || len % 4 != 0 {
            return Err(Error::Format("section offset or length misaligned"));
        }
    }

    // Zero-count sections must be fully zeroed.
    if cmd_count == 0 && (cmd_offset != 0 || cmd_bytes != 0) {
        return Err(Error::Format("empty command section with nonzero range"));
    }
    if strings_count == 0
        && (strings_span_offset != 0 || strings_bytes_offset != 0 || strings_bytes_len != 0)
    {
        return Err(Error::Format("empty string section with nonzero range"));
    }
    if blobs_count == 0
        && (blobs_span_offset != 0 || blobs_bytes_offset != 0 || blobs_bytes_len != 0)
    {
        return Err(Error::Format("empty blob section with nonzero range"));
    }

    // Section ranges must fit the buffer, sit past the header, and be
    // pairwise disjoint.
    let mut ranges: Vec<Range<usize>> = Vec::with_capacity(5);
    let mut add_range = |off: usize, len: usize| -> Result<Range<usize>> {
        let range = off..off.checked_add(len).ok_or(Error::Format("section range overflow"))?;
        if len == 0 {
            return Ok(range);
        }
        if off < HEADER_SIZE || range.end > buf.len() {
            return Err(Error::Format("section range outside buffer"));
        }
        for other in &ranges {
            if range.start < other.end && other.start < range.end {
                return Err(Error::Format("sections overlap"));
            }
        }
        ranges.push(range.clone());
        Ok(range)
    };

    let cmd_range = add_range(cmd_offset, cmd_bytes)?;
    let strings_span = add_range(strings_span_offset, strings_count as usize * SPAN_SIZE)?;
    let strings_bytes = add_range(strings_bytes_offset, strings_bytes_len)?;
    let blobs_span = add_range(blobs_span_offset, blobs_count as usize * SPAN_SIZE)?;
    let blobs_bytes = add_range(blobs_bytes_offset, blobs_bytes_len)?;

    // Every span must fit its section's payload bytes.
    check_spans(buf, &strings_span, strings_count, strings_bytes_len)?;
    check_spans(buf, &blobs_span, blobs_count, blobs_bytes_len)?;

    let view = DrawlistView {
        buf,
        version,
        cmd_range: cmd_range.clone(),
        cmd_count,
        strings_span,
        strings_bytes,
        strings_count,
        blobs_span,
        blobs_bytes,
        blobs_count,
    };

    walk_commands(buf, &cmd_range, cmd_count, version, limits)?;
    Ok(view)
}

fn check_spans(
    buf: &[u8],
    span_range: &Range<usize>,
    count: u32,
    payload_len: usize,
) -> Result<()> {
    for i in 0..count as usize {
        let entry = span_range.start + i * SPAN_SIZE;
        let off = wire::read_u32(buf, entry) as usize;
        let len = wire::read_u32(buf, entry + 4) as usize;
        let end = off.checked_add(len).ok_or(Error::Format("span overflow"))?;
        if end > payload_len {
            return Err(Error::Format("span outside section payload"));
        }
    }
    Ok(())
}

/// Walk the command stream: record framing, per-opcode payloads, clip
/// depth accounting, and the no-trailing-bytes rule.
fn walk_commands(
    buf: &[u8],
    cmd_range: &Range<usize>,
    cmd_count: u32,
    version: WireVersion,
    limits: &Limits,
) -> Result<()> {
    let cmds = &buf[cmd_range.clone()];
    let mut pos = 0usize;
    let mut clip_depth = 0u32;

    for _ in 0..cmd_count {
        if pos + CMD_HEADER_SIZE > cmds.len() {
            return Err(Error::Format("command stream truncated"));
        }
        let opcode_raw = u16::from_le_bytes([cmds[pos], cmds[pos + 1]]);
        let flags = u16::from_le_bytes([cmds[pos + 2], cmds[pos + 3]]);
        let size = wire::read_u32(cmds, pos + 4) as usize;
        if flags != 0 {
            return Err(Error::Format("command flags nonzero"));
        }
        if size < CMD_HEADER_SIZE || size % 4 != 0 {
            return Err(Error::Format("command size invalid"));
        }
        if size > cmds.len() - pos {
            return Err(Error::Format("command size exceeds section"));
        }
        let Some(opcode) = Opcode::from_u16(opcode_raw) else {
            return Err(Error::Unsupported("unknown opcode"));
        };
        let payload = &cmds[pos + CMD_HEADER_SIZE..pos + size];
        let cmd = decode_cmd(opcode, payload, version)?;

        match cmd {
            Command::PushClip { .. } => {
                if clip_depth >= limits.dl_max_clip_depth {
                    return Err(Error::Limit("clip depth exceeds dl_max_clip_depth"));
                }
                clip_depth += 1;
            }
            Command::PopClip => {
                clip_depth = clip_depth
                    .checked_sub(1)
                    .ok_or(Error::Format("clip stack underflow"))?;
            }
            _ => {}
        }
        pos += size;
    }

    if pos != cmds.len() {
        return Err(Error::Format("trailing bytes after last command"));
    }
    Ok(())
}
