//! Drawlist wire format: header layout, opcodes, and command decoding.
//!
//! All multi-byte integers are little-endian. The header is sixteen u32
//! fields (64 bytes); each section offset and each declared section length
//! is 4-byte aligned. Command records are `u16 opcode; u16 flags; u32 size`
//! followed by `size - 8` payload bytes.
//!
//! Decoding is the single dispatch point for both validation and execution:
//! [`decode_cmd`] maps an opcode to a statically-typed [`Command`] while
//! enforcing the literal payload layout, reserved-zero fields, and enum
//! ranges.

use crate::error::{Error, Result};

/// `'ZRDL'` little-endian.
pub const MAGIC: u32 = 0x4C44_525A;
/// Header byte length.
pub const HEADER_SIZE: usize = 64;
/// Command record header length (`opcode + flags + size`).
pub const CMD_HEADER_SIZE: usize = 8;
/// Span table entry length (`u32 off; u32 len`).
pub const SPAN_SIZE: usize = 8;
/// Bytes per DRAW_TEXT_RUN segment: wire style + string ref triple.
pub const TEXT_RUN_SEGMENT_SIZE: usize = WIRE_STYLE_SIZE + 12;
/// Bytes per encoded style.
pub const WIRE_STYLE_SIZE: usize = 28;

/// Enabled wire-format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum WireVersion {
    /// The initial stable format.
    #[default]
    V1 = 1,
}

impl WireVersion {
    /// Decode a header version field.
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// BLIT_RECT acceptance is version-gated.
    pub const fn supports_blit(self) -> bool {
        match self {
            Self::V1 => true,
        }
    }
}

/// Opcodes, densely enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum Opcode {
    Clear = 1,
    FillRect = 2,
    DrawText = 3,
    PushClip = 4,
    PopClip = 5,
    BlitRect = 6,
    DrawTextRun = 7,
    SetCursor = 8,
    DrawCanvas = 9,
    DrawImage = 10,
    DefString = 11,
    DefBlob = 12,
    FreeString = 13,
    FreeBlob = 14,
}

impl Opcode {
    /// Decode a wire opcode.
    pub const fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::Clear,
            2 => Self::FillRect,
            3 => Self::DrawText,
            4 => Self::PushClip,
            5 => Self::PopClip,
            6 => Self::BlitRect,
            7 => Self::DrawTextRun,
            8 => Self::SetCursor,
            9 => Self::DrawCanvas,
            10 => Self::DrawImage,
            11 => Self::DefString,
            12 => Self::DefBlob,
            13 => Self::FreeString,
            14 => Self::FreeBlob,
            _ => return None,
        })
    }
}

/// Known attribute bits on the wire (mirrors `buffer::Attrs`).
pub const WIRE_ATTRS_MASK: u32 = 0b1_1111;

/// A style as encoded in command payloads: seven u32 fields.
///
/// Link references are string resource IDs (0 = none); the executor resolves
/// them through the framebuffer's interning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireStyle {
    /// Foreground 0xRRGGBB.
    pub fg_rgb: u32,
    /// Background 0xRRGGBB.
    pub bg_rgb: u32,
    /// Attribute bits (within [`WIRE_ATTRS_MASK`]).
    pub attrs: u32,
    /// Underline 0xRRGGBB.
    pub underline_rgb: u32,
    /// String ID of the link URI (0 = no link).
    pub link_uri_ref: u32,
    /// String ID of the explicit link id (0 = none).
    pub link_id_ref: u32,
}

/// Cursor shape selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum CursorShape {
    /// Full-cell block.
    #[default]
    Block = 0,
    /// Underline bar.
    Underline = 1,
    /// Vertical bar.
    Bar = 2,
}

/// RGBA canvas blitter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Blitter {
    /// U+2580 upper-half blocks, two pixels per cell.
    HalfBlock = 0,
    /// 2x2 quadrant mosaics.
    Quadrant = 1,
    /// 2x4 braille dots.
    Braille = 2,
}

/// Image payload encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ImageFormat {
    /// Raw RGBA8.
    Rgba8 = 0,
    /// PNG-encoded payload passed through to the protocol layer.
    Png = 1,
}

/// Terminal image protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ImageProtocol {
    /// Pick per detected capability.
    Auto = 0,
    /// Kitty graphics protocol.
    Kitty = 1,
    /// iTerm2 inline images.
    Iterm2 = 2,
    /// Sixel.
    Sixel = 3,
}

/// Image fit modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FitMode {
    /// Stretch to the destination rect.
    Stretch = 0,
    /// Scale preserving aspect, fitting inside.
    Contain = 1,
    /// Scale preserving aspect, covering.
    Cover = 2,
    /// No scaling.
    None = 3,
}

/// A decoded drawlist command borrowing payload bytes from the caller's
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Command<'a> {
    Clear,
    FillRect {
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        style: WireStyle,
    },
    DrawText {
        x: i32,
        y: i32,
        string_id: u32,
        byte_off: u32,
        byte_len: u32,
        style: WireStyle,
    },
    PushClip {
        x: i32,
        y: i32,
        w: u32,
        h: u32,
    },
    PopClip,
    BlitRect {
        src_x: i32,
        src_y: i32,
        w: u32,
        h: u32,
        dst_x: i32,
        dst_y: i32,
    },
    DrawTextRun {
        x: i32,
        y: i32,
        blob_id: u32,
    },
    SetCursor {
        x: i32,
        y: i32,
        shape: CursorShape,
        visible: bool,
        blink: bool,
    },
    DrawCanvas {
        x: i32,
        y: i32,
        cols: u32,
        rows: u32,
        px_w: u32,
        px_h: u32,
        blob_id: u32,
        blitter: Blitter,
    },
    DrawImage {
        x: i32,
        y: i32,
        cols: u32,
        rows: u32,
        px_w: u32,
        px_h: u32,
        blob_id: u32,
        image_id: u32,
        format: ImageFormat,
        protocol: ImageProtocol,
        z_layer: i32,
        fit: FitMode,
    },
    DefString {
        id: u32,
        bytes: &'a [u8],
    },
    DefBlob {
        id: u32,
        bytes: &'a [u8],
    },
    FreeString {
        id: u32,
    },
    FreeBlob {
        id: u32,
    },
}

/// Sequential little-endian field reader over a payload slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        if end > self.buf.len() {
            return Err(Error::Format("command payload short read"));
        }
        let v = u32::from_le_bytes([
            self.buf[self.pos],
            self.buf[self.pos + 1],
            self.buf[self.pos + 2],
            self.buf[self.pos + 3],
        ]);
        self.pos = end;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32> {
        self.u32().map(|v| v as i32)
    }

    fn style(&mut self) -> Result<WireStyle> {
        let fg_rgb = self.rgb24()?;
        let bg_rgb = self.rgb24()?;
        let attrs = self.u32()?;
        if attrs & !WIRE_ATTRS_MASK != 0 {
            return Err(Error::Format("unknown style attribute bits"));
        }
        self.reserved_zero()?;
        let underline_rgb = self.rgb24()?;
        let link_uri_ref = self.u32()?;
        let link_id_ref = self.u32()?;
        Ok(WireStyle {
            fg_rgb,
            bg_rgb,
            attrs,
            underline_rgb,
            link_uri_ref,
            link_id_ref,
        })
    }

    fn rgb24(&mut self) -> Result<u32> {
        let v = self.u32()?;
        if v > 0x00FF_FFFF {
            return Err(Error::Format("color exceeds 24 bits"));
        }
        Ok(v)
    }

    fn reserved_zero(&mut self) -> Result<()> {
        if self.u32()? != 0 {
            return Err(Error::Format("reserved field nonzero"));
        }
        Ok(())
    }

    /// A width/height-style field: must fit a positive i32.
    fn extent(&mut self) -> Result<u32> {
        let v = self.u32()?;
        if v > i32::MAX as u32 {
            return Err(Error::Format("extent exceeds i32"));
        }
        Ok(v)
    }

    fn bool32(&mut self) -> Result<bool> {
        match self.u32()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::Format("boolean field out of range")),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(Error::Format("command payload size mismatch"))
        }
    }
}

/// Round up to the next multiple of four.
#[inline]
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Decode one command payload, enforcing its literal layout.
pub fn decode_cmd<'a>(
    opcode: Opcode,
    payload: &'a [u8],
    version: WireVersion,
) -> Result<Command<'a>> {
    let mut r = Reader::new(payload);
    let cmd = match opcode {
        Opcode::Clear => Command::Clear,
        Opcode::FillRect => Command::FillRect {
            x: r.i32()?,
            y: r.i32()?,
            w: r.extent()?,
            h: r.extent()?,
            style: r.style()?,
        },
        Opcode::DrawText => {
            let cmd = Command::DrawText {
                x: r.i32()?,
                y: r.i32()?,
                string_id: require_nonzero(r.u32()?)?,
                byte_off: r.u32()?,
                byte_len: r.u32()?,
                style: r.style()?,
            };
            r.reserved_zero()?;
            cmd
        }
        Opcode::PushClip => Command::PushClip {
            x: r.i32()?,
            y: r.i32()?,
            w: r.extent()?,
            h: r.extent()?,
        },
        Opcode::PopClip => Command::PopClip,
        Opcode::BlitRect => {
            if !version.supports_blit() {
                return Err(Error::Unsupported("BLIT_RECT not enabled for version"));
            }
            Command::BlitRect {
                src_x: r.i32()?,
                src_y: r.i32()?,
                w: r.extent()?,
                h: r.extent()?,
                dst_x: r.i32()?,
                dst_y: r.i32()?,
            }
        }
        Opcode::DrawTextRun => {
            let cmd = Command::DrawTextRun {
                x: r.i32()?,
                y: r.i32()?,
                blob_id: require_nonzero(r.u32()?)?,
            };
            r.reserved_zero()?;
            cmd
        }
        Opcode::SetCursor => {
            let x = r.i32()?;
            let y = r.i32()?;
            if x < -1 || y < -1 {
                return Err(Error::Format("cursor coordinates below -1"));
            }
            let shape = match r.u32()? {
                0 => CursorShape::Block,
                1 => CursorShape::Underline,
                2 => CursorShape::Bar,
                _ => return Err(Error::Format("cursor shape out of range")),
            };
            Command::SetCursor {
                x,
                y,
                shape,
                visible: r.bool32()?,
                blink: r.bool32()?,
            }
        }
        Opcode::DrawCanvas => {
            let x = r.i32()?;
            let y = r.i32()?;
            let cols = r.extent()?;
            let rows = r.extent()?;
            let px_w = r.extent()?;
            let px_h = r.extent()?;
            let blob_id = require_nonzero(r.u32()?)?;
            if cols == 0 || rows == 0 || px_w == 0 || px_h == 0 {
                return Err(Error::Format("canvas extent zero"));
            }
            let blitter = match r.u32()? {
                0 => Blitter::HalfBlock,
                1 => Blitter::Quadrant,
                2 => Blitter::Braille,
                _ => return Err(Error::Format("canvas blitter out of range")),
            };
            r.reserved_zero()?;
            Command::DrawCanvas {
                x,
                y,
                cols,
                rows,
                px_w,
                px_h,
                blob_id,
                blitter,
            }
        }
        Opcode::DrawImage => {
            let x = r.i32()?;
            let y = r.i32()?;
            let cols = r.extent()?;
            let rows = r.extent()?;
            let px_w = r.extent()?;
            let px_h = r.extent()?;
            let blob_id = require_nonzero(r.u32()?)?;
            let image_id = require_nonzero(r.u32()?)?;
            let format = match r.u32()? {
                0 => ImageFormat::Rgba8,
                1 => ImageFormat::Png,
                _ => return Err(Error::Format("image format out of range")),
            };
            let protocol = match r.u32()? {
                0 => ImageProtocol::Auto,
                1 => ImageProtocol::Kitty,
                2 => ImageProtocol::Iterm2,
                3 => ImageProtocol::Sixel,
                _ => return Err(Error::Format("image protocol out of range")),
            };
            let z_layer = r.i32()?;
            if !(-1..=1).contains(&z_layer) {
                return Err(Error::Format("image z layer out of range"));
            }
            let fit = match r.u32()? {
                0 => FitMode::Stretch,
                1 => FitMode::Contain,
                2 => FitMode::Cover,
                3 => FitMode::None,
                _ => return Err(Error::Format("image fit mode out of range")),
            };
            r.reserved_zero()?;
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
            }
        }
        Opcode::DefString | Opcode::DefBlob => {
            let id = require_nonzero(r.u32()?)?;
            let byte_len = r.u32()? as usize;
            let data_start = r.pos;
            let padded = align4(byte_len);
            if payload.len() != data_start + padded {
                return Err(Error::Format("define payload size mismatch"));
            }
            let bytes = &payload[data_start..data_start + byte_len];
            if payload[data_start + byte_len..].iter().any(|&b| b != 0) {
                return Err(Error::Format("define padding nonzero"));
            }
            return Ok(if opcode == Opcode::DefString {
                Command::DefString { id, bytes }
            } else {
                Command::DefBlob { id, bytes }
            });
        }
        Opcode::FreeString => Command::FreeString {
            id: require_nonzero(r.u32()?)?,
        },
        Opcode::FreeBlob => Command::FreeBlob {
            id: require_nonzero(r.u32()?)?,
        },
    };
    r.finish()?;
    Ok(cmd)
}

/// Decode one DRAW_TEXT_RUN segment: `style + string_id + byte_off +
/// byte_len`, exactly [`TEXT_RUN_SEGMENT_SIZE`] bytes.
pub fn decode_text_run_segment(bytes: &[u8]) -> Result<(WireStyle, u32, u32, u32)> {
    if bytes.len() != TEXT_RUN_SEGMENT_SIZE {
        return Err(Error::Format("text run segment size mismatch"));
    }
    let mut r = Reader::new(bytes);
    let style = r.style()?;
    let string_id = require_nonzero(r.u32()?)?;
    let byte_off = r.u32()?;
    let byte_len = r.u32()?;
    r.finish()?;
    Ok((style, string_id, byte_off, byte_len))
}

#[inline]
fn require_nonzero(id: u32) -> Result<u32> {
    if id == 0 {
        Err(Error::Format("resource id must be nonzero"))
    } else {
        Ok(id)
    }
}

/// Read a little-endian u32 at `off`; caller guarantees bounds.
#[inline]
pub fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
