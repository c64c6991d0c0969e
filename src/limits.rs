//! Caller-supplied limits bounding every validated and allocated quantity.

use crate::error::{Error, Result};

/// Hard caps applied to drawlist validation, diff rendering, and the arenas.
///
/// Every field must be positive; a zero anywhere is rejected at engine
/// creation with `INVALID_ARGUMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum accepted drawlist buffer length in bytes.
    pub dl_max_total_bytes: u32,
    /// Maximum command count per drawlist.
    pub dl_max_cmds: u32,
    /// Maximum string resources (per drawlist section and in the store).
    pub dl_max_strings: u32,
    /// Maximum blob resources (per drawlist section and in the store).
    pub dl_max_blobs: u32,
    /// Maximum clip-stack pushes beyond the initial full-bounds entry.
    pub dl_max_clip_depth: u32,
    /// Maximum segments in one DRAW_TEXT_RUN blob.
    pub dl_max_text_run_segments: u32,
    /// Maximum coalesced damage rectangles before full-frame fallback.
    pub diff_max_damage_rects: u32,
    /// Output buffer capacity per present; overflow fails with LIMIT.
    pub out_max_bytes_per_frame: u32,
    /// Initial per-frame arena reservation.
    pub arena_initial_bytes: u32,
    /// Per-frame arena growth ceiling.
    pub arena_max_total_bytes: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            dl_max_total_bytes: 1 << 20,
            dl_max_cmds: 65_536,
            dl_max_strings: 4_096,
            dl_max_blobs: 1_024,
            dl_max_clip_depth: 32,
            dl_max_text_run_segments: 256,
            diff_max_damage_rects: 256,
            out_max_bytes_per_frame: 2 << 20,
            arena_initial_bytes: 64 << 10,
            arena_max_total_bytes: 16 << 20,
        }
    }
}

impl Limits {
    /// Reject zeroes; every limit requires a positive value.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            self.dl_max_total_bytes,
            self.dl_max_cmds,
            self.dl_max_strings,
            self.dl_max_blobs,
            self.dl_max_clip_depth,
            self.dl_max_text_run_segments,
            self.diff_max_damage_rects,
            self.out_max_bytes_per_frame,
            self.arena_initial_bytes,
            self.arena_max_total_bytes,
        ];
        if fields.iter().any(|&v| v == 0) {
            return Err(Error::InvalidArgument("limit fields must be positive"));
        }
        if self.arena_initial_bytes > self.arena_max_total_bytes {
            return Err(Error::InvalidArgument(
                "arena_initial_bytes exceeds arena_max_total_bytes",
            ));
        }
        Ok(())
    }
}
