//! Error kinds surfaced by top-level engine entries.
//!
//! Every failing call is a no-op on observable state: internal helpers
//! propagate these verbatim and never log.

use thiserror::Error;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Null-equivalent input, shape mismatch, invalid enum, negative length.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A caller-supplied capacity was exceeded (output buffer, clip depth,
    /// damage rect cap, resource count, payload ring).
    #[error("limit exceeded: {0}")]
    Limit(&'static str),

    /// Drawlist wire-format violation (magic, alignment, overlap,
    /// reserved-nonzero, out-of-range index, nonzero padding) or a lookup of
    /// an undefined resource.
    #[error("format violation: {0}")]
    Format(&'static str),

    /// Opcode or wire version not enabled at create time, or a capability
    /// mismatch on a runtime-config update.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Allocation failure during resize or initial setup.
    #[error("allocation failure: {0}")]
    Oom(&'static str),

    /// Platform I/O failure at the orchestrator boundary.
    #[error("platform i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable discriminant name, used by logs and the packed batch writer.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Limit(_) => "LIMIT",
            Self::Format(_) => "FORMAT",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::Oom(_) => "OOM",
            Self::Io(_) => "IO",
        }
    }
}
