//! MeshAdaptError: unified error type for mesh-adapt public APIs.
//!
//! Fallible constructors and I/O entry points return this type. Size
//! mismatches inside bulk kernels are programmer errors and abort via
//! assertions instead of flowing through here.

use thiserror::Error;

/// Unified error type for mesh-adapt operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshAdaptError {
    /// Mesh dimension outside the supported range {2, 3}.
    #[error("unsupported mesh dimension {0} (expected 2 or 3)")]
    UnsupportedDimension(u8),
    /// A tag lookup failed.
    #[error("no tag named `{name}` on dimension {dim}")]
    TagNotFound { dim: u8, name: String },
    /// A tag with this name already exists on the dimension.
    #[error("tag `{name}` already present on dimension {dim}")]
    DuplicateTag { dim: u8, name: String },
    /// Tag array length does not equal `n_ents * ncomps`.
    #[error("tag `{name}`: array length {len} != {nents} ents * {ncomps} comps")]
    TagLengthMismatch {
        name: String,
        len: usize,
        nents: usize,
        ncomps: usize,
    },
    /// A tag was found but holds a different element type than requested.
    #[error("tag `{name}`: stored element type differs from the requested one")]
    TagTypeMismatch { name: String },
    /// Malformed binary mesh stream.
    #[error("binary mesh stream: {0}")]
    BadMeshFile(String),
    /// Malformed VTU input.
    #[error("vtu parse: {0}")]
    BadVtu(String),
    /// Underlying I/O failure (message-only so the error stays comparable).
    #[error("i/o: {0}")]
    Io(String),
}

impl From<std::io::Error> for MeshAdaptError {
    fn from(e: std::io::Error) -> Self {
        MeshAdaptError::Io(e.to_string())
    }
}
