//! Centralized error handling for pipearc.
//!
//! Every failure an archive can produce is one variant of [`ArchiveError`];
//! the taxonomy is closed on purpose. Decoding never panics and never
//! surfaces anything outside this enum.
//!
//! ## Propagation rules
//!
//! - **Construction errors** ([`ArchiveError::BadMagic`],
//!   [`ArchiveError::UnsupportedVersion`], [`ArchiveError::DuplicateChunk`],
//!   [`ArchiveError::UnknownChunkType`], I/O failures while reading the
//!   header or chunk table) are fatal: construction fails and no archive
//!   instance exists.
//! - **Per-entry errors** (everything the unpack operations return) are
//!   logged diagnostics plus an `Err` from that call. They never invalidate
//!   the archive, and a failed unpack never populates a cache, so a
//!   subsequent call may retry.
//!
//! The type is `Clone` so errors can be stored or shared across threads;
//! `io::Error` is wrapped in an `Arc` to keep cloning cheap.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::format::{Backend, ChunkType};

/// A specialized `Result` type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// The closed error taxonomy covering every failure domain in pipearc.
#[derive(Debug, Clone)]
pub enum ArchiveError {
    /// The file does not start with the archive magic number.
    BadMagic {
        /// The value found at offset 0.
        found: u32,
    },

    /// The archive version does not exactly match the compiled-in version.
    /// Forward compatibility is refused, not negotiated.
    UnsupportedVersion {
        /// Version stored in the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// Two chunks with the same type tag; at most one chunk per type.
    DuplicateChunk(ChunkType),

    /// A chunk header carried a type tag outside the known set.
    UnknownChunkType(u32),

    /// A resource directory already contains this name. Names are unique
    /// within a kind (kinds are independent namespaces).
    DuplicateName(String),

    /// The named resource is not present in the requested directory.
    NotFound {
        /// Human-readable resource kind ("graphics pipeline", ...).
        kind: &'static str,
        /// The name that was looked up.
        name: String,
    },

    /// An entry's stored type tag does not match the requested kind.
    TypeMismatch {
        /// The kind the caller asked for.
        expected: ChunkType,
        /// The tag stored in the entry header.
        found: u32,
    },

    /// The serialized data ended prematurely, an offset fell outside the
    /// file, or a field held an out-of-range value. This is the decode
    /// failure variant and spans every decode boundary.
    DecodeUnderflow(String),

    /// The entry carries no data block for the reader's backend.
    MissingBackendData(Backend),

    /// A mutation callback altered a field that is locked against
    /// modification (pipeline type, resource layout, signature list).
    IllegalModification(&'static str),

    /// A signature set violates the layout rules: binding indices must
    /// densely fill `[0, N)` and stay below the signature limit, and
    /// per-backend register budgets must hold.
    InvalidSignatureLayout(String),

    /// The device failed to construct a shader, pipeline, render pass or
    /// signature from otherwise valid archive data.
    DeviceConstructionFailed(String),

    /// Low-level failure of the underlying byte source.
    Io(Arc<io::Error>),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { found } => {
                write!(f, "archive magic number 0x{found:08x} is incorrect")
            }
            Self::UnsupportedVersion { found, expected } => {
                write!(
                    f,
                    "archive version {found} is not supported; expected version {expected}"
                )
            }
            Self::DuplicateChunk(ty) => {
                write!(f, "multiple chunks with type {ty:?} are not allowed")
            }
            Self::UnknownChunkType(raw) => write!(f, "unknown chunk type ({raw})"),
            Self::DuplicateName(name) => {
                write!(f, "resource with name '{name}' already exists")
            }
            Self::NotFound { kind, name } => {
                write!(f, "{kind} with name '{name}' is not present in the archive")
            }
            Self::TypeMismatch { expected, found } => {
                write!(
                    f,
                    "invalid resource header: expected type {expected:?}, found tag {found}"
                )
            }
            Self::DecodeUnderflow(msg) => write!(f, "decode error: {msg}"),
            Self::MissingBackendData(backend) => {
                write!(f, "device specific data is not specified for {backend:?}")
            }
            Self::IllegalModification(field) => {
                write!(f, "modifying {field} is not allowed")
            }
            Self::InvalidSignatureLayout(msg) => {
                write!(f, "invalid signature layout: {msg}")
            }
            Self::DeviceConstructionFailed(msg) => {
                write!(f, "device object construction failed: {msg}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_cloneable() {
        let err = ArchiveError::from(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        let cloned = err.clone();
        assert!(cloned.to_string().contains("disk on fire"));
    }

    #[test]
    fn display_names_the_resource() {
        let err = ArchiveError::NotFound {
            kind: "render pass",
            name: "MainPass".into(),
        };
        assert_eq!(
            err.to_string(),
            "render pass with name 'MainPass' is not present in the archive"
        );
    }
}
