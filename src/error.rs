//! Error types for the pptx-downsizer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DownsizeError`] — **Fatal**: the run cannot proceed at all (missing
//!   input, corrupt archive, invalid option, output already present). Returned
//!   as `Err(DownsizeError)` from the top-level `downsize*` functions.
//!
//! * [`MediaError`] — **Non-fatal**: a single embedded image could not be
//!   decoded or re-encoded. Under [`crate::config::OnError::Continue`] it is
//!   stored inside [`crate::output::MediaResult`] and the original file is
//!   kept; under [`crate::config::OnError::Raise`] it is promoted to
//!   [`DownsizeError::EncodeFailure`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pptx-downsizer library.
#[derive(Debug, Error)]
pub enum DownsizeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Presentation not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a zip container.
    #[error("File is not a pptx/zip container: '{path}'\nFirst bytes: {magic:?}")]
    NotAZip { path: PathBuf, magic: [u8; 4] },

    // ── Archive errors ────────────────────────────────────────────────────
    /// The zip central directory or an entry could not be read.
    #[error("Archive '{path}' is corrupt: {detail}")]
    ArchiveCorrupt { path: PathBuf, detail: String },

    // ── Image errors ──────────────────────────────────────────────────────
    /// An image failed to convert and the error policy is `raise`.
    #[error("Failed to convert '{name}': {source}\nUse --on-error continue to skip failing images.")]
    EncodeFailure {
        name: String,
        #[source]
        source: MediaError,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output file exists and the policy forbids replacing it.
    #[error("Output file already exists: '{path}'\nMove it away or pass --overwrite.")]
    OutputExists { path: PathBuf },

    /// Could not create or write the output archive.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation or option parsing failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem error inside the temporary workspace.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DownsizeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownsizeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal error for a single embedded image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum MediaError {
    /// The source bytes could not be decoded as a raster image.
    #[error("{name}: decode failed: {detail}")]
    DecodeFailed { name: String, detail: String },

    /// The transformed image could not be encoded to the target format.
    #[error("{name}: encode to {format} failed: {detail}")]
    EncodeFailed {
        name: String,
        format: String,
        detail: String,
    },

    /// The encoded bytes could not be written back to the workspace.
    #[error("{name}: write failed: {detail}")]
    WriteFailed { name: String, detail: String },
}

impl MediaError {
    /// Basename of the image the error refers to.
    pub fn name(&self) -> &str {
        match self {
            MediaError::DecodeFailed { name, .. }
            | MediaError::EncodeFailed { name, .. }
            | MediaError::WriteFailed { name, .. } => name,
        }
    }
}
