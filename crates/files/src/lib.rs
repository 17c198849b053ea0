//! Casebook blob storage
//!
//! Content-addressed storage for document versions and rendered report artifacts. The
//! rest of the system treats it as an opaque store keyed by a relative path.
//!
//! ## Design Principles
//!
//! - Structured records (cases, documents) and binary bytes are kept apart
//! - Blobs are immutable once written; new content produces a new path
//! - Identical content is stored once
//! - Paths handed out are relative to the blob root and validated on the way back in
//!
//! ## Layout
//!
//! ```text
//! <data_dir>/files/
//! └── sha256/
//!     └── ab/
//!         └── cd/
//!             └── abcd3f9e…
//! ```

mod constants;
mod files;

pub use constants::HASH_ALGORITHM;
pub use files::{FileMetadata, FilesService, Sha256Hash};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No blob is stored at the requested path
    #[error("File not found: {0}")]
    NotFound(String),

    /// Stored bytes no longer match their content hash
    #[error("Integrity check failed for {0}")]
    IntegrityMismatch(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
