//! Blob storage service implementation
//!
//! [`FilesService`] stores byte buffers under a path derived from their SHA-256 digest
//! and reads them back by that path.
//!
//! # Content Addressing
//!
//! - **Deduplication**: identical uploads resolve to the same stored blob
//! - **Integrity**: reads re-hash the bytes and compare with the path
//! - **Immutability**: an existing blob is never overwritten
//! - **Deterministic paths**: the same content always produces the same path
//!
//! # Security Model
//!
//! Relative paths coming back from callers are parsed strictly as
//! `sha256/<2 hex>/<2 hex>/<64 hex>`, so they cannot escape the blob root.

use crate::{FilesError, HASH_ALGORITHM};
use casebook_types::NonEmptyText;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Hash(String);

impl Sha256Hash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn parse(input: &str) -> Result<Self, FilesError> {
        if input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            Ok(Self(input.to_owned()))
        } else {
            Err(FilesError::InvalidPath(format!(
                "not a sha256 hex digest: {input}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sha256Hash {
    type Error = FilesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Sha256Hash::parse(&value)
    }
}

impl From<Sha256Hash> for String {
    fn from(value: Sha256Hash) -> Self {
        value.0
    }
}

/// Metadata for a stored blob.
///
/// Serialised alongside the record that references the blob (a document version or a
/// case report), never on its own.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Hashing algorithm used (always "sha256")
    pub hash_algorithm: String,

    /// Hexadecimal digest of the file content
    pub hash: Sha256Hash,

    /// Path relative to the blob root; the key for [`FilesService::read`]
    pub relative_path: String,

    pub size_bytes: u64,

    /// Detected media type (MIME type), best-effort
    pub media_type: Option<NonEmptyText>,

    /// Filename supplied by the uploader
    pub original_filename: NonEmptyText,

    pub stored_at: DateTime<Utc>,
}

/// Service for storing and reading blobs under one root directory.
#[derive(Debug, Clone)]
pub struct FilesService {
    root_directory: PathBuf,
}

impl FilesService {
    /// Creates a new `FilesService` rooted at `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the root does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Not an existing directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Stores `bytes` and returns metadata whose `relative_path` addresses them.
    ///
    /// Storing content that is already present does not rewrite it; the returned
    /// metadata points at the existing blob.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the filename is empty or the blob cannot be written.
    pub fn store(
        &self,
        bytes: &[u8],
        original_filename: &str,
    ) -> Result<FileMetadata, FilesError> {
        let original_filename = NonEmptyText::new(
            Path::new(original_filename.trim())
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default(),
        )
        .map_err(|_| FilesError::InvalidPath("filename cannot be empty".into()))?;

        let hash = Sha256Hash::of(bytes);
        let relative_path = Self::relative_path_for(&hash);
        let storage_path = self.root_directory.join(&relative_path);

        if !storage_path.exists() {
            if let Some(parent) = storage_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    FilesError::Io(std::io::Error::new(
                        e.kind(),
                        format!(
                            "Failed to create storage directory {}: {}",
                            parent.display(),
                            e
                        ),
                    ))
                })?;
            }

            // The final path only ever holds complete blobs.
            let tmp_path = storage_path.with_extension("partial");
            fs::write(&tmp_path, bytes)?;
            fs::rename(&tmp_path, &storage_path)?;
        }

        let media_type =
            infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(FileMetadata {
            hash_algorithm: HASH_ALGORITHM.to_owned(),
            hash,
            relative_path,
            size_bytes: bytes.len() as u64,
            media_type,
            original_filename,
            stored_at: Utc::now(),
        })
    }

    /// Reads the blob stored at `relative_path` and verifies its hash.
    ///
    /// # Errors
    ///
    /// - `FilesError::InvalidPath` if the path is not one this service hands out
    /// - `FilesError::NotFound` if nothing is stored there
    /// - `FilesError::IntegrityMismatch` if the bytes no longer hash to the path
    pub fn read(&self, relative_path: &str) -> Result<Vec<u8>, FilesError> {
        let hash = Self::parse_relative_path(relative_path)?;
        let storage_path = self.root_directory.join(Self::relative_path_for(&hash));

        if !storage_path.is_file() {
            return Err(FilesError::NotFound(relative_path.to_owned()));
        }

        let bytes = fs::read(&storage_path).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read file from {}: {}", storage_path.display(), e),
            ))
        })?;

        if Sha256Hash::of(&bytes) != hash {
            return Err(FilesError::IntegrityMismatch(relative_path.to_owned()));
        }

        Ok(bytes)
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// `sha256/<shard1>/<shard2>/<hash>`
    fn relative_path_for(hash: &Sha256Hash) -> String {
        let hex = hash.as_str();
        format!("{}/{}/{}/{}", HASH_ALGORITHM, &hex[0..2], &hex[2..4], hex)
    }

    fn parse_relative_path(relative_path: &str) -> Result<Sha256Hash, FilesError> {
        let invalid = || FilesError::InvalidPath(relative_path.to_owned());

        let mut parts = relative_path.split('/');
        let (Some(algorithm), Some(s1), Some(s2), Some(hex), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid());
        };

        let hash = Sha256Hash::parse(hex).map_err(|_| invalid())?;
        if algorithm != HASH_ALGORITHM || s1 != &hex[0..2] || s2 != &hex[2..4] {
            return Err(invalid());
        }
        Ok(hash)
    }
}
