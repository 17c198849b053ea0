//! Record identifiers and sharded-path utilities.
//!
//! Casebook stores every record (cases, documents, notifications, principals) under a
//! sharded path derived from its identifier. Identifiers use a *canonical* representation:
//! **32 lowercase hexadecimal characters** (no hyphens), the same value as
//! `Uuid::new_v4().simple().to_string()`.
//!
//! ## Sharded layout
//! For a canonical id `u`, a record lives under `parent_dir/<u[0..2]>/<u[2..4]>/`.
//!
//! Example:
//! `casebook_data/cases/55/0e/550e8400e29b41d4a716446655440000.yaml`

mod service;

pub use service::{RecordId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
