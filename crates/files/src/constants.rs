//! Storage constants.

/// Hashing algorithm used for content addressing; also the top-level folder name.
pub const HASH_ALGORITHM: &str = "sha256";
