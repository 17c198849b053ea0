//! Constants used throughout the Casebook core crate.
//!
//! Path and filename constants live here so the on-disk layout is defined in one place.

/// Default directory for record storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "casebook_data";

/// Default base URL embedded in report verification links.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

/// Directory for structured YAML records, under the data directory.
pub const RECORDS_DIR_NAME: &str = "records";

/// Directory for content-addressed blobs, under the data directory.
pub const FILES_DIR_NAME: &str = "files";

pub const CASES_COLLECTION: &str = "cases";
pub const DOCUMENTS_COLLECTION: &str = "documents";
pub const NOTIFICATIONS_COLLECTION: &str = "notifications";
pub const PRINCIPALS_COLLECTION: &str = "principals";

/// Filename holding the named sequence counters, under the records directory.
pub const SEQUENCES_FILENAME: &str = "sequences.yaml";

/// Extension of every record file.
pub const RECORD_EXTENSION: &str = "yaml";

pub const CASE_NUMBER_PREFIX: &str = "CASE";
pub const DOCUMENT_NUMBER_PREFIX: &str = "DOC";

/// Length of the human-typable access code printed beside a report's QR code.
pub const QR_CODE_LENGTH: usize = 12;
