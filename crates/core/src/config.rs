//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment
//! variables.

use crate::constants::{FILES_DIR_NAME, RECORDS_DIR_NAME};
use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    public_base_url: String,
    max_revision_requests: Option<u32>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the base URL is not an absolute http(s) URL or
    /// the revision cap is zero.
    pub fn new(
        data_dir: PathBuf,
        public_base_url: String,
        max_revision_requests: Option<u32>,
    ) -> CoreResult<Self> {
        let public_base_url = public_base_url.trim().trim_end_matches('/').to_owned();
        if !(public_base_url.starts_with("http://") || public_base_url.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "public base URL must start with http:// or https://, got '{public_base_url}'"
            )));
        }

        if max_revision_requests == Some(0) {
            return Err(CoreError::Validation(
                "max_revision_requests must be at least 1 when set".into(),
            ));
        }

        Ok(Self {
            data_dir,
            public_base_url,
            max_revision_requests,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join(RECORDS_DIR_NAME)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join(FILES_DIR_NAME)
    }

    /// Base URL without a trailing slash.
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// `None` means revision requests are unbounded.
    pub fn max_revision_requests(&self) -> Option<u32> {
        self.max_revision_requests
    }

    /// Create the records and files directories if they are missing.
    pub fn ensure_layout(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.records_dir()).map_err(CoreError::StorageDirCreation)?;
        std::fs::create_dir_all(self.files_dir()).map_err(CoreError::StorageDirCreation)?;
        Ok(())
    }
}

/// Parse the revision cap from an optional environment value.
///
/// `None`, empty, or whitespace means unbounded.
pub fn max_revision_requests_from_env_value(value: Option<String>) -> CoreResult<Option<u32>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    value
        .map(|v| {
            v.parse::<u32>().map_err(|_| {
                CoreError::Validation(format!(
                    "max revision requests must be a positive integer, got '{v}'"
                ))
            })
        })
        .transpose()
}
