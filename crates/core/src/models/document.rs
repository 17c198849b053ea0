//! Shared documents with append-only versions.

use casebook_files::FileMetadata;
use casebook_policy::{AccessControl, AccessDescriptor};
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub version: u32,
    pub file: FileMetadata,
    pub uploaded_by: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_notes: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    View,
    Download,
}

/// One recorded access. Written after the decision, never consulted by it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub principal: RecordId,
    pub method: AccessMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: RecordId,
    pub document_number: String,
    pub title: NonEmptyText,
    #[serde(default)]
    pub description: Option<String>,
    pub author: RecordId,
    #[serde(default)]
    pub department: Option<NonEmptyText>,
    #[serde(default)]
    pub access_control: AccessControl,
    pub versions: Vec<DocumentVersion>,
    pub current_version: u32,
    #[serde(default)]
    pub access_logs: Vec<AccessLogEntry>,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn descriptor(&self) -> AccessDescriptor<'_> {
        AccessDescriptor {
            author: self.author,
            department: self.department.as_ref(),
            access_control: &self.access_control,
        }
    }

    pub fn version(&self, version: u32) -> Option<&DocumentVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn current(&self) -> Option<&DocumentVersion> {
        self.version(self.current_version)
    }
}

/// Metadata changes. Versions are added through their own operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub access_control: Option<AccessControl>,
}
