//! Persistence contracts.
//!
//! The services only talk to these traits. Every mutating method is a single
//! read-check-write unit: implementations must make the check and the write atomic with
//! respect to other writers of the same record.

mod yaml;

pub use yaml::YamlRecordStore;

use crate::error::CoreResult;
use crate::models::{
    AccessLogEntry, Case, CaseContentUpdate, CaseFilter, CaseReport, Document, DocumentUpdate,
    DocumentVersion, Notification, PrincipalRecord,
};
use casebook_policy::Role;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use casebook_workflow::{CaseStatus, HistoryEntry, TransitionEffect, TransitionPlan};
use chrono::{DateTime, Utc};

/// A compare-and-swap status change with the fields committed alongside it.
///
/// `expected_history_len` pins the exact snapshot the plan was checked against: every
/// committed transition appends one history entry, so a case that went round the cycle
/// back to `expected` no longer matches.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    pub expected: CaseStatus,
    pub expected_history_len: usize,
    pub next: CaseStatus,
    pub history: HistoryEntry,
    pub effect: TransitionEffect,
}

impl StatusUpdate {
    /// Commit data for `plan`, which was checked against `snapshot`.
    pub fn planned(plan: TransitionPlan, snapshot: &Case) -> Self {
        Self {
            expected: plan.from,
            expected_history_len: snapshot.workflow_history.len(),
            next: plan.to,
            history: plan.history,
            effect: plan.effect,
        }
    }
}

/// Named monotonically increasing counters used for human-readable numbers.
pub trait Sequences: Send + Sync {
    /// Returns the next value of `name`, starting at 1.
    fn next_sequence(&self, name: &str) -> CoreResult<u64>;
}

pub trait CaseStore: Sequences {
    fn insert_case(&self, case: &Case) -> CoreResult<()>;

    fn find_case(&self, id: RecordId) -> CoreResult<Option<Case>>;

    /// Non-deleted cases matching `filter`, oldest first.
    fn list_cases(&self, filter: &CaseFilter) -> CoreResult<Vec<Case>>;

    /// Applies `update` only if the stored status and history length still equal the
    /// snapshot the update was planned against.
    ///
    /// The loser of a race receives `CoreError::InvalidStateTransition` and the record is
    /// left untouched.
    fn update_status_atomic(&self, id: RecordId, update: &StatusUpdate) -> CoreResult<Case>;

    /// Applies a content update only while the stored status is editable.
    fn update_content(
        &self,
        id: RecordId,
        update: &CaseContentUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Case>;

    fn set_report(&self, id: RecordId, report: CaseReport) -> CoreResult<Case>;

    fn mark_case_deleted(&self, id: RecordId, now: DateTime<Utc>) -> CoreResult<Case>;
}

pub trait DocumentStore: Sequences {
    fn insert_document(&self, document: &Document) -> CoreResult<()>;

    fn find_document(&self, id: RecordId) -> CoreResult<Option<Document>>;

    /// Non-deleted documents, oldest first.
    fn list_documents(&self) -> CoreResult<Vec<Document>>;

    /// Appends `version`, which must be exactly one past the stored current version.
    ///
    /// Returns `CoreError::Conflict` otherwise; existing versions are never rewritten.
    fn append_version(&self, id: RecordId, version: DocumentVersion) -> CoreResult<Document>;

    fn update_document(
        &self,
        id: RecordId,
        update: &DocumentUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Document>;

    fn append_access_log(&self, id: RecordId, entry: AccessLogEntry) -> CoreResult<()>;

    fn mark_document_deleted(&self, id: RecordId, now: DateTime<Utc>) -> CoreResult<Document>;
}

pub trait NotificationStore: Send + Sync {
    fn insert_notification(&self, notification: &Notification) -> CoreResult<()>;

    fn find_notification(&self, id: RecordId) -> CoreResult<Option<Notification>>;

    /// Newest first.
    fn list_notifications(
        &self,
        recipient: RecordId,
        unread_only: bool,
    ) -> CoreResult<Vec<Notification>>;

    fn mark_notification_read(&self, id: RecordId) -> CoreResult<Notification>;

    fn mark_notification_emailed(&self, id: RecordId) -> CoreResult<Notification>;
}

pub trait PrincipalDirectory: Send + Sync {
    fn insert_principal(&self, principal: &PrincipalRecord) -> CoreResult<()>;

    fn find_principal(&self, id: RecordId) -> CoreResult<Option<PrincipalRecord>>;

    fn list_principals(&self) -> CoreResult<Vec<PrincipalRecord>>;

    fn set_principal_active(&self, id: RecordId, active: bool) -> CoreResult<PrincipalRecord>;

    /// Principals holding `role`, restricted to `department` when given.
    fn find_by_role(
        &self,
        role: Role,
        department: Option<&NonEmptyText>,
    ) -> CoreResult<Vec<PrincipalRecord>> {
        Ok(self
            .list_principals()?
            .into_iter()
            .filter(|p| p.role == role)
            .filter(|p| department.map_or(true, |d| p.department.as_ref() == Some(d)))
            .collect())
    }
}
