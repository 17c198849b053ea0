//! File-backed record store.
//!
//! One YAML file per record, sharded by id:
//!
//! ```text
//! <records_dir>/
//! ├── sequences.yaml
//! ├── cases/
//! │   └── 3f/
//! │       └── a2/
//! │           └── 3fa2…c9.yaml
//! ├── documents/
//! ├── notifications/
//! └── principals/
//! ```
//!
//! Writes go to a sibling temporary file and are renamed into place, so readers never see
//! a partial record. All read-modify-write operations hold a single store-wide lock; plain
//! reads do not take it.

use super::{
    CaseStore, DocumentStore, NotificationStore, PrincipalDirectory, Sequences, StatusUpdate,
};
use crate::constants::{
    CASES_COLLECTION, DOCUMENTS_COLLECTION, NOTIFICATIONS_COLLECTION, PRINCIPALS_COLLECTION,
    RECORD_EXTENSION, SEQUENCES_FILENAME,
};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    AccessLogEntry, Case, CaseContentUpdate, CaseFilter, CaseReport, Document, DocumentUpdate,
    DocumentVersion, Notification, PrincipalRecord,
};
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct YamlRecordStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl YamlRecordStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn new(root: &Path) -> CoreResult<Self> {
        fs::create_dir_all(root).map_err(CoreError::StorageDirCreation)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, collection: &str, id: RecordId) -> PathBuf {
        id.sharded_file(&self.root.join(collection), RECORD_EXTENSION)
    }

    fn read_record<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::FileRead(e)),
        };

        let deserializer = serde_yaml::Deserializer::from_str(&contents);
        match serde_path_to_error::deserialize::<_, T>(deserializer) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                let field = err.path().to_string();
                let field = if field.is_empty() || field == "." {
                    "<root>".to_owned()
                } else {
                    field
                };
                Err(CoreError::YamlDeserialization {
                    path: format!("{} ({field})", path.display()),
                    source: err.into_inner(),
                })
            }
        }
    }

    fn write_record<T: Serialize>(path: &Path, record: &T) -> CoreResult<()> {
        let yaml = serde_yaml::to_string(record).map_err(CoreError::YamlSerialization)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CoreError::StorageDirCreation)?;
        }

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, yaml).map_err(CoreError::FileWrite)?;
        fs::rename(&tmp_path, path).map_err(CoreError::FileWrite)?;
        Ok(())
    }

    fn insert<T: Serialize>(&self, collection: &str, id: RecordId, record: &T) -> CoreResult<()> {
        let path = self.record_path(collection, id);
        let _guard = self.write_lock.lock();

        if path.exists() {
            return Err(CoreError::Conflict(format!(
                "{collection} record {id} already exists"
            )));
        }
        Self::write_record(&path, record)
    }

    fn find<T: DeserializeOwned>(&self, collection: &str, id: RecordId) -> CoreResult<Option<T>> {
        Self::read_record(&self.record_path(collection, id))
    }

    /// Loads, mutates and rewrites one record under the store lock.
    ///
    /// The record is not rewritten if `mutate` fails.
    fn modify<T, F>(
        &self,
        collection: &str,
        entity: &'static str,
        id: RecordId,
        mutate: F,
    ) -> CoreResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        let path = self.record_path(collection, id);
        let _guard = self.write_lock.lock();

        let mut record: T =
            Self::read_record(&path)?.ok_or_else(|| CoreError::not_found(entity, id))?;
        mutate(&mut record)?;
        Self::write_record(&path, &record)?;
        Ok(record)
    }

    /// Every parseable record in `collection`. Unreadable files are logged and skipped.
    fn list<T: DeserializeOwned>(&self, collection: &str) -> CoreResult<Vec<T>> {
        let base = self.root.join(collection);
        let mut records = Vec::new();

        let s1_iter = match fs::read_dir(&base) {
            Ok(it) => it,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(CoreError::FileRead(e)),
        };

        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }
            let Ok(s2_iter) = fs::read_dir(&s1_path) else {
                continue;
            };

            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }
                let Ok(file_iter) = fs::read_dir(&s2_path) else {
                    continue;
                };

                for file in file_iter.flatten() {
                    let path = file.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                        continue;
                    }
                    match Self::read_record::<T>(&path) {
                        Ok(Some(record)) => records.push(record),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("skipping unreadable record {}: {e}", path.display())
                        }
                    }
                }
            }
        }

        Ok(records)
    }
}

fn live_case(case: &Case) -> CoreResult<()> {
    if case.deleted {
        return Err(CoreError::not_found("case", case.id));
    }
    Ok(())
}

fn live_document(document: &Document) -> CoreResult<()> {
    if document.deleted {
        return Err(CoreError::not_found("document", document.id));
    }
    Ok(())
}

impl Sequences for YamlRecordStore {
    fn next_sequence(&self, name: &str) -> CoreResult<u64> {
        let path = self.root.join(SEQUENCES_FILENAME);
        let _guard = self.write_lock.lock();

        let mut counters: BTreeMap<String, u64> = Self::read_record(&path)?.unwrap_or_default();
        let next = counters.get(name).copied().unwrap_or(0) + 1;
        counters.insert(name.to_owned(), next);
        Self::write_record(&path, &counters)?;
        Ok(next)
    }
}

impl CaseStore for YamlRecordStore {
    fn insert_case(&self, case: &Case) -> CoreResult<()> {
        self.insert(CASES_COLLECTION, case.id, case)
    }

    fn find_case(&self, id: RecordId) -> CoreResult<Option<Case>> {
        self.find(CASES_COLLECTION, id)
    }

    fn list_cases(&self, filter: &CaseFilter) -> CoreResult<Vec<Case>> {
        let mut cases: Vec<Case> = self
            .list(CASES_COLLECTION)?
            .into_iter()
            .filter(|case| filter.matches(case))
            .collect();
        cases.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.case_number.cmp(&b.case_number))
        });
        Ok(cases)
    }

    fn update_status_atomic(&self, id: RecordId, update: &StatusUpdate) -> CoreResult<Case> {
        self.modify(CASES_COLLECTION, "case", id, |case: &mut Case| {
            live_case(case)?;
            case.apply_transition(update)
        })
    }

    fn update_content(
        &self,
        id: RecordId,
        update: &CaseContentUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Case> {
        self.modify(CASES_COLLECTION, "case", id, |case: &mut Case| {
            live_case(case)?;
            if !case.status.is_editable() {
                return Err(CoreError::InvalidStateTransition(format!(
                    "case {} is {} and can no longer be edited",
                    case.case_number, case.status
                )));
            }
            update.apply_to(&mut case.content)?;
            case.updated_at = now;
            Ok(())
        })
    }

    fn set_report(&self, id: RecordId, report: CaseReport) -> CoreResult<Case> {
        self.modify(CASES_COLLECTION, "case", id, |case: &mut Case| {
            live_case(case)?;
            case.updated_at = report.generated_at;
            case.report = Some(report);
            Ok(())
        })
    }

    fn mark_case_deleted(&self, id: RecordId, now: DateTime<Utc>) -> CoreResult<Case> {
        self.modify(CASES_COLLECTION, "case", id, |case: &mut Case| {
            live_case(case)?;
            case.deleted = true;
            case.updated_at = now;
            Ok(())
        })
    }
}

impl DocumentStore for YamlRecordStore {
    fn insert_document(&self, document: &Document) -> CoreResult<()> {
        self.insert(DOCUMENTS_COLLECTION, document.id, document)
    }

    fn find_document(&self, id: RecordId) -> CoreResult<Option<Document>> {
        self.find(DOCUMENTS_COLLECTION, id)
    }

    fn list_documents(&self) -> CoreResult<Vec<Document>> {
        let mut documents: Vec<Document> = self
            .list(DOCUMENTS_COLLECTION)?
            .into_iter()
            .filter(|d: &Document| !d.deleted)
            .collect();
        documents.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.document_number.cmp(&b.document_number))
        });
        Ok(documents)
    }

    fn append_version(&self, id: RecordId, version: DocumentVersion) -> CoreResult<Document> {
        self.modify(DOCUMENTS_COLLECTION, "document", id, |doc: &mut Document| {
            live_document(doc)?;
            let expected = doc.current_version + 1;
            if version.version != expected {
                return Err(CoreError::Conflict(format!(
                    "document {} expected version {expected}, got {}",
                    doc.document_number, version.version
                )));
            }
            doc.current_version = version.version;
            doc.updated_at = version.uploaded_at;
            doc.versions.push(version);
            Ok(())
        })
    }

    fn update_document(
        &self,
        id: RecordId,
        update: &DocumentUpdate,
        now: DateTime<Utc>,
    ) -> CoreResult<Document> {
        self.modify(DOCUMENTS_COLLECTION, "document", id, |doc: &mut Document| {
            live_document(doc)?;
            if let Some(title) = &update.title {
                doc.title = NonEmptyText::new(title)
                    .map_err(|_| CoreError::Validation("document title cannot be empty".into()))?;
            }
            if let Some(description) = &update.description {
                let description = description.trim();
                doc.description = (!description.is_empty()).then(|| description.to_owned());
            }
            if let Some(access_control) = &update.access_control {
                doc.access_control = access_control.clone();
            }
            doc.updated_at = now;
            Ok(())
        })
    }

    fn append_access_log(&self, id: RecordId, entry: AccessLogEntry) -> CoreResult<()> {
        self.modify(DOCUMENTS_COLLECTION, "document", id, |doc: &mut Document| {
            doc.access_logs.push(entry);
            Ok(())
        })
        .map(|_| ())
    }

    fn mark_document_deleted(&self, id: RecordId, now: DateTime<Utc>) -> CoreResult<Document> {
        self.modify(DOCUMENTS_COLLECTION, "document", id, |doc: &mut Document| {
            live_document(doc)?;
            doc.deleted = true;
            doc.updated_at = now;
            Ok(())
        })
    }
}

impl NotificationStore for YamlRecordStore {
    fn insert_notification(&self, notification: &Notification) -> CoreResult<()> {
        self.insert(NOTIFICATIONS_COLLECTION, notification.id, notification)
    }

    fn find_notification(&self, id: RecordId) -> CoreResult<Option<Notification>> {
        self.find(NOTIFICATIONS_COLLECTION, id)
    }

    fn list_notifications(
        &self,
        recipient: RecordId,
        unread_only: bool,
    ) -> CoreResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .list(NOTIFICATIONS_COLLECTION)?
            .into_iter()
            .filter(|n: &Notification| n.recipient == recipient && !(unread_only && n.is_read))
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    fn mark_notification_read(&self, id: RecordId) -> CoreResult<Notification> {
        self.modify(
            NOTIFICATIONS_COLLECTION,
            "notification",
            id,
            |n: &mut Notification| {
                n.is_read = true;
                Ok(())
            },
        )
    }

    fn mark_notification_emailed(&self, id: RecordId) -> CoreResult<Notification> {
        self.modify(
            NOTIFICATIONS_COLLECTION,
            "notification",
            id,
            |n: &mut Notification| {
                n.email_sent = true;
                Ok(())
            },
        )
    }
}

impl PrincipalDirectory for YamlRecordStore {
    fn insert_principal(&self, principal: &PrincipalRecord) -> CoreResult<()> {
        self.insert(PRINCIPALS_COLLECTION, principal.id, principal)
    }

    fn find_principal(&self, id: RecordId) -> CoreResult<Option<PrincipalRecord>> {
        self.find(PRINCIPALS_COLLECTION, id)
    }

    fn list_principals(&self) -> CoreResult<Vec<PrincipalRecord>> {
        let mut principals: Vec<PrincipalRecord> = self.list(PRINCIPALS_COLLECTION)?;
        principals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(principals)
    }

    fn set_principal_active(&self, id: RecordId, active: bool) -> CoreResult<PrincipalRecord> {
        self.modify(
            PRINCIPALS_COLLECTION,
            "principal",
            id,
            |p: &mut PrincipalRecord| {
                p.active = active;
                Ok(())
            },
        )
    }
}
