//! Document service: access checks, versioning and access logging around the store.

use super::notifications::{NotificationEvent, NotificationSink, Recipients};
use super::principals::require_active;
use crate::collaborators::{AuditEvent, AuditSink};
use crate::constants::DOCUMENT_NUMBER_PREFIX;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    AccessLogEntry, AccessMethod, Document, DocumentUpdate, DocumentVersion, EntityKind,
    NotificationKind, PrincipalRecord, RelatedEntity,
};
use crate::store::{DocumentStore, PrincipalDirectory};
use casebook_files::FilesService;
use casebook_policy::{can_edit, can_read, evaluate_access, AccessControl, AccessDecision};
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DOCUMENT_SEQUENCE: &str = "document";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Private when omitted.
    #[serde(default)]
    pub access_control: AccessControl,
    pub filename: String,
    #[serde(default)]
    pub change_notes: Option<String>,
}

/// Bytes of one document version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDownload {
    pub version: DocumentVersion,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct DocumentService {
    documents: Arc<dyn DocumentStore>,
    principals: Arc<dyn PrincipalDirectory>,
    files: FilesService,
    notifier: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        principals: Arc<dyn PrincipalDirectory>,
        files: FilesService,
        notifier: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            documents,
            principals,
            files,
            notifier,
            audit,
        }
    }

    fn load(&self, id: RecordId) -> CoreResult<Document> {
        self.documents
            .find_document(id)?
            .filter(|doc| !doc.deleted)
            .ok_or_else(|| CoreError::not_found("document", id))
    }

    fn load_readable(&self, actor: &PrincipalRecord, id: RecordId) -> CoreResult<Document> {
        let document = self.load(id)?;
        if !can_read(&actor.principal(), &document.descriptor()) {
            return Err(CoreError::Authorization(format!(
                "principal {} may not read document {}",
                actor.id, document.document_number
            )));
        }
        Ok(document)
    }

    fn load_editable(&self, actor: &PrincipalRecord, id: RecordId) -> CoreResult<Document> {
        let document = self.load(id)?;
        if !can_edit(&actor.principal(), &document.descriptor()) {
            return Err(CoreError::Authorization(format!(
                "principal {} may not modify document {}",
                actor.id, document.document_number
            )));
        }
        Ok(document)
    }

    /// Records an access. A failed write is logged; it never blocks the access itself.
    fn log_access(
        &self,
        document: &Document,
        actor: RecordId,
        method: AccessMethod,
        ip: Option<String>,
    ) {
        let entry = AccessLogEntry {
            principal: actor,
            method,
            ip,
            at: Utc::now(),
        };
        if let Err(e) = self.documents.append_access_log(document.id, entry) {
            tracing::warn!(document_id = %document.id, "failed to record document access: {e}");
        }
    }

    fn audit(&self, action: &'static str, document: &Document, actor: RecordId, details: String) {
        self.audit.record(&AuditEvent {
            action,
            entity: "document",
            entity_id: document.id,
            actor,
            details,
        });
    }

    /// Creates a document with `bytes` as version 1. The author's department becomes the
    /// document's department.
    pub fn create_document(
        &self,
        actor_id: RecordId,
        input: NewDocument,
        bytes: &[u8],
    ) -> CoreResult<Document> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;
        let title = NonEmptyText::new(&input.title)
            .map_err(|_| CoreError::Validation("document title cannot be empty".into()))?;

        let file = self.files.store(bytes, &input.filename)?;
        let now = Utc::now();
        let sequence = self.documents.next_sequence(DOCUMENT_SEQUENCE)?;

        let document = Document {
            id: RecordId::new(),
            document_number: format!("{DOCUMENT_NUMBER_PREFIX}-{}-{sequence:05}", now.year()),
            title,
            description: input
                .description
                .map(|d| d.trim().to_owned())
                .filter(|d| !d.is_empty()),
            author: actor.id,
            department: actor.department.clone(),
            access_control: input.access_control,
            versions: vec![DocumentVersion {
                version: 1,
                file,
                uploaded_by: actor.id,
                change_notes: input.change_notes,
                uploaded_at: now,
            }],
            current_version: 1,
            access_logs: Vec::new(),
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.documents.insert_document(&document)?;

        tracing::info!(
            document_id = %document.id,
            number = %document.document_number,
            "document created"
        );
        self.audit(
            "document.created",
            &document,
            actor.id,
            document.document_number.clone(),
        );
        Ok(document)
    }

    /// Returns the document if the actor may read it, and logs the view.
    pub fn get_document(
        &self,
        actor_id: RecordId,
        id: RecordId,
        ip: Option<String>,
    ) -> CoreResult<Document> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;
        let document = self.load_readable(&actor, id)?;
        self.log_access(&document, actor.id, AccessMethod::View, ip);
        Ok(document)
    }

    /// Documents the actor may read.
    pub fn list_documents(&self, actor_id: RecordId) -> CoreResult<Vec<Document>> {
        let principal = require_active(self.principals.as_ref(), actor_id)?.principal();
        Ok(self
            .documents
            .list_documents()?
            .into_iter()
            .filter(|doc| can_read(&principal, &doc.descriptor()))
            .collect())
    }

    pub fn update_document(
        &self,
        actor_id: RecordId,
        id: RecordId,
        update: DocumentUpdate,
    ) -> CoreResult<Document> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;
        self.load_editable(&actor, id)?;

        let mut changed = Vec::new();
        if update.title.is_some() {
            changed.push("title");
        }
        if update.description.is_some() {
            changed.push("description");
        }
        if update.access_control.is_some() {
            changed.push("access_control");
        }
        if changed.is_empty() {
            return Err(CoreError::Validation("no fields to update".into()));
        }

        let document = self.documents.update_document(id, &update, Utc::now())?;
        self.audit("document.updated", &document, actor.id, changed.join(","));
        Ok(document)
    }

    /// Appends a new version. Earlier versions are untouched.
    ///
    /// The author is notified when someone else uploads.
    pub fn add_version(
        &self,
        actor_id: RecordId,
        id: RecordId,
        bytes: &[u8],
        filename: &str,
        change_notes: Option<String>,
    ) -> CoreResult<Document> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;
        let current = self.load_editable(&actor, id)?;

        let file = self.files.store(bytes, filename)?;
        let version = DocumentVersion {
            version: current.current_version + 1,
            file,
            uploaded_by: actor.id,
            change_notes,
            uploaded_at: Utc::now(),
        };
        let document = self.documents.append_version(id, version)?;

        tracing::info!(
            document_id = %document.id,
            version = document.current_version,
            "document version added"
        );
        self.audit(
            "document.version_added",
            &document,
            actor.id,
            format!("version {}", document.current_version),
        );

        if document.author != actor.id {
            let event = NotificationEvent {
                recipients: Recipients::One(document.author),
                sender: Some(actor.id),
                kind: NotificationKind::DocumentVersionAdded,
                message: format!(
                    "{} \"{}\" has a new version {}",
                    document.document_number, document.title, document.current_version
                ),
                related: Some(RelatedEntity {
                    entity: EntityKind::Document,
                    id: document.id,
                }),
            };
            match self.notifier.dispatch(&event) {
                Ok(dispatched) => {
                    for failure in dispatched.failures {
                        tracing::warn!(
                            document_id = %document.id,
                            "version notification not stored: {failure}"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(document_id = %document.id, "version notification failed: {e}")
                }
            }
        }

        Ok(document)
    }

    /// Reads `version`, or the current version when `None`, and logs the download.
    pub fn download(
        &self,
        actor_id: RecordId,
        id: RecordId,
        version: Option<u32>,
        ip: Option<String>,
    ) -> CoreResult<DocumentDownload> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;
        let document = self.load_readable(&actor, id)?;

        let wanted = version.unwrap_or(document.current_version);
        let version = document
            .version(wanted)
            .cloned()
            .ok_or_else(|| {
                CoreError::not_found("document version", format!("{}@{wanted}", document.id))
            })?;
        let bytes = self.files.read(&version.file.relative_path)?;

        self.log_access(&document, actor.id, AccessMethod::Download, ip);
        Ok(DocumentDownload { version, bytes })
    }

    pub fn delete_document(&self, actor_id: RecordId, id: RecordId) -> CoreResult<()> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;
        self.load_editable(&actor, id)?;

        let document = self.documents.mark_document_deleted(id, Utc::now())?;
        self.audit("document.deleted", &document, actor.id, String::new());
        Ok(())
    }

    /// Both access decisions for `subject` (the actor when `None`) on a document.
    ///
    /// Only managers and super-admins may ask about someone else.
    pub fn evaluate_access(
        &self,
        actor_id: RecordId,
        id: RecordId,
        subject: Option<RecordId>,
    ) -> CoreResult<AccessDecision> {
        let actor = require_active(self.principals.as_ref(), actor_id)?;

        let subject = match subject {
            Some(subject_id) if subject_id != actor.id => {
                if !actor.principal().is_elevated() {
                    return Err(CoreError::Authorization(
                        "only managers may evaluate access for other principals".into(),
                    ));
                }
                self.principals
                    .find_principal(subject_id)?
                    .ok_or_else(|| CoreError::not_found("principal", subject_id))?
            }
            _ => actor,
        };

        let document = self.load(id)?;
        Ok(evaluate_access(&subject.principal(), &document.descriptor()))
    }
}
