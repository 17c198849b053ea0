//! # Casebook Core
//!
//! Orchestration for the Casebook review platform:
//! - the case workflow: persistence, notification and report generation wrapped around the
//!   pure state machine in `casebook-workflow`
//! - shared documents: versioning and access logging wrapped around the pure evaluator in
//!   `casebook-policy`
//! - notification fan-out with optional email delivery
//! - the principal directory
//!
//! **No API concerns**: authentication, HTTP servers and CLI parsing belong in `api-rest`
//! and `casebook-cli`. Configuration is resolved once by the caller and passed in as
//! [`CoreConfig`].
//!
//! Storage layout under the configured data directory:
//!
//! ```text
//! <data_dir>/
//! ├── records/   YAML records, see [`store::YamlRecordStore`]
//! └── files/     content-addressed blobs, see [`casebook_files::FilesService`]
//! ```

pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use collaborators::{
    AuditEvent, AuditSink, CollaboratorError, Collaborators, EmailMessage, EmailSender,
    QrCode, QrGenerator, ReportRenderer,
};
pub use config::{max_revision_requests_from_env_value, CoreConfig};
pub use error::{CoreError, CoreResult, Warning};
pub use services::{
    CaseService, Dispatched, DocumentDownload, DocumentService, NewCase, NewDocument,
    NotificationDispatcher, PrincipalService, TransitionOutcome,
};

use casebook_files::FilesService;
use std::sync::Arc;
use store::{CaseStore, DocumentStore, NotificationStore, PrincipalDirectory, YamlRecordStore};

/// All core services, wired to one store and one set of collaborators.
#[derive(Clone)]
pub struct Casebook {
    pub cases: CaseService,
    pub documents: DocumentService,
    pub notifications: Arc<NotificationDispatcher>,
    pub principals: PrincipalService,
}

impl Casebook {
    /// Opens the YAML store and blob store under `config.data_dir()` with the default
    /// collaborators, creating directories as needed.
    pub fn open(config: Arc<CoreConfig>) -> CoreResult<Self> {
        config.ensure_layout()?;
        let store = Arc::new(YamlRecordStore::new(&config.records_dir())?);
        let files = FilesService::new(&config.files_dir())?;
        let collaborators = Collaborators::defaults(&config, files.clone());
        Ok(Self::with_store(config, store, files, collaborators))
    }

    pub fn with_store<S>(
        config: Arc<CoreConfig>,
        store: Arc<S>,
        files: FilesService,
        collaborators: Collaborators,
    ) -> Self
    where
        S: CaseStore + DocumentStore + NotificationStore + PrincipalDirectory + 'static,
    {
        let notifications = Arc::new(NotificationDispatcher::new(
            store.clone(),
            store.clone(),
            collaborators.email.clone(),
        ));

        let cases = CaseService::new(
            config,
            store.clone(),
            store.clone(),
            notifications.clone(),
            collaborators.renderer,
            collaborators.qr,
            collaborators.audit.clone(),
        );
        let documents = DocumentService::new(
            store.clone(),
            store.clone(),
            files,
            notifications.clone(),
            collaborators.audit,
        );
        let principals = PrincipalService::new(store);

        Self {
            cases,
            documents,
            notifications,
            principals,
        }
    }
}
