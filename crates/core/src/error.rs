use casebook_workflow::TransitionError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not authorised: {0}")]
    Authorization(String),
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML at {path}: {source}")]
    YamlDeserialization {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("blob store error: {0}")]
    Files(#[from] casebook_files::FilesError),
    #[error("invalid identifier: {0}")]
    Uuid(#[from] casebook_uuid::UuidError),
    #[error("invalid text: {0}")]
    Text(#[from] casebook_types::TextError),
    #[error(transparent)]
    Collaborator(#[from] crate::collaborators::CollaboratorError),
}

impl From<TransitionError> for CoreError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { .. } => {
                CoreError::InvalidStateTransition(err.to_string())
            }
            TransitionError::NotPermitted(msg) => CoreError::Authorization(msg),
            TransitionError::InvalidInput(msg)
            | TransitionError::UnknownTrigger(msg)
            | TransitionError::UnknownStatus(msg) => CoreError::Validation(msg),
        }
    }
}

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// A best-effort side effect that failed after the primary change committed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Warning {
    ReportGeneration(String),
    Notification(String),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ReportGeneration(msg) => write!(f, "report generation failed: {msg}"),
            Warning::Notification(msg) => write!(f, "notification dispatch failed: {msg}"),
        }
    }
}
