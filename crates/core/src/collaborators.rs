//! External collaborators the core calls into, and the default implementations wired by
//! [`crate::Casebook::open`].
//!
//! Every collaborator except the audit sink may fail. Their failures are reported as
//! [`CollaboratorError`]; whether that is fatal is decided by the caller.

use crate::config::CoreConfig;
use crate::constants::QR_CODE_LENGTH;
use crate::models::Case;
use casebook_files::{FileMetadata, FilesService};
use casebook_types::EmailAddress;
use casebook_uuid::RecordId;
use casebook_workflow::RubricItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Renders a case's evaluation into a stored artifact.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, case: &Case) -> Result<FileMetadata, CollaboratorError>;
}

/// A verification code for a stored artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub code: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

pub trait QrGenerator: Send + Sync {
    fn generate(&self, resource_path: &str, label: &str) -> Result<QrCode, CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: RecordId,
    pub actor: RecordId,
    pub details: String,
}

/// Audit trail sink. Recording never fails from the caller's point of view.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: EmailAddress,
    pub subject: String,
    pub body: String,
}

pub trait EmailSender: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), CollaboratorError>;
}

/// The set of collaborators a [`crate::Casebook`] is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn ReportRenderer>,
    pub qr: Arc<dyn QrGenerator>,
    pub audit: Arc<dyn AuditSink>,
    pub email: Arc<dyn EmailSender>,
}

impl Collaborators {
    /// YAML summary reports in `files`, hash-derived QR codes, tracing audit and email.
    pub fn defaults(config: &CoreConfig, files: FilesService) -> Self {
        Self {
            renderer: Arc::new(SummaryReportRenderer::new(files)),
            qr: Arc::new(HashQrGenerator::new(config.public_base_url())),
            audit: Arc::new(TracingAuditSink),
            email: Arc::new(LogEmailSender),
        }
    }
}

/// Serialised form of a rendered report.
#[derive(Debug, Serialize)]
struct ReportSummary<'a> {
    case_number: &'a str,
    title: &'a str,
    student: RecordId,
    evaluated_by: RecordId,
    score: f64,
    max_score: f64,
    percentage: f64,
    feedback: &'a str,
    rubric: &'a [RubricItem],
    evaluated_at: DateTime<Utc>,
}

/// Writes a YAML evaluation summary into the blob store.
#[derive(Clone, Debug)]
pub struct SummaryReportRenderer {
    files: FilesService,
}

impl SummaryReportRenderer {
    pub fn new(files: FilesService) -> Self {
        Self { files }
    }
}

impl ReportRenderer for SummaryReportRenderer {
    fn render(&self, case: &Case) -> Result<FileMetadata, CollaboratorError> {
        let evaluation = case.evaluation.as_ref().ok_or_else(|| {
            CollaboratorError::new(
                "report renderer",
                format!("case {} has no evaluation", case.case_number),
            )
        })?;

        let summary = ReportSummary {
            case_number: &case.case_number,
            title: case.content.title.as_str(),
            student: case.student,
            evaluated_by: evaluation.evaluated_by,
            score: evaluation.score,
            max_score: evaluation.max_score,
            percentage: (evaluation.score / evaluation.max_score * 1000.0).round() / 10.0,
            feedback: &evaluation.feedback,
            rubric: &evaluation.rubric,
            evaluated_at: evaluation.evaluated_at,
        };

        let yaml = serde_yaml::to_string(&summary)
            .map_err(|e| CollaboratorError::new("report renderer", e.to_string()))?;

        self.files
            .store(yaml.as_bytes(), &format!("{}-report.yaml", case.case_number))
            .map_err(|e| CollaboratorError::new("report renderer", e.to_string()))
    }
}

/// Derives a short access code from the artifact path; produces no image.
#[derive(Clone, Debug)]
pub struct HashQrGenerator {
    base_url: String,
}

impl HashQrGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl QrGenerator for HashQrGenerator {
    fn generate(&self, resource_path: &str, label: &str) -> Result<QrCode, CollaboratorError> {
        if resource_path.trim().is_empty() {
            return Err(CollaboratorError::new(
                "qr generator",
                "resource path cannot be empty",
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(resource_path.as_bytes());
        hasher.update(b"\n");
        hasher.update(label.as_bytes());
        let mut code = hex::encode(hasher.finalize());
        code.truncate(QR_CODE_LENGTH);
        let code = code.to_ascii_uppercase();

        Ok(QrCode {
            url: format!("{}/verify/{}", self.base_url, code),
            code,
            image_path: None,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        tracing::info!(
            target: "casebook::audit",
            action = event.action,
            entity = event.entity,
            entity_id = %event.entity_id,
            actor = %event.actor,
            details = %event.details,
            "audit"
        );
    }
}

/// Logs outgoing mail instead of delivering it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), CollaboratorError> {
        tracing::info!(to = %message.to, subject = %message.subject, "email queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClinicalContent;
    use casebook_policy::{Principal, Role};
    use casebook_types::NonEmptyText;
    use casebook_workflow::Evaluation;
    use tempfile::TempDir;

    fn completed_case() -> Case {
        let student = Principal::new(RecordId::new(), Role::Student, None);
        let mut case = Case::draft(
            "CASE-2026-00007".into(),
            &student,
            ClinicalContent::titled(NonEmptyText::new("Sepsis").unwrap()),
            student.id,
            Utc::now(),
        );
        case.evaluation = Some(Evaluation {
            score: 85.0,
            max_score: 100.0,
            feedback: "Thorough".into(),
            rubric: Vec::new(),
            evaluated_by: RecordId::new(),
            evaluated_at: Utc::now(),
        });
        case
    }

    #[test]
    fn summary_renderer_stores_yaml_in_blob_store() {
        let temp = TempDir::new().unwrap();
        let files = FilesService::new(temp.path()).unwrap();
        let renderer = SummaryReportRenderer::new(files.clone());

        let artifact = renderer.render(&completed_case()).unwrap();
        let bytes = files.read(&artifact.relative_path).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("case_number: CASE-2026-00007"));
        assert!(text.contains("percentage: 85.0"));
        assert_eq!(
            artifact.original_filename.as_str(),
            "CASE-2026-00007-report.yaml"
        );
    }

    #[test]
    fn summary_renderer_requires_evaluation() {
        let temp = TempDir::new().unwrap();
        let renderer = SummaryReportRenderer::new(FilesService::new(temp.path()).unwrap());
        let mut case = completed_case();
        case.evaluation = None;

        assert!(renderer.render(&case).is_err());
    }

    #[test]
    fn qr_code_is_deterministic_and_linked() {
        let qr = HashQrGenerator::new("https://casebook.example");
        let a = qr.generate("sha256/ab/cd/abcd", "CASE-2026-00001").unwrap();
        let b = qr.generate("sha256/ab/cd/abcd", "CASE-2026-00001").unwrap();
        let c = qr.generate("sha256/ab/cd/abcd", "CASE-2026-00002").unwrap();

        assert_eq!(a, b);
        assert_ne!(a.code, c.code);
        assert_eq!(a.code.len(), QR_CODE_LENGTH);
        assert_eq!(a.url, format!("https://casebook.example/verify/{}", a.code));
        assert!(a.image_path.is_none());
    }
}
