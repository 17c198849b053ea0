//! JSON request and response bodies.
//!
//! Identifiers travel as canonical 32-character hex strings and timestamps as RFC 3339.
//! Nested record structures are passed through as they are persisted and documented as
//! free-form objects.

use casebook_core::models::{
    Case, CaseContentUpdate, ClinicalContent, Document, DocumentVersion, Notification,
    PatientInfo, SoapNote,
};
use casebook_core::{NewCase, TransitionOutcome};
use casebook_policy::{AccessControl, AccessDecision};
use casebook_workflow::{Evaluation, EvaluationInput, HistoryEntry, RevisionRequest};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportRes {
    pub path: String,
    pub qr_code: String,
    pub verify_url: String,
    pub generated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CaseRes {
    pub id: String,
    pub case_number: String,
    pub student: String,
    pub department: Option<String>,
    pub status: String,
    pub assigned_to: Option<String>,
    pub title: String,
    #[schema(value_type = Object)]
    pub content: ClinicalContent,
    #[schema(value_type = Option<Object>)]
    pub evaluation: Option<Evaluation>,
    #[schema(value_type = Vec<Object>)]
    pub revision_requests: Vec<RevisionRequest>,
    #[schema(value_type = Vec<Object>)]
    pub workflow_history: Vec<HistoryEntry>,
    pub report: Option<ReportRes>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Case> for CaseRes {
    fn from(case: Case) -> Self {
        Self {
            id: case.id.to_string(),
            case_number: case.case_number,
            student: case.student.to_string(),
            department: case.department.map(|d| d.into_inner()),
            status: case.status.to_string(),
            assigned_to: case.assigned_to.map(|a| a.to_string()),
            title: case.content.title.to_string(),
            content: case.content,
            evaluation: case.evaluation,
            revision_requests: case.revision_requests,
            workflow_history: case.workflow_history,
            report: case.report.map(|r| ReportRes {
                path: r.artifact.relative_path,
                qr_code: r.qr.code,
                verify_url: r.qr.url,
                generated_at: r.generated_at.to_rfc3339(),
            }),
            created_at: case.created_at.to_rfc3339(),
            updated_at: case.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListCasesRes {
    pub cases: Vec<CaseRes>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListCasesQuery {
    /// Status in snake_case, e.g. `in_review`.
    pub status: Option<String>,
    pub student: Option<String>,
    pub assigned_to: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCaseReq {
    /// Owning student; defaults to the caller. Only managers may set it.
    pub student: Option<String>,
    pub title: String,
    #[schema(value_type = Option<Object>)]
    pub patient_info: Option<PatientInfo>,
    pub medical_history: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub soap_note: Option<SoapNote>,
    pub case_details: Option<String>,
}

impl CreateCaseReq {
    pub fn into_new_case(self, student: Option<casebook_uuid::RecordId>) -> NewCase {
        NewCase {
            student,
            title: self.title,
            patient_info: self.patient_info.unwrap_or_default(),
            medical_history: self.medical_history.unwrap_or_default(),
            soap_note: self.soap_note.unwrap_or_default(),
            case_details: self.case_details.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateCaseReq {
    pub title: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub patient_info: Option<PatientInfo>,
    pub medical_history: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub soap_note: Option<SoapNote>,
    pub case_details: Option<String>,
}

impl From<UpdateCaseReq> for CaseContentUpdate {
    fn from(req: UpdateCaseReq) -> Self {
        Self {
            title: req.title,
            patient_info: req.patient_info,
            medical_history: req.medical_history,
            soap_note: req.soap_note,
            case_details: req.case_details,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionReq {
    /// One of `submit`, `assign`, `start_review`, `request_revision`, `complete_review`,
    /// `reject`, `archive`.
    pub trigger: String,
    pub note: Option<String>,
    /// Reviewer id, for `assign`.
    pub assignee: Option<String>,
    /// Required for `request_revision`.
    pub revision_description: Option<String>,
    /// Required for `complete_review`: `{score, max_score, feedback, rubric}`.
    #[schema(value_type = Option<Object>)]
    pub evaluation: Option<EvaluationInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionRes {
    pub case: CaseRes,
    /// Side effects that failed after the transition was committed.
    pub warnings: Vec<String>,
    pub notifications: Vec<String>,
}

impl From<TransitionOutcome> for TransitionRes {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            case: outcome.case.into(),
            warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
            notifications: outcome
                .notifications
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentVersionRes {
    pub version: u32,
    pub filename: String,
    pub size_bytes: u64,
    pub media_type: Option<String>,
    pub uploaded_by: String,
    pub change_notes: Option<String>,
    pub uploaded_at: String,
}

impl From<DocumentVersion> for DocumentVersionRes {
    fn from(v: DocumentVersion) -> Self {
        Self {
            version: v.version,
            filename: v.file.original_filename.into_inner(),
            size_bytes: v.file.size_bytes,
            media_type: v.file.media_type.map(|m| m.into_inner()),
            uploaded_by: v.uploaded_by.to_string(),
            change_notes: v.change_notes,
            uploaded_at: v.uploaded_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentRes {
    pub id: String,
    pub document_number: String,
    pub title: String,
    pub description: Option<String>,
    pub author: String,
    pub department: Option<String>,
    #[schema(value_type = Object)]
    pub access_control: AccessControl,
    pub current_version: u32,
    pub versions: Vec<DocumentVersionRes>,
    pub updated_at: String,
}

impl From<Document> for DocumentRes {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id.to_string(),
            document_number: doc.document_number,
            title: doc.title.into_inner(),
            description: doc.description,
            author: doc.author.to_string(),
            department: doc.department.map(|d| d.into_inner()),
            access_control: doc.access_control,
            current_version: doc.current_version,
            versions: doc.versions.into_iter().map(Into::into).collect(),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListDocumentsRes {
    pub documents: Vec<DocumentRes>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateAccessReq {
    pub document_id: String,
    /// Principal to evaluate for; defaults to the caller.
    pub principal_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessDecisionRes {
    pub can_read: bool,
    pub can_edit: bool,
}

impl From<AccessDecision> for AccessDecisionRes {
    fn from(d: AccessDecision) -> Self {
        Self {
            can_read: d.can_read,
            can_edit: d.can_edit,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationRes {
    pub id: String,
    pub sender: Option<String>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_entity: Option<String>,
    pub related_id: Option<String>,
    pub is_read: bool,
    pub email_sent: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationRes {
    fn from(n: Notification) -> Self {
        let kind = serde_json::to_value(n.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let related_entity = n.related.and_then(|r| {
            serde_json::to_value(r.entity)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
        });

        Self {
            id: n.id.to_string(),
            sender: n.sender.map(|s| s.to_string()),
            kind,
            title: n.title,
            message: n.message,
            related_entity,
            related_id: n.related.map(|r| r.id.to_string()),
            is_read: n.is_read,
            email_sent: n.email_sent,
            created_at: n.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListNotificationsRes {
    pub notifications: Vec<NotificationRes>,
}
