//! The case record: one clinical write-up moving through review.

use crate::collaborators::QrCode;
use crate::error::{CoreError, CoreResult};
use crate::store::StatusUpdate;
use casebook_files::FileMetadata;
use casebook_policy::{Principal, Role};
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use casebook_workflow::{
    CaseFacts, CaseStatus, Evaluation, HistoryEntry, RevisionRequest, TransitionEffect,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presenting_complaint: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SoapNote {
    #[serde(default)]
    pub subjective: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub plan: String,
}

/// The student-authored part of a case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClinicalContent {
    pub title: NonEmptyText,
    #[serde(default)]
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub medical_history: String,
    #[serde(default)]
    pub soap_note: SoapNote,
    #[serde(default)]
    pub case_details: String,
}

impl ClinicalContent {
    pub fn titled(title: NonEmptyText) -> Self {
        Self {
            title,
            patient_info: PatientInfo::default(),
            medical_history: String::new(),
            soap_note: SoapNote::default(),
            case_details: String::new(),
        }
    }
}

/// Partial update of clinical content.
///
/// Workflow fields have no counterpart here; they only change through transitions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseContentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub patient_info: Option<PatientInfo>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub soap_note: Option<SoapNote>,
    #[serde(default)]
    pub case_details: Option<String>,
}

impl CaseContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.patient_info.is_none()
            && self.medical_history.is_none()
            && self.soap_note.is_none()
            && self.case_details.is_none()
    }

    pub(crate) fn apply_to(&self, content: &mut ClinicalContent) -> CoreResult<()> {
        if let Some(title) = &self.title {
            content.title = NonEmptyText::new(title)
                .map_err(|_| CoreError::Validation("case title cannot be empty".into()))?;
        }
        if let Some(info) = &self.patient_info {
            content.patient_info = info.clone();
        }
        if let Some(history) = &self.medical_history {
            content.medical_history = history.clone();
        }
        if let Some(note) = &self.soap_note {
            content.soap_note = note.clone();
        }
        if let Some(details) = &self.case_details {
            content.case_details = details.clone();
        }
        Ok(())
    }
}

/// The rendered evaluation summary and its verification code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub artifact: FileMetadata,
    pub qr: QrCode,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: RecordId,
    pub case_number: String,
    pub student: RecordId,
    #[serde(default)]
    pub department: Option<NonEmptyText>,
    pub status: CaseStatus,
    #[serde(default)]
    pub assigned_to: Option<RecordId>,
    pub content: ClinicalContent,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub revision_requests: Vec<RevisionRequest>,
    pub workflow_history: Vec<HistoryEntry>,
    #[serde(default)]
    pub report: Option<CaseReport>,
    #[serde(default)]
    pub deleted: bool,
    pub created_by: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    /// A fresh draft with its initial history entry.
    pub fn draft(
        case_number: String,
        student: &Principal,
        content: ClinicalContent,
        created_by: RecordId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            case_number,
            student: student.id,
            department: student.department.clone(),
            status: CaseStatus::Draft,
            assigned_to: None,
            content,
            evaluation: None,
            revision_requests: Vec::new(),
            workflow_history: vec![HistoryEntry {
                status: CaseStatus::Draft,
                changed_by: created_by,
                note: "Case created".into(),
                changed_at: now,
            }],
            report: None,
            deleted: false,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn facts(&self) -> CaseFacts {
        CaseFacts {
            status: self.status,
            owner: self.student,
            assigned_to: self.assigned_to,
            revision_count: self.revision_requests.len(),
        }
    }

    /// Elevated roles, the owner, the assignee and staff of the case's department.
    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        principal.is_elevated()
            || principal.id == self.student
            || self.assigned_to == Some(principal.id)
            || (principal.role == Role::Staff
                && principal.shares_department(self.department.as_ref()))
    }

    /// Applies a planned status change if the case is still the snapshot it was planned
    /// against.
    ///
    /// Nothing is modified when the status or the history length no longer matches.
    pub(crate) fn apply_transition(&mut self, update: &StatusUpdate) -> CoreResult<()> {
        if self.status != update.expected {
            return Err(CoreError::InvalidStateTransition(format!(
                "case {} is {}, expected {}",
                self.case_number, self.status, update.expected
            )));
        }
        if self.workflow_history.len() != update.expected_history_len {
            return Err(CoreError::InvalidStateTransition(format!(
                "case {} changed since the transition was planned",
                self.case_number
            )));
        }

        match &update.effect {
            TransitionEffect::None => {}
            TransitionEffect::Assign(staff) => self.assigned_to = Some(*staff),
            TransitionEffect::ClearAssignment => self.assigned_to = None,
            TransitionEffect::AppendRevisionRequest(request) => {
                self.revision_requests.push(request.clone())
            }
            TransitionEffect::SetEvaluation(evaluation) => {
                self.evaluation = Some(evaluation.clone())
            }
        }

        self.status = update.next;
        self.updated_at = update.history.changed_at;
        self.workflow_history.push(update.history.clone());
        Ok(())
    }
}

/// Filter for case listings. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFilter {
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub student: Option<RecordId>,
    #[serde(default)]
    pub assigned_to: Option<RecordId>,
    #[serde(default)]
    pub department: Option<NonEmptyText>,
}

impl CaseFilter {
    pub fn matches(&self, case: &Case) -> bool {
        !case.deleted
            && self.status.map_or(true, |s| s == case.status)
            && self.student.map_or(true, |s| s == case.student)
            && self.assigned_to.map_or(true, |a| Some(a) == case.assigned_to)
            && self
                .department
                .as_ref()
                .map_or(true, |d| Some(d) == case.department.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> Principal {
        Principal::new(
            RecordId::new(),
            Role::Student,
            Some(NonEmptyText::new("cardiology").unwrap()),
        )
    }

    fn draft_case(owner: &Principal) -> Case {
        Case::draft(
            "CASE-2026-00001".into(),
            owner,
            ClinicalContent::titled(NonEmptyText::new("Chest pain").unwrap()),
            owner.id,
            Utc::now(),
        )
    }

    #[test]
    fn fresh_case_is_a_draft_with_one_history_entry() {
        let owner = student();
        let case = draft_case(&owner);

        assert_eq!(case.status, CaseStatus::Draft);
        assert_eq!(case.workflow_history.len(), 1);
        assert_eq!(case.workflow_history[0].status, CaseStatus::Draft);
        assert!(case.assigned_to.is_none());
        assert!(case.evaluation.is_none());
        assert_eq!(case.department, owner.department);
    }

    #[test]
    fn apply_transition_refuses_stale_status() {
        let owner = student();
        let mut case = draft_case(&owner);
        let before = case.clone();

        let update = StatusUpdate {
            expected: CaseStatus::Submitted,
            expected_history_len: 1,
            next: CaseStatus::Assigned,
            history: HistoryEntry {
                status: CaseStatus::Assigned,
                changed_by: owner.id,
                note: "x".into(),
                changed_at: Utc::now(),
            },
            effect: TransitionEffect::Assign(RecordId::new()),
        };

        let err = case.apply_transition(&update).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition(_)));
        assert_eq!(case, before);
    }

    #[test]
    fn content_update_rejects_blank_title() {
        let owner = student();
        let mut content = draft_case(&owner).content;
        let update = CaseContentUpdate {
            title: Some("   ".into()),
            ..CaseContentUpdate::default()
        };
        assert!(update.apply_to(&mut content).is_err());
        assert_eq!(content.title.as_str(), "Chest pain");
    }

    #[test]
    fn staff_in_other_department_cannot_see_case() {
        let owner = student();
        let case = draft_case(&owner);
        let outsider = Principal::new(
            RecordId::new(),
            Role::Staff,
            Some(NonEmptyText::new("neurology").unwrap()),
        );
        let colleague = Principal::new(RecordId::new(), Role::Staff, owner.department.clone());

        assert!(!case.is_visible_to(&outsider));
        assert!(case.is_visible_to(&colleague));
        assert!(case.is_visible_to(&owner));
    }

    #[test]
    fn filter_excludes_deleted_cases() {
        let owner = student();
        let mut case = draft_case(&owner);
        assert!(CaseFilter::default().matches(&case));
        case.deleted = true;
        assert!(!CaseFilter::default().matches(&case));
    }
}
