//! Append-only workflow records and the caller-supplied transition payload.

use crate::status::CaseStatus;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed status change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: CaseStatus,
    pub changed_by: RecordId,
    pub note: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionRequest {
    pub requested_by: RecordId,
    pub description: NonEmptyText,
    pub requested_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub criterion: NonEmptyText,
    pub score: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The reviewer's evaluation, written once when the review completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub rubric: Vec<RubricItem>,
    pub evaluated_by: RecordId,
    pub evaluated_at: DateTime<Utc>,
}

/// Evaluation as supplied by the reviewer; validated by the completion guard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub score: Option<f64>,
    /// Defaults to 100 when omitted.
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub rubric: Vec<RubricItem>,
}

/// Optional data accompanying a trigger. Which fields matter depends on the trigger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Free-text note recorded in the workflow history.
    #[serde(default)]
    pub note: Option<String>,
    /// Target reviewer for `assign`.
    #[serde(default)]
    pub assignee: Option<RecordId>,
    /// Required for `request_revision`.
    #[serde(default)]
    pub revision_description: Option<String>,
    /// Required for `complete_review`.
    #[serde(default)]
    pub evaluation: Option<EvaluationInput>,
}

impl TransitionPayload {
    pub fn with_note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }

    pub fn assign(assignee: RecordId) -> Self {
        Self {
            assignee: Some(assignee),
            ..Self::default()
        }
    }

    pub fn revision(description: impl Into<String>) -> Self {
        Self {
            revision_description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn evaluation(score: f64, max_score: f64, feedback: impl Into<String>) -> Self {
        Self {
            evaluation: Some(EvaluationInput {
                score: Some(score),
                max_score: Some(max_score),
                feedback: Some(feedback.into()),
                rubric: Vec::new(),
            }),
            ..Self::default()
        }
    }
}
