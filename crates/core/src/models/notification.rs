use casebook_uuid::RecordId;
use casebook_workflow::CaseStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CaseSubmitted,
    CaseAssigned,
    ReviewStarted,
    RevisionRequested,
    ReviewCompleted,
    CaseRejected,
    CaseArchived,
    DocumentVersionAdded,
}

impl NotificationKind {
    /// The notification sent when a case enters `status`. Drafts notify nobody.
    pub fn for_status(status: CaseStatus) -> Option<Self> {
        match status {
            CaseStatus::Draft => None,
            CaseStatus::Submitted => Some(Self::CaseSubmitted),
            CaseStatus::Assigned => Some(Self::CaseAssigned),
            CaseStatus::InReview => Some(Self::ReviewStarted),
            CaseStatus::RevisionRequested => Some(Self::RevisionRequested),
            CaseStatus::Completed => Some(Self::ReviewCompleted),
            CaseStatus::Rejected => Some(Self::CaseRejected),
            CaseStatus::Archived => Some(Self::CaseArchived),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::CaseSubmitted => "Case submitted for review",
            Self::CaseAssigned => "Case assigned to you",
            Self::ReviewStarted => "Review started",
            Self::RevisionRequested => "Revision requested",
            Self::ReviewCompleted => "Review completed",
            Self::CaseRejected => "Case rejected",
            Self::CaseArchived => "Case archived",
            Self::DocumentVersionAdded => "New document version",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Case,
    Document,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity: EntityKind,
    pub id: RecordId,
}

/// One message to one recipient. Only `is_read` changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: RecordId,
    pub recipient: RecordId,
    #[serde(default)]
    pub sender: Option<RecordId>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub related: Option<RelatedEntity>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_except_draft_has_a_notification() {
        for status in CaseStatus::ALL {
            assert_eq!(
                NotificationKind::for_status(status).is_none(),
                status == CaseStatus::Draft
            );
        }
    }
}
