//! Case statuses and the triggers that move between them.

use crate::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Draft,
    Submitted,
    Assigned,
    InReview,
    RevisionRequested,
    Completed,
    Rejected,
    Archived,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 8] = [
        CaseStatus::Draft,
        CaseStatus::Submitted,
        CaseStatus::Assigned,
        CaseStatus::InReview,
        CaseStatus::RevisionRequested,
        CaseStatus::Completed,
        CaseStatus::Rejected,
        CaseStatus::Archived,
    ];

    /// Clinical content may only change in these statuses.
    pub fn is_editable(self) -> bool {
        matches!(self, CaseStatus::Draft | CaseStatus::RevisionRequested)
    }

    /// Statuses in which `assigned_to` must be set.
    pub fn requires_assignee(self) -> bool {
        matches!(
            self,
            CaseStatus::Assigned
                | CaseStatus::InReview
                | CaseStatus::RevisionRequested
                | CaseStatus::Completed
                | CaseStatus::Archived
        )
    }

    /// Statuses in which `evaluation` must be set.
    pub fn requires_evaluation(self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Archived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Draft => "draft",
            CaseStatus::Submitted => "submitted",
            CaseStatus::Assigned => "assigned",
            CaseStatus::InReview => "in_review",
            CaseStatus::RevisionRequested => "revision_requested",
            CaseStatus::Completed => "completed",
            CaseStatus::Rejected => "rejected",
            CaseStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Submit,
    Assign,
    StartReview,
    RequestRevision,
    CompleteReview,
    Reject,
    Archive,
}

impl Trigger {
    pub const ALL: [Trigger; 7] = [
        Trigger::Submit,
        Trigger::Assign,
        Trigger::StartReview,
        Trigger::RequestRevision,
        Trigger::CompleteReview,
        Trigger::Reject,
        Trigger::Archive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Submit => "submit",
            Trigger::Assign => "assign",
            Trigger::StartReview => "start_review",
            Trigger::RequestRevision => "request_revision",
            Trigger::CompleteReview => "complete_review",
            Trigger::Reject => "reject",
            Trigger::Archive => "archive",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().replace('-', "_");
        Trigger::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == normalised)
            .ok_or_else(|| TransitionError::UnknownTrigger(s.to_owned()))
    }
}
