use casebook_policy::{Principal, Role};
use casebook_types::{EmailAddress, NonEmptyText};
use casebook_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user as held in the principal directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub id: RecordId,
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub role: Role,
    #[serde(default)]
    pub department: Option<NonEmptyText>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Opt-in to email copies of notifications.
    #[serde(default)]
    pub email_notifications: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl PrincipalRecord {
    /// The subset the access evaluator and state machine look at.
    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.role, self.department.clone())
    }
}

/// Input for registering a principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrincipal {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub email_notifications: bool,
}
