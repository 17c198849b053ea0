//! The principal directory as seen by operators.

use crate::error::{CoreError, CoreResult};
use crate::models::{NewPrincipal, PrincipalRecord};
use crate::store::PrincipalDirectory;
use casebook_types::{EmailAddress, NonEmptyText};
use casebook_uuid::RecordId;
use chrono::Utc;
use std::sync::Arc;

/// Resolves an acting principal, refusing unknown and deactivated ones.
pub(crate) fn require_active(
    directory: &dyn PrincipalDirectory,
    id: RecordId,
) -> CoreResult<PrincipalRecord> {
    match directory.find_principal(id)? {
        Some(record) if record.active => Ok(record),
        Some(_) => Err(CoreError::Authorization(format!(
            "principal {id} is deactivated"
        ))),
        None => Err(CoreError::Authorization(format!("unknown principal {id}"))),
    }
}

#[derive(Clone)]
pub struct PrincipalService {
    directory: Arc<dyn PrincipalDirectory>,
}

impl PrincipalService {
    pub fn new(directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self { directory }
    }

    /// Registers a principal. Operator-level: no acting principal is checked.
    pub fn register(&self, input: NewPrincipal) -> CoreResult<PrincipalRecord> {
        let name = NonEmptyText::new(&input.name)
            .map_err(|_| CoreError::Validation("name cannot be empty".into()))?;
        let email = EmailAddress::parse(&input.email)?;
        let department = input
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(NonEmptyText::new)
            .transpose()?;

        let record = PrincipalRecord {
            id: RecordId::new(),
            name,
            email,
            role: input.role,
            department,
            active: true,
            email_notifications: input.email_notifications,
            created_at: Utc::now(),
        };
        self.directory.insert_principal(&record)?;

        tracing::info!(principal_id = %record.id, role = %record.role, "principal registered");
        Ok(record)
    }

    pub fn get(&self, id: RecordId) -> CoreResult<PrincipalRecord> {
        self.directory
            .find_principal(id)?
            .ok_or_else(|| CoreError::not_found("principal", id))
    }

    pub fn list(&self) -> CoreResult<Vec<PrincipalRecord>> {
        self.directory.list_principals()
    }

    pub fn set_active(&self, id: RecordId, active: bool) -> CoreResult<PrincipalRecord> {
        let record = self.directory.set_principal_active(id, active)?;
        tracing::info!(principal_id = %id, active, "principal activation changed");
        Ok(record)
    }
}
