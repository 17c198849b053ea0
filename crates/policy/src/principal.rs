//! Principals and their roles.

use crate::PolicyError;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Institutional role held by a principal.
///
/// Ordered from least to most privileged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Staff,
    Manager,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Student, Role::Staff, Role::Manager, Role::SuperAdmin];

    /// Manager and super-admin: exempt from ordinary visibility restrictions.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Manager | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "student" => Ok(Role::Student),
            "staff" => Ok(Role::Staff),
            "manager" => Ok(Role::Manager),
            "super_admin" | "super-admin" => Ok(Role::SuperAdmin),
            other => Err(PolicyError::UnknownRole(other.to_owned())),
        }
    }
}

/// The authenticated actor an access decision is made for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: RecordId,
    pub role: Role,
    /// Super-admins and some managers are not attached to a department.
    pub department: Option<NonEmptyText>,
}

impl Principal {
    pub fn new(id: RecordId, role: Role, department: Option<NonEmptyText>) -> Self {
        Self {
            id,
            role,
            department,
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    /// True when both sides have a department and they match.
    pub fn shares_department(&self, department: Option<&NonEmptyText>) -> bool {
        matches!((self.department.as_ref(), department), (Some(mine), Some(theirs)) if mine == theirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_manager_and_super_admin_are_elevated() {
        assert!(!Role::Student.is_elevated());
        assert!(!Role::Staff.is_elevated());
        assert!(Role::Manager.is_elevated());
        assert!(Role::SuperAdmin.is_elevated());
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("super-admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!(
            "janitor".parse::<Role>().unwrap_err(),
            PolicyError::UnknownRole("janitor".into())
        );
    }

    #[test]
    fn shares_department_requires_both_sides() {
        let cardio = NonEmptyText::new("cardiology").unwrap();
        let with_dept = Principal::new(RecordId::new(), Role::Staff, Some(cardio.clone()));
        let without = Principal::new(RecordId::new(), Role::Staff, None);

        assert!(with_dept.shares_department(Some(&cardio)));
        assert!(!with_dept.shares_department(None));
        assert!(!without.shares_department(Some(&cardio)));
        assert!(!without.shares_department(None));
    }
}
