//! Document access-control evaluation.
//!
//! A resource carries an [`AccessDescriptor`]: who wrote it, which department owns it and
//! an [`AccessControl`] block with a visibility mode and three independent allow-lists.
//!
//! Read access:
//! - elevated roles (manager, super-admin) always read
//! - the author always reads
//! - `public` resources are readable by anyone
//! - `restricted` resources are readable by anyone matching at least one allow-list
//! - `private` resources are readable by nobody else
//!
//! Edit access:
//! - elevated roles and the author always edit
//! - staff of the owning department edit
//!
//! Both predicates are total disjunctions; evaluation order only affects
//! short-circuiting.

use crate::principal::{Principal, Role};
use crate::PolicyError;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Visibility mode of a shared resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Restricted,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Restricted => "restricted",
        })
    }
}

impl FromStr for Visibility {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "restricted" => Ok(Visibility::Restricted),
            other => Err(PolicyError::UnknownVisibility(other.to_owned())),
        }
    }
}

/// Access-control block stored on a resource.
///
/// Allow-lists only matter when `visibility` is [`Visibility::Restricted`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    pub visibility: Visibility,
    #[serde(default)]
    pub allowed_roles: BTreeSet<Role>,
    #[serde(default)]
    pub allowed_users: BTreeSet<RecordId>,
    #[serde(default)]
    pub allowed_departments: BTreeSet<NonEmptyText>,
}

impl AccessControl {
    pub fn public() -> Self {
        Self {
            visibility: Visibility::Public,
            ..Self::default()
        }
    }

    pub fn private() -> Self {
        Self::default()
    }

    /// True if the principal satisfies at least one allow-list.
    pub fn allow_listed(&self, principal: &Principal) -> bool {
        self.allowed_users.contains(&principal.id)
            || self.allowed_roles.contains(&principal.role)
            || principal
                .department
                .as_ref()
                .is_some_and(|d| self.allowed_departments.contains(d))
    }
}

/// Everything the evaluator needs to know about a resource.
#[derive(Clone, Copy, Debug)]
pub struct AccessDescriptor<'a> {
    pub author: RecordId,
    pub department: Option<&'a NonEmptyText>,
    pub access_control: &'a AccessControl,
}

/// Both decisions for one (principal, resource) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub can_read: bool,
    pub can_edit: bool,
}

pub fn can_read(principal: &Principal, resource: &AccessDescriptor<'_>) -> bool {
    if principal.is_elevated() || principal.id == resource.author {
        return true;
    }

    let acl = resource.access_control;
    match acl.visibility {
        Visibility::Public => true,
        Visibility::Restricted => acl.allow_listed(principal),
        Visibility::Private => false,
    }
}

pub fn can_edit(principal: &Principal, resource: &AccessDescriptor<'_>) -> bool {
    principal.is_elevated()
        || principal.id == resource.author
        || (principal.role == Role::Staff && principal.shares_department(resource.department))
}

pub fn evaluate_access(principal: &Principal, resource: &AccessDescriptor<'_>) -> AccessDecision {
    AccessDecision {
        can_read: can_read(principal, resource),
        can_edit: can_edit(principal, resource),
    }
}
