//! # Casebook Policy
//!
//! The single place where Casebook decides whether a principal may read or modify a
//! shared resource.
//!
//! Everything in this crate is pure: no persistence, no logging, no clock. Callers that
//! need an audit trail of access attempts record it themselves after asking for a
//! decision.

pub mod access;
pub mod principal;

pub use access::{
    can_edit, can_read, evaluate_access, AccessControl, AccessDecision, AccessDescriptor,
    Visibility,
};
pub use principal::{Principal, Role};

/// Errors returned when parsing policy vocabulary from external input.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown visibility: {0}")]
    UnknownVisibility(String),
}
