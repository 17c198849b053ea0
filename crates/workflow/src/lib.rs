//! # Casebook Workflow
//!
//! The case review lifecycle as an explicit transition table.
//!
//! ```text
//! draft ──submit──▶ submitted ──assign──▶ assigned ──start_review──▶ in_review
//!   ▲                 │  ▲                                            │    │
//!   │              reject └────────────submit──── revision_requested ◀┘    │
//!   │                 ▼                                                    ▼
//!   │              rejected                      archived ◀──archive── completed
//! ```
//!
//! [`plan_transition`] is the only way to move a case between statuses. It looks the
//! `(status, trigger)` pair up in [`TRANSITIONS`], checks the actor, runs the guard and
//! returns a [`TransitionPlan`] describing everything that must be committed together.
//! It never mutates anything; the orchestration layer persists the plan.

pub mod record;
pub mod status;
pub mod table;

pub use record::{
    Evaluation, EvaluationInput, HistoryEntry, RevisionRequest, RubricItem, TransitionPayload,
};
pub use status::{CaseStatus, Trigger};
pub use table::{
    available_triggers, plan_transition, ActorRequirement, Audience, CaseFacts,
    TransitionContext, TransitionEffect, TransitionPlan, TransitionRule, TRANSITIONS,
};

/// Reasons a transition can be refused before anything is written.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    /// The `(status, trigger)` pair is not in the table.
    #[error("cannot {trigger} a case that is {from}")]
    InvalidTransition { from: CaseStatus, trigger: Trigger },

    /// The actor lacks the capability the rule requires.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// The guard rejected the payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

pub type TransitionResult<T> = Result<T, TransitionError>;
