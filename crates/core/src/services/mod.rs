//! Orchestration services over the store and collaborators.

pub mod cases;
pub mod documents;
pub mod notifications;
pub mod principals;

pub use cases::{CaseService, NewCase, TransitionOutcome};
pub use documents::{DocumentDownload, DocumentService, NewDocument};
pub use notifications::{
    Dispatched, NotificationDispatcher, NotificationEvent, NotificationSink, Recipients,
};
pub use principals::PrincipalService;
