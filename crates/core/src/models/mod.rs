//! Persisted record types.

pub mod case;
pub mod document;
pub mod notification;
pub mod principal;

pub use case::{
    Case, CaseContentUpdate, CaseFilter, CaseReport, ClinicalContent, PatientInfo, SoapNote,
};
pub use document::{AccessLogEntry, AccessMethod, Document, DocumentUpdate, DocumentVersion};
pub use notification::{EntityKind, Notification, NotificationKind, RelatedEntity};
pub use principal::{NewPrincipal, PrincipalRecord};
