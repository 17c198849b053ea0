//! Notification fan-out.
//!
//! One event in, one [`Notification`] per resolved recipient out. Recipients who opted in
//! also get an email once their notification is stored; email failure is logged and never
//! fails the dispatch. A recipient whose notification cannot be stored is reported in
//! [`Dispatched::failures`] without stopping delivery to the others.

use crate::collaborators::{EmailMessage, EmailSender};
use crate::error::{CoreError, CoreResult};
use crate::models::{Notification, NotificationKind, PrincipalRecord, RelatedEntity};
use crate::store::{NotificationStore, PrincipalDirectory};
use casebook_policy::Role;
use casebook_types::NonEmptyText;
use casebook_uuid::RecordId;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    One(RecordId),
    /// Every active principal with `role`, within `department` when given.
    RoleInDepartment {
        role: Role,
        department: Option<NonEmptyText>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationEvent {
    pub recipients: Recipients,
    pub sender: Option<RecordId>,
    pub kind: NotificationKind,
    pub message: String,
    pub related: Option<RelatedEntity>,
}

/// Result of one dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dispatched {
    /// Stored notifications, in recipient order.
    pub notifications: Vec<RecordId>,
    /// One message per recipient whose notification could not be stored.
    pub failures: Vec<String>,
}

pub trait NotificationSink: Send + Sync {
    /// Creates the notifications for `event`.
    ///
    /// Fails only when the recipients cannot be resolved.
    fn dispatch(&self, event: &NotificationEvent) -> CoreResult<Dispatched>;
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifications: Arc<dyn NotificationStore>,
    principals: Arc<dyn PrincipalDirectory>,
    email: Arc<dyn EmailSender>,
}

impl NotificationDispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        principals: Arc<dyn PrincipalDirectory>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            notifications,
            principals,
            email,
        }
    }

    fn resolve(&self, recipients: &Recipients) -> CoreResult<Vec<PrincipalRecord>> {
        match recipients {
            Recipients::One(id) => {
                let record = self
                    .principals
                    .find_principal(*id)?
                    .ok_or_else(|| CoreError::not_found("principal", id))?;
                Ok(vec![record])
            }
            Recipients::RoleInDepartment { role, department } => Ok(self
                .principals
                .find_by_role(*role, department.as_ref())?
                .into_iter()
                .filter(|p| p.active)
                .collect()),
        }
    }

    /// Returns true if the email went out.
    fn try_email(&self, recipient: &PrincipalRecord, event: &NotificationEvent) -> bool {
        let message = EmailMessage {
            to: recipient.email.clone(),
            subject: event.kind.title().to_owned(),
            body: event.message.clone(),
        };
        match self.email.send(&message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(recipient = %recipient.id, "notification email failed: {e}");
                false
            }
        }
    }

    /// Notifications addressed to `recipient`, newest first.
    pub fn list_for_recipient(
        &self,
        recipient: RecordId,
        unread_only: bool,
    ) -> CoreResult<Vec<Notification>> {
        self.notifications.list_notifications(recipient, unread_only)
    }

    /// Marks one of the recipient's notifications read.
    ///
    /// Someone else's notification is reported as not found.
    pub fn mark_read(&self, id: RecordId, recipient: RecordId) -> CoreResult<Notification> {
        match self.notifications.find_notification(id)? {
            Some(n) if n.recipient == recipient => self.notifications.mark_notification_read(id),
            _ => Err(CoreError::not_found("notification", id)),
        }
    }
}

impl NotificationSink for NotificationDispatcher {
    fn dispatch(&self, event: &NotificationEvent) -> CoreResult<Dispatched> {
        let recipients = self.resolve(&event.recipients)?;
        let mut dispatched = Dispatched::default();

        for recipient in &recipients {
            let notification = Notification {
                id: RecordId::new(),
                recipient: recipient.id,
                sender: event.sender,
                kind: event.kind,
                title: event.kind.title().to_owned(),
                message: event.message.clone(),
                related: event.related,
                is_read: false,
                email_sent: false,
                created_at: Utc::now(),
            };
            if let Err(e) = self.notifications.insert_notification(&notification) {
                tracing::warn!(recipient = %recipient.id, "failed to store notification: {e}");
                dispatched
                    .failures
                    .push(format!("recipient {}: {e}", recipient.id));
                continue;
            }
            dispatched.notifications.push(notification.id);

            if recipient.email_notifications && self.try_email(recipient, event) {
                if let Err(e) = self.notifications.mark_notification_emailed(notification.id) {
                    tracing::warn!(
                        notification_id = %notification.id,
                        "failed to record email delivery: {e}"
                    );
                }
            }
        }

        tracing::debug!(
            kind = ?event.kind,
            count = dispatched.notifications.len(),
            failed = dispatched.failures.len(),
            "notifications dispatched"
        );
        Ok(dispatched)
    }
}
