//! Outbound notifications.
//!
//! Notifications are a side channel: the engine sends them only after the
//! authoritative transaction has committed, and a failing [`Notifier`] never
//! turns a successful transition into an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BudgetRequestCreated,
    BudgetRequestApproved,
    BudgetRequestRejected,
    BudgetRequestTransferConfirmed,
    BudgetRequestSettled,
    AdvanceTransferred,
    AdvanceSettled,
    InvoiceAccepted,
    InvoiceRejected,
    DeletionRequestCreated,
    DeletionRequestReviewed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// The entity the notification is about.
    pub reference_id: Option<Uuid>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        kind: NotificationKind,
        message: impl Into<String>,
        reference_id: Option<Uuid>,
    ) -> Self {
        Self {
            recipient_id,
            kind,
            message: message.into(),
            reference_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Unavailable(String),
}

/// Delivery channel for [`Notification`]s.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Default notifier: writes every notification to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient_id,
            kind = ?notification.kind,
            reference = ?notification.reference_id,
            "{}",
            notification.message
        );
        Ok(())
    }
}
