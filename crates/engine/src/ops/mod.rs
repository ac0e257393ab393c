use std::sync::Arc;

use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::{
    BlobStore, NoopBlobStore, Notification, Notifier, PasswordPolicy, ResultEngine,
    TracingNotifier,
};

mod access;
mod advances;
mod budget_requests;
mod companies;
mod deletion_requests;
mod invoices;
mod ledger;
mod users;

pub use budget_requests::BudgetRequestReview;
pub use invoices::SettlementOutcome;
pub use ledger::LedgerReport;

/// Run a block inside a DB transaction, committing on success and rolling back
/// on error (the transaction is dropped without commit).
///
/// Database errors leaving the block go through [`EngineError::from_tx`], so a
/// writer that lost a race surfaces as `Conflict`.
///
/// [`EngineError::from_tx`]: crate::EngineError::from_tx
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let result: $crate::ResultEngine<_> = async {
            let $tx = $self
                .database
                .begin()
                .await
                .map_err($crate::EngineError::from_tx)?;
            let body: $crate::ResultEngine<_> = async { $body }.await;
            let value = body?;
            $tx.commit().await.map_err($crate::EngineError::from_tx)?;
            Ok(value)
        }
        .await;
        match result {
            Err($crate::EngineError::Database(err)) => Err($crate::EngineError::from_tx(err)),
            other => other,
        }
    }};
}

pub(crate) use with_tx;

pub struct Engine {
    database: DatabaseConnection,
    notifier: Arc<dyn Notifier>,
    blobs: Arc<dyn BlobStore>,
    password_policy: PasswordPolicy,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Deliver notifications after a commit. Failures are logged and dropped.
    async fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            if let Err(err) = self.notifier.notify(&notification).await {
                tracing::warn!(
                    recipient = %notification.recipient_id,
                    kind = ?notification.kind,
                    "failed to deliver notification: {err}"
                );
            }
        }
    }

    /// Delete an invoice scan after a commit. Failures are logged and dropped.
    async fn discard_blob(&self, invoice_id: Uuid, key: &str) {
        if let Err(err) = self.blobs.delete(key).await {
            tracing::warn!(invoice = %invoice_id, key, "failed to delete invoice blob: {err}");
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    notifier: Option<Arc<dyn Notifier>>,
    blobs: Option<Arc<dyn BlobStore>>,
    password_policy: PasswordPolicy,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Notification channel; defaults to logging every notification.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> EngineBuilder {
        self.notifier = Some(notifier);
        self
    }

    /// Blob storage for invoice scans; defaults to a store with nothing in it.
    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> EngineBuilder {
        self.blobs = Some(blobs);
        self
    }

    pub fn password_policy(mut self, policy: PasswordPolicy) -> EngineBuilder {
        self.password_policy = policy;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            blobs: self.blobs.unwrap_or_else(|| Arc::new(NoopBlobStore)),
            password_policy: self.password_policy,
        })
    }
}
