//! Settlement engine for employee budget requests, advances and invoices.
//!
//! Every operation takes the calling [`Principal`] and re-checks the role it
//! needs. State transitions are written as status-guarded conditional updates
//! inside a database transaction: a guard that matches no row surfaces as
//! [`EngineError::Conflict`], so two reviewers racing on the same row get one
//! success and one conflict, never a double apply.

pub use advances::{Advance, AdvanceSource, AdvanceStatus};
pub use blobs::{BlobError, BlobStore, FsBlobStore, NoopBlobStore};
pub use budget_requests::{BudgetRequest, BudgetRequestStatus};
pub use commands::{
    AdvanceListFilter, BudgetRequestBulkFilter, BudgetRequestListFilter,
    DeletionRequestListFilter, InvoiceListFilter, NewAdvanceCmd, NewBudgetRequestCmd,
    NewInvoiceCmd, ReviewAction, TransferInfo,
};
pub use companies::Company;
pub use deletion_requests::{DeletionRequest, DeletionRequestStatus};
pub use error::EngineError;
pub use invoices::{Invoice, InvoiceStatus, InvoiceType};
pub use money::MoneyCents;
pub use notify::{Notification, NotificationKind, Notifier, NotifyError, TracingNotifier};
pub use ops::{
    BudgetRequestReview, Engine, EngineBuilder, LedgerReport, SettlementOutcome,
};
pub use password::{PasswordPolicy, hash_password, verify_password};
pub use saldo_transactions::{LedgerEntry, LedgerKind};
pub use users::{Principal, Role, User};

pub mod advances;
mod blobs;
pub mod budget_requests;
mod commands;
pub mod companies;
pub mod company_permissions;
pub mod deletion_requests;
mod error;
pub mod invoices;
mod money;
mod notify;
mod ops;
mod password;
pub mod saldo_transactions;
pub mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
