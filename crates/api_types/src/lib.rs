//! JSON request and response bodies shared by the server and its clients.
//!
//! Amounts travel as decimal strings in PLN (`"123.45"`), ids as UUID
//! strings, timestamps as RFC 3339.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome chosen by a reviewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

/// Body returned by every mutation that has nothing else to report.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Error body for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub mod budget_request {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetRequestNew {
        pub company_id: Uuid,
        pub requested_amount: String,
        pub justification: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetRequestCreated {
        pub request_id: Uuid,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetRequestQuery {
        pub status: Option<String>,
        pub user_id: Option<Uuid>,
        pub company_id: Option<Uuid>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetRequestView {
        pub id: Uuid,
        pub user_id: Uuid,
        pub company_id: Uuid,
        pub requested_amount: String,
        pub current_balance_at_request: String,
        pub justification: String,
        pub status: String,
        pub rejection_reason: Option<String>,
        pub transfer_number: Option<String>,
        pub transfer_date: Option<DateTime<Utc>>,
        pub reviewed_by: Option<Uuid>,
        pub reviewed_at: Option<DateTime<Utc>>,
        pub transfer_confirmed_by: Option<Uuid>,
        pub transfer_confirmed_at: Option<DateTime<Utc>>,
        pub settled_by: Option<Uuid>,
        pub settled_at: Option<DateTime<Utc>>,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetRequestReview {
        pub action: ReviewAction,
        pub rejection_reason: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetRequestReviewResponse {
        pub success: bool,
        pub message: String,
        pub advance_id: Option<Uuid>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransferConfirm {
        pub transfer_number: String,
        pub transfer_date: Option<DateTime<Utc>>,
    }

    /// All present filters must match.
    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BulkDeleteFilters {
        pub statuses: Option<Vec<String>>,
        pub user_id: Option<Uuid>,
        pub created_from: Option<DateTime<Utc>>,
        pub created_to: Option<DateTime<Utc>>,
        pub older_than_days: Option<u32>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BulkDelete {
        #[serde(default)]
        pub filters: BulkDeleteFilters,
        pub admin_password: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BulkDeleteResponse {
        pub deleted_count: u64,
    }
}

/// Response of both settlement procedures.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub success: bool,
    pub message: String,
    pub linked_invoice_ids: Vec<Uuid>,
}

pub mod advance {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AdvanceNew {
        pub user_id: Uuid,
        pub company_id: Uuid,
        pub amount: String,
        pub description: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AdvanceQuery {
        pub status: Option<String>,
        pub user_id: Option<Uuid>,
        pub company_id: Option<Uuid>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AdvanceTransfer {
        pub transfer_number: Option<String>,
        pub transfer_date: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AdvanceView {
        pub id: Uuid,
        pub user_id: Uuid,
        pub company_id: Uuid,
        pub amount: String,
        pub description: String,
        pub status: String,
        pub source_type: String,
        pub source_id: Option<Uuid>,
        pub transfer_number: Option<String>,
        pub transfer_date: Option<DateTime<Utc>>,
        pub transfer_confirmed_by: Option<Uuid>,
        pub transfer_confirmed_at: Option<DateTime<Utc>>,
        pub settled_by: Option<Uuid>,
        pub settled_at: Option<DateTime<Utc>>,
        pub created_by: Uuid,
        pub created_at: DateTime<Utc>,
    }
}

pub mod invoice {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InvoiceNew {
        pub company_id: Uuid,
        pub invoice_number: String,
        pub amount: String,
        /// `einvoice` (default), `paragon` or `correction`.
        pub invoice_type: Option<String>,
        pub image_key: String,
        pub ksef_number: Option<String>,
        pub original_invoice_id: Option<Uuid>,
        pub advance_id: Option<Uuid>,
        pub budget_request_id: Option<Uuid>,
        pub description: Option<String>,
        pub justification: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InvoiceQuery {
        pub status: Option<String>,
        pub user_id: Option<Uuid>,
        pub company_id: Option<Uuid>,
        pub advance_id: Option<Uuid>,
        pub budget_request_id: Option<Uuid>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InvoiceReview {
        pub action: ReviewAction,
        pub rejection_reason: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InvoiceView {
        pub id: Uuid,
        pub user_id: Uuid,
        pub company_id: Uuid,
        pub invoice_number: String,
        pub ksef_number: Option<String>,
        pub image_key: String,
        pub amount: String,
        pub status: String,
        pub invoice_type: String,
        pub original_invoice_id: Option<Uuid>,
        pub advance_id: Option<Uuid>,
        pub budget_request_id: Option<Uuid>,
        pub description: Option<String>,
        pub justification: Option<String>,
        pub rejection_reason: Option<String>,
        pub reviewed_by: Option<Uuid>,
        pub reviewed_at: Option<DateTime<Utc>>,
        pub transferred_at: Option<DateTime<Utc>>,
        pub settled_by: Option<Uuid>,
        pub settled_at: Option<DateTime<Utc>>,
        pub created_at: DateTime<Utc>,
    }
}

pub mod deletion_request {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeletionRequestNew {
        pub invoice_id: Uuid,
        pub reason: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeletionRequestCreated {
        pub success: bool,
        pub request_id: Uuid,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeletionRequestQuery {
        pub status: Option<String>,
        pub invoice_id: Option<Uuid>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeletionRequestReview {
        pub action: ReviewAction,
        pub rejection_reason: Option<String>,
        pub admin_password: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeletionRequestView {
        pub id: Uuid,
        pub invoice_id: Uuid,
        pub requested_by: Uuid,
        pub reason: String,
        pub status: String,
        pub reviewed_by: Option<Uuid>,
        pub reviewed_at: Option<DateTime<Utc>>,
        pub rejection_reason: Option<String>,
        pub created_at: DateTime<Utc>,
    }
}

pub mod ledger {
    use super::*;

    /// Body of both the top-up and the admin adjustment.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BalanceChange {
        /// Signed for adjustments, positive for top-ups.
        pub amount: String,
        pub notes: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LedgerEntryView {
        pub id: Uuid,
        pub seq: i64,
        pub amount: String,
        pub balance_before: String,
        pub balance_after: String,
        pub transaction_type: String,
        pub reference_id: Option<Uuid>,
        pub notes: Option<String>,
        pub created_by: Uuid,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LedgerReportView {
        pub user_id: Uuid,
        pub stored_balance: String,
        pub replayed_balance: String,
        pub entries: usize,
        pub consistent: bool,
        pub problems: Vec<String>,
    }
}

pub mod company {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CompanyNew {
        pub name: String,
        pub tax_id: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CompanyPatch {
        pub active: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CompanyView {
        pub id: Uuid,
        pub name: String,
        pub tax_id: Option<String>,
        pub active: bool,
        pub created_at: DateTime<Utc>,
    }

    /// The complete permission set of a user.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UserCompanies {
        pub company_ids: Vec<Uuid>,
    }
}

pub mod user {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UserView {
        pub id: Uuid,
        pub username: String,
        pub role: String,
        pub balance: String,
        pub created_at: DateTime<Utc>,
    }
}
