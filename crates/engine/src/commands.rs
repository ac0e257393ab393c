//! Command structs for engine operations.
//!
//! These types group parameters for the write operations that take more than
//! a couple of inputs, keeping call sites readable and avoiding long argument
//! lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    BudgetRequestStatus, InvoiceType, MoneyCents,
    advances::AdvanceStatus,
    deletion_requests::DeletionRequestStatus,
    invoices::InvoiceStatus,
};

/// Outcome chosen by a reviewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
}

/// Create a budget request on behalf of the calling principal.
#[derive(Clone, Debug)]
pub struct NewBudgetRequestCmd {
    pub company_id: Uuid,
    pub requested_amount: MoneyCents,
    pub justification: String,
}

impl NewBudgetRequestCmd {
    #[must_use]
    pub fn new(
        company_id: Uuid,
        requested_amount: MoneyCents,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            company_id,
            requested_amount,
            justification: justification.into(),
        }
    }
}

/// Filters for the admin bulk delete of budget requests. All present filters
/// must match (AND).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRequestBulkFilter {
    pub statuses: Option<Vec<BudgetRequestStatus>>,
    pub user_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Only requests created more than this many days ago.
    pub older_than_days: Option<u32>,
}

impl BudgetRequestBulkFilter {
    pub fn is_empty(&self) -> bool {
        self.statuses.as_ref().is_none_or(Vec::is_empty)
            && self.user_id.is_none()
            && self.created_from.is_none()
            && self.created_to.is_none()
            && self.older_than_days.is_none()
    }
}

/// Filters for listing budget requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BudgetRequestListFilter {
    pub status: Option<BudgetRequestStatus>,
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

/// Manually create an advance for a user.
#[derive(Clone, Debug)]
pub struct NewAdvanceCmd {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub amount: MoneyCents,
    pub description: String,
}

/// Bank transfer metadata recorded when money leaves the company account.
#[derive(Clone, Debug, Default)]
pub struct TransferInfo {
    pub transfer_number: Option<String>,
    pub transfer_date: Option<DateTime<Utc>>,
}

impl TransferInfo {
    #[must_use]
    pub fn number(transfer_number: impl Into<String>) -> Self {
        Self {
            transfer_number: Some(transfer_number.into()),
            transfer_date: None,
        }
    }

    #[must_use]
    pub fn date(mut self, transfer_date: DateTime<Utc>) -> Self {
        self.transfer_date = Some(transfer_date);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvanceListFilter {
    pub status: Option<AdvanceStatus>,
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
}

/// Submit an invoice on behalf of the calling principal.
#[derive(Clone, Debug)]
pub struct NewInvoiceCmd {
    pub company_id: Uuid,
    pub invoice_number: String,
    pub ksef_number: Option<String>,
    pub image_key: String,
    pub amount: MoneyCents,
    pub invoice_type: InvoiceType,
    pub original_invoice_id: Option<Uuid>,
    pub advance_id: Option<Uuid>,
    pub budget_request_id: Option<Uuid>,
    pub description: Option<String>,
    pub justification: Option<String>,
}

impl NewInvoiceCmd {
    #[must_use]
    pub fn new(
        company_id: Uuid,
        invoice_number: impl Into<String>,
        amount: MoneyCents,
        image_key: impl Into<String>,
    ) -> Self {
        Self {
            company_id,
            invoice_number: invoice_number.into(),
            ksef_number: None,
            image_key: image_key.into(),
            amount,
            invoice_type: InvoiceType::Einvoice,
            original_invoice_id: None,
            advance_id: None,
            budget_request_id: None,
            description: None,
            justification: None,
        }
    }

    #[must_use]
    pub fn invoice_type(mut self, invoice_type: InvoiceType) -> Self {
        self.invoice_type = invoice_type;
        self
    }

    #[must_use]
    pub fn correction_of(mut self, original_invoice_id: Uuid) -> Self {
        self.invoice_type = InvoiceType::Correction;
        self.original_invoice_id = Some(original_invoice_id);
        self
    }

    #[must_use]
    pub fn advance(mut self, advance_id: Uuid) -> Self {
        self.advance_id = Some(advance_id);
        self
    }

    #[must_use]
    pub fn budget_request(mut self, budget_request_id: Uuid) -> Self {
        self.budget_request_id = Some(budget_request_id);
        self
    }

    #[must_use]
    pub fn ksef_number(mut self, ksef_number: impl Into<String>) -> Self {
        self.ksef_number = Some(ksef_number.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvoiceListFilter {
    pub status: Option<InvoiceStatus>,
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub advance_id: Option<Uuid>,
    pub budget_request_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeletionRequestListFilter {
    pub status: Option<DeletionRequestStatus>,
    pub invoice_id: Option<Uuid>,
}
