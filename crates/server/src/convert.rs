//! Mapping between engine domain types and API bodies.

use api_types::{
    advance::AdvanceView, budget_request::BudgetRequestView, company::CompanyView,
    deletion_request::DeletionRequestView, invoice::InvoiceView,
    ledger::{LedgerEntryView, LedgerReportView},
    user::UserView,
};
use engine::{
    Advance, BudgetRequest, Company, DeletionRequest, Invoice, LedgerEntry, LedgerReport,
    MoneyCents, ReviewAction, User,
};

use crate::ServerError;

pub fn parse_amount(raw: &str) -> Result<MoneyCents, ServerError> {
    Ok(raw.parse::<MoneyCents>()?)
}

/// Parse an optional status query parameter with the engine's own parser.
pub fn parse_status<'a, T>(raw: Option<&'a str>) -> Result<Option<T>, ServerError>
where
    T: TryFrom<&'a str, Error = engine::EngineError>,
{
    Ok(raw.map(T::try_from).transpose()?)
}

pub fn review_action(action: api_types::ReviewAction) -> ReviewAction {
    match action {
        api_types::ReviewAction::Approve => ReviewAction::Approve,
        api_types::ReviewAction::Reject => ReviewAction::Reject,
    }
}

pub fn budget_request_view(request: BudgetRequest) -> BudgetRequestView {
    BudgetRequestView {
        id: request.id,
        user_id: request.user_id,
        company_id: request.company_id,
        requested_amount: request.requested_amount.to_string(),
        current_balance_at_request: request.current_balance_at_request.to_string(),
        justification: request.justification,
        status: request.status.as_str().to_string(),
        rejection_reason: request.rejection_reason,
        transfer_number: request.transfer_number,
        transfer_date: request.transfer_date,
        reviewed_by: request.reviewed_by,
        reviewed_at: request.reviewed_at,
        transfer_confirmed_by: request.transfer_confirmed_by,
        transfer_confirmed_at: request.transfer_confirmed_at,
        settled_by: request.settled_by,
        settled_at: request.settled_at,
        created_at: request.created_at,
    }
}

pub fn advance_view(advance: Advance) -> AdvanceView {
    AdvanceView {
        id: advance.id,
        user_id: advance.user_id,
        company_id: advance.company_id,
        amount: advance.amount.to_string(),
        description: advance.description,
        status: advance.status.as_str().to_string(),
        source_type: advance.source_type.as_str().to_string(),
        source_id: advance.source_id,
        transfer_number: advance.transfer_number,
        transfer_date: advance.transfer_date,
        transfer_confirmed_by: advance.transfer_confirmed_by,
        transfer_confirmed_at: advance.transfer_confirmed_at,
        settled_by: advance.settled_by,
        settled_at: advance.settled_at,
        created_by: advance.created_by,
        created_at: advance.created_at,
    }
}

pub fn invoice_view(invoice: Invoice) -> InvoiceView {
    InvoiceView {
        id: invoice.id,
        user_id: invoice.user_id,
        company_id: invoice.company_id,
        invoice_number: invoice.invoice_number,
        ksef_number: invoice.ksef_number,
        image_key: invoice.image_key,
        amount: invoice.amount.to_string(),
        status: invoice.status.as_str().to_string(),
        invoice_type: invoice.invoice_type.as_str().to_string(),
        original_invoice_id: invoice.original_invoice_id,
        advance_id: invoice.advance_id,
        budget_request_id: invoice.budget_request_id,
        description: invoice.description,
        justification: invoice.justification,
        rejection_reason: invoice.rejection_reason,
        reviewed_by: invoice.reviewed_by,
        reviewed_at: invoice.reviewed_at,
        transferred_at: invoice.transferred_at,
        settled_by: invoice.settled_by,
        settled_at: invoice.settled_at,
        created_at: invoice.created_at,
    }
}

pub fn deletion_request_view(request: DeletionRequest) -> DeletionRequestView {
    DeletionRequestView {
        id: request.id,
        invoice_id: request.invoice_id,
        requested_by: request.requested_by,
        reason: request.reason,
        status: request.status.as_str().to_string(),
        reviewed_by: request.reviewed_by,
        reviewed_at: request.reviewed_at,
        rejection_reason: request.rejection_reason,
        created_at: request.created_at,
    }
}

pub fn ledger_entry_view(entry: LedgerEntry) -> LedgerEntryView {
    LedgerEntryView {
        id: entry.id,
        seq: entry.seq,
        amount: entry.amount.to_string(),
        balance_before: entry.balance_before.to_string(),
        balance_after: entry.balance_after.to_string(),
        transaction_type: entry.transaction_type.as_str().to_string(),
        reference_id: entry.reference_id,
        notes: entry.notes,
        created_by: entry.created_by,
        created_at: entry.created_at,
    }
}

pub fn ledger_report_view(report: LedgerReport) -> LedgerReportView {
    LedgerReportView {
        user_id: report.user_id,
        stored_balance: report.stored_balance.to_string(),
        replayed_balance: report.replayed_balance.to_string(),
        entries: report.entries,
        consistent: report.consistent,
        problems: report.problems,
    }
}

pub fn company_view(company: Company) -> CompanyView {
    CompanyView {
        id: company.id,
        name: company.name,
        tax_id: company.tax_id,
        active: company.active,
        created_at: company.created_at,
    }
}

pub fn user_view(user: User) -> UserView {
    UserView {
        id: user.id,
        username: user.username,
        role: user.role.as_str().to_string(),
        balance: user.balance.to_string(),
        created_at: user.created_at,
    }
}
