use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    DeletionRequestStatus, EngineError, Invoice, InvoiceListFilter, InvoiceStatus, InvoiceType,
    LedgerKind, MoneyCents, NewInvoiceCmd, Notification, NotificationKind, Principal,
    ResultEngine, ReviewAction, deletion_requests, invoices,
    util::{
        MIN_REASON_LEN, expect_single_row, normalize_optional_text, parse_uuid,
        require_optional_text, require_positive, require_text,
    },
};

use super::{
    Engine,
    access::{require_admin, require_reviewer, require_visible},
    ledger::BalanceChange,
    with_tx,
};

/// Invoices closed by a settlement cascade.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub settled_invoice_ids: Vec<Uuid>,
}

/// The parent a settlement cascade follows.
pub(super) enum InvoiceLink {
    Advance(String),
    BudgetRequest(String),
}

impl Engine {
    pub(super) async fn require_invoice<C: ConnectionTrait>(
        &self,
        db: &C,
        invoice_id: Uuid,
    ) -> ResultEngine<invoices::Model> {
        invoices::Entity::find_by_id(invoice_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("invoice not exists".to_string()))
    }

    /// Move every invoice hanging off `link` whose status is in `statuses` to
    /// `settled`. Returns the ids that were closed.
    pub(super) async fn settle_linked_invoices<C: ConnectionTrait>(
        &self,
        db_tx: &C,
        link: InvoiceLink,
        statuses: &[InvoiceStatus],
        settled_by: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<Vec<Uuid>> {
        let link_filter = match link {
            InvoiceLink::Advance(id) => invoices::Column::AdvanceId.eq(id),
            InvoiceLink::BudgetRequest(id) => invoices::Column::BudgetRequestId.eq(id),
        };
        let statuses: Vec<&str> = statuses.iter().map(|status| status.as_str()).collect();

        let ids: Vec<String> = invoices::Entity::find()
            .select_only()
            .column(invoices::Column::Id)
            .filter(link_filter)
            .filter(invoices::Column::Status.is_in(statuses.clone()))
            .into_tuple()
            .all(db_tx)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let res = invoices::Entity::update_many()
            .col_expr(
                invoices::Column::Status,
                Expr::value(InvoiceStatus::Settled.as_str()),
            )
            .col_expr(
                invoices::Column::SettledBy,
                Expr::value(settled_by.to_string()),
            )
            .col_expr(invoices::Column::SettledAt, Expr::value(now))
            .filter(invoices::Column::Id.is_in(ids.clone()))
            .filter(invoices::Column::Status.is_in(statuses))
            .exec(db_tx)
            .await?;
        if res.rows_affected != ids.len() as u64 {
            return Err(EngineError::already_processed("linked invoices"));
        }

        ids.iter().map(|id| parse_uuid(id, "invoice")).collect()
    }

    /// Submit an invoice on behalf of the principal.
    pub async fn create_invoice(
        &self,
        principal: &Principal,
        cmd: NewInvoiceCmd,
    ) -> ResultEngine<Invoice> {
        let invoice_number = require_text(&cmd.invoice_number, 1, "invoice number")?;
        let image_key = require_text(&cmd.image_key, 1, "image key")?;
        require_positive(cmd.amount, "amount")?;
        match (cmd.invoice_type, cmd.original_invoice_id) {
            (InvoiceType::Correction, None) => {
                return Err(EngineError::BadRequest(
                    "a correction must reference the original invoice".to_string(),
                ));
            }
            (InvoiceType::Einvoice | InvoiceType::Paragon, Some(_)) => {
                return Err(EngineError::BadRequest(
                    "only corrections may reference an original invoice".to_string(),
                ));
            }
            _ => {}
        }
        let owner = principal.id.to_string();
        let company = cmd.company_id.to_string();

        let model = with_tx!(self, |db_tx| {
            self.require_active_company(&db_tx, cmd.company_id).await?;
            self.require_company_access(&db_tx, principal, cmd.company_id)
                .await?;

            if let Some(original_id) = cmd.original_invoice_id {
                let original = invoices::Entity::find_by_id(original_id.to_string())
                    .one(&db_tx)
                    .await?;
                if original.is_none_or(|original| original.user_id != owner) {
                    return Err(EngineError::BadRequest(
                        "original invoice must be one of your own invoices".to_string(),
                    ));
                }
            }
            if let Some(advance_id) = cmd.advance_id {
                let advance = self.require_advance(&db_tx, advance_id).await?;
                if advance.user_id != owner || advance.company_id != company {
                    return Err(EngineError::BadRequest(
                        "advance belongs to another user or company".to_string(),
                    ));
                }
            }
            if let Some(request_id) = cmd.budget_request_id {
                let request = self.require_budget_request(&db_tx, request_id).await?;
                if request.user_id != owner || request.company_id != company {
                    return Err(EngineError::BadRequest(
                        "budget request belongs to another user or company".to_string(),
                    ));
                }
            }

            let duplicate = invoices::Entity::find()
                .filter(invoices::Column::UserId.eq(owner.clone()))
                .filter(invoices::Column::CompanyId.eq(company.clone()))
                .filter(invoices::Column::InvoiceNumber.eq(invoice_number.clone()))
                .one(&db_tx)
                .await?
                .is_some();
            if duplicate {
                return Err(EngineError::Conflict(format!(
                    "invoice '{invoice_number}' was already submitted for this company"
                )));
            }

            let model = invoices::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                user_id: ActiveValue::Set(owner.clone()),
                company_id: ActiveValue::Set(company.clone()),
                invoice_number: ActiveValue::Set(invoice_number.clone()),
                ksef_number: ActiveValue::Set(normalize_optional_text(cmd.ksef_number.as_deref())),
                image_key: ActiveValue::Set(image_key.clone()),
                amount: ActiveValue::Set(cmd.amount.cents()),
                status: ActiveValue::Set(InvoiceStatus::Pending.as_str().to_string()),
                invoice_type: ActiveValue::Set(cmd.invoice_type.as_str().to_string()),
                original_invoice_id: ActiveValue::Set(
                    cmd.original_invoice_id.map(|id| id.to_string()),
                ),
                advance_id: ActiveValue::Set(cmd.advance_id.map(|id| id.to_string())),
                budget_request_id: ActiveValue::Set(
                    cmd.budget_request_id.map(|id| id.to_string()),
                ),
                description: ActiveValue::Set(normalize_optional_text(cmd.description.as_deref())),
                justification: ActiveValue::Set(normalize_optional_text(
                    cmd.justification.as_deref(),
                )),
                rejection_reason: ActiveValue::Set(None),
                reviewed_by: ActiveValue::Set(None),
                reviewed_at: ActiveValue::Set(None),
                transferred_at: ActiveValue::Set(None),
                settled_by: ActiveValue::Set(None),
                settled_at: ActiveValue::Set(None),
                created_at: ActiveValue::Set(Utc::now()),
            };
            Ok(model.insert(&db_tx).await?)
        })?;

        let invoice = Invoice::try_from(model)?;
        tracing::info!(invoice = %invoice.id, user = %invoice.user_id, amount = %invoice.amount, "invoice created");
        Ok(invoice)
    }

    /// Claim a pending invoice for review.
    ///
    /// Authorization: accountant or admin.
    pub async fn start_invoice_review(
        &self,
        principal: &Principal,
        invoice_id: Uuid,
    ) -> ResultEngine<Invoice> {
        require_reviewer(principal)?;
        let model = with_tx!(self, |db_tx| {
            let res = invoices::Entity::update_many()
                .col_expr(
                    invoices::Column::Status,
                    Expr::value(InvoiceStatus::InReview.as_str()),
                )
                .col_expr(
                    invoices::Column::ReviewedBy,
                    Expr::value(principal.id.to_string()),
                )
                .filter(invoices::Column::Id.eq(invoice_id.to_string()))
                .filter(invoices::Column::Status.eq(InvoiceStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            let model = self.require_invoice(&db_tx, invoice_id).await?;
            expect_single_row(res.rows_affected, "invoice")?;
            Ok(model)
        })?;

        tracing::info!(invoice = %invoice_id, reviewer = %principal.id, "invoice review started");
        Invoice::try_from(model)
    }

    /// Accept or reject an invoice.
    ///
    /// Accepting deducts the amount from the owner's balance. Rejecting an
    /// invoice that was already accepted refunds that deduction.
    ///
    /// Authorization: accountant or admin.
    pub async fn review_invoice(
        &self,
        principal: &Principal,
        invoice_id: Uuid,
        action: ReviewAction,
        rejection_reason: Option<&str>,
    ) -> ResultEngine<Invoice> {
        require_reviewer(principal)?;
        let reason = match action {
            ReviewAction::Approve => None,
            ReviewAction::Reject => Some(require_optional_text(
                rejection_reason,
                MIN_REASON_LEN,
                "rejection reason",
            )?),
        };

        let model = with_tx!(self, |db_tx| {
            let model = self.require_invoice(&db_tx, invoice_id).await?;
            let current = InvoiceStatus::try_from(model.status.as_str())?;
            let allowed = match action {
                ReviewAction::Approve => {
                    matches!(current, InvoiceStatus::Pending | InvoiceStatus::InReview)
                }
                ReviewAction::Reject => matches!(
                    current,
                    InvoiceStatus::Pending | InvoiceStatus::InReview | InvoiceStatus::Accepted
                ),
            };
            if !allowed {
                return Err(EngineError::Conflict(format!(
                    "invoice is {}, it cannot be reviewed now",
                    current.as_str()
                )));
            }

            let (next, ledger) = match action {
                ReviewAction::Approve => (
                    InvoiceStatus::Accepted,
                    Some((LedgerKind::InvoiceDeduction, -MoneyCents::new(model.amount))),
                ),
                ReviewAction::Reject if current == InvoiceStatus::Accepted => (
                    InvoiceStatus::Rejected,
                    Some((LedgerKind::InvoiceRefund, MoneyCents::new(model.amount))),
                ),
                ReviewAction::Reject => (InvoiceStatus::Rejected, None),
            };

            let res = invoices::Entity::update_many()
                .col_expr(invoices::Column::Status, Expr::value(next.as_str()))
                .col_expr(
                    invoices::Column::RejectionReason,
                    Expr::value(reason.clone()),
                )
                .col_expr(
                    invoices::Column::ReviewedBy,
                    Expr::value(principal.id.to_string()),
                )
                .col_expr(invoices::Column::ReviewedAt, Expr::value(Utc::now()))
                .filter(invoices::Column::Id.eq(model.id.clone()))
                .filter(invoices::Column::Status.eq(current.as_str()))
                .exec(&db_tx)
                .await?;
            expect_single_row(res.rows_affected, "invoice")?;

            if let Some((kind, amount)) = ledger {
                self.post_balance_change(
                    &db_tx,
                    BalanceChange {
                        user_id: parse_uuid(&model.user_id, "user")?,
                        kind,
                        amount,
                        reference_id: Some(invoice_id),
                        notes: Some(format!("invoice {}", model.invoice_number)),
                        created_by: principal.id,
                    },
                )
                .await?;
            }
            self.require_invoice(&db_tx, invoice_id).await
        })?;

        let invoice = Invoice::try_from(model)?;
        tracing::info!(invoice = %invoice.id, status = invoice.status.as_str(), reviewer = %principal.id, "invoice reviewed");
        let notification = match action {
            ReviewAction::Approve => Notification::new(
                invoice.user_id,
                NotificationKind::InvoiceAccepted,
                format!(
                    "Invoice {} ({}) has been accepted",
                    invoice.invoice_number,
                    invoice.amount.display_pln()
                ),
                Some(invoice.id),
            ),
            ReviewAction::Reject => Notification::new(
                invoice.user_id,
                NotificationKind::InvoiceRejected,
                format!(
                    "Invoice {} has been rejected: {}",
                    invoice.invoice_number,
                    invoice.rejection_reason.as_deref().unwrap_or_default()
                ),
                Some(invoice.id),
            ),
        };
        self.dispatch(vec![notification]).await;
        Ok(invoice)
    }

    /// Record that an accepted invoice has been paid out.
    ///
    /// Authorization: accountant or admin.
    pub async fn mark_invoice_transferred(
        &self,
        principal: &Principal,
        invoice_id: Uuid,
    ) -> ResultEngine<Invoice> {
        require_reviewer(principal)?;
        let model = with_tx!(self, |db_tx| {
            let res = invoices::Entity::update_many()
                .col_expr(
                    invoices::Column::Status,
                    Expr::value(InvoiceStatus::Transferred.as_str()),
                )
                .col_expr(invoices::Column::TransferredAt, Expr::value(Utc::now()))
                .filter(invoices::Column::Id.eq(invoice_id.to_string()))
                .filter(invoices::Column::Status.eq(InvoiceStatus::Accepted.as_str()))
                .exec(&db_tx)
                .await?;
            let model = self.require_invoice(&db_tx, invoice_id).await?;
            if res.rows_affected != 1 {
                return Err(EngineError::stale("invoice", &model.status, "accepted"));
            }
            Ok(model)
        })?;

        tracing::info!(invoice = %invoice_id, "invoice transferred");
        Invoice::try_from(model)
    }

    /// Delete an invoice directly, refunding its deduction.
    ///
    /// Authorization: admin. Other roles go through a deletion request.
    pub async fn delete_invoice(&self, principal: &Principal, invoice_id: Uuid) -> ResultEngine<()> {
        require_admin(principal)?;
        let image_key = with_tx!(self, |db_tx| {
            let model = self.require_invoice(&db_tx, invoice_id).await?;
            self.delete_invoice_in_tx(&db_tx, &model, principal.id).await?;
            Ok(model.image_key)
        })?;

        tracing::info!(invoice = %invoice_id, admin = %principal.id, "invoice deleted");
        self.discard_blob(invoice_id, &image_key).await;
        Ok(())
    }

    /// Refund a deducted invoice, close any pending deletion request for it
    /// and remove the row. Settled invoices are kept.
    pub(super) async fn delete_invoice_in_tx<C: ConnectionTrait>(
        &self,
        db_tx: &C,
        model: &invoices::Model,
        acted_by: Uuid,
    ) -> ResultEngine<()> {
        let status = InvoiceStatus::try_from(model.status.as_str())?;
        if status == InvoiceStatus::Settled {
            return Err(EngineError::Conflict(
                "settled invoices cannot be deleted".to_string(),
            ));
        }
        if status.is_refundable() {
            self.post_balance_change(
                db_tx,
                BalanceChange {
                    user_id: parse_uuid(&model.user_id, "user")?,
                    kind: LedgerKind::InvoiceDeleteRefund,
                    amount: MoneyCents::new(model.amount),
                    reference_id: Some(parse_uuid(&model.id, "invoice")?),
                    notes: Some(format!("deleted invoice {}", model.invoice_number)),
                    created_by: acted_by,
                },
            )
            .await?;
        }

        deletion_requests::Entity::update_many()
            .col_expr(
                deletion_requests::Column::Status,
                Expr::value(DeletionRequestStatus::Approved.as_str()),
            )
            .col_expr(
                deletion_requests::Column::ReviewedBy,
                Expr::value(acted_by.to_string()),
            )
            .col_expr(deletion_requests::Column::ReviewedAt, Expr::value(Utc::now()))
            .filter(deletion_requests::Column::InvoiceId.eq(model.id.clone()))
            .filter(deletion_requests::Column::Status.eq(DeletionRequestStatus::Pending.as_str()))
            .exec(db_tx)
            .await?;

        let res = invoices::Entity::delete_many()
            .filter(invoices::Column::Id.eq(model.id.clone()))
            .filter(invoices::Column::Status.eq(model.status.clone()))
            .exec(db_tx)
            .await?;
        expect_single_row(res.rows_affected, "invoice")
    }

    /// Users see their own invoices; reviewers see everything.
    pub async fn list_invoices(
        &self,
        principal: &Principal,
        filter: InvoiceListFilter,
    ) -> ResultEngine<Vec<Invoice>> {
        let mut query = invoices::Entity::find();
        let user_id = if principal.is_reviewer() {
            filter.user_id
        } else {
            Some(principal.id)
        };
        if let Some(user_id) = user_id {
            query = query.filter(invoices::Column::UserId.eq(user_id.to_string()));
        }
        if let Some(company_id) = filter.company_id {
            query = query.filter(invoices::Column::CompanyId.eq(company_id.to_string()));
        }
        if let Some(status) = filter.status {
            query = query.filter(invoices::Column::Status.eq(status.as_str()));
        }
        if let Some(advance_id) = filter.advance_id {
            query = query.filter(invoices::Column::AdvanceId.eq(advance_id.to_string()));
        }
        if let Some(request_id) = filter.budget_request_id {
            query = query.filter(invoices::Column::BudgetRequestId.eq(request_id.to_string()));
        }
        query
            .order_by_desc(invoices::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Invoice::try_from)
            .collect()
    }

    pub async fn invoice(&self, principal: &Principal, invoice_id: Uuid) -> ResultEngine<Invoice> {
        let model = self.require_invoice(&self.database, invoice_id).await?;
        require_visible(principal, &model.user_id, "invoice")?;
        Invoice::try_from(model)
    }
}
