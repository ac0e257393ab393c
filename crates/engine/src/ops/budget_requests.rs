use chrono::{Duration, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Advance, AdvanceSource, AdvanceStatus, BudgetRequest, BudgetRequestBulkFilter,
    BudgetRequestListFilter, BudgetRequestStatus, EngineError, InvoiceStatus, MoneyCents,
    NewAdvanceCmd, NewBudgetRequestCmd, Notification, NotificationKind, Principal,
    ResultEngine, ReviewAction, Role, TransferInfo, advances, budget_requests,
    util::{
        MIN_JUSTIFICATION_LEN, MIN_REASON_LEN, expect_single_row, parse_uuid,
        require_optional_text, require_positive, require_text,
    },
};

use super::{
    Engine, SettlementOutcome,
    access::{require_admin, require_reviewer, require_visible},
    advances::TransferStamp,
    invoices::InvoiceLink,
    with_tx,
};

const PENDING_EXISTS: &str =
    "an existing pending request for this company must be resolved first";

/// Result of reviewing a budget request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRequestReview {
    pub request: BudgetRequest,
    /// The advance spawned by an approval.
    pub advance: Option<Advance>,
    pub message: String,
}

impl Engine {
    pub(super) async fn require_budget_request<C: ConnectionTrait>(
        &self,
        db: &C,
        request_id: Uuid,
    ) -> ResultEngine<budget_requests::Model> {
        budget_requests::Entity::find_by_id(request_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("budget request not exists".to_string()))
    }

    /// File a budget request for the principal against a company.
    ///
    /// At most one request per (user, company) may be pending at a time.
    pub async fn create_budget_request(
        &self,
        principal: &Principal,
        cmd: NewBudgetRequestCmd,
    ) -> ResultEngine<BudgetRequest> {
        require_positive(cmd.requested_amount, "requested amount")?;
        let justification =
            require_text(&cmd.justification, MIN_JUSTIFICATION_LEN, "justification")?;

        let model = with_tx!(self, |db_tx| {
            let company = self.require_active_company(&db_tx, cmd.company_id).await?;
            self.require_company_access(&db_tx, principal, cmd.company_id)
                .await?;
            let user = self.require_user(&db_tx, principal.id).await?;

            let pending = budget_requests::Entity::find()
                .filter(budget_requests::Column::UserId.eq(user.id.clone()))
                .filter(budget_requests::Column::CompanyId.eq(company.id.clone()))
                .filter(budget_requests::Column::Status.eq(BudgetRequestStatus::Pending.as_str()))
                .one(&db_tx)
                .await?;
            if pending.is_some() {
                return Err(EngineError::Conflict(PENDING_EXISTS.to_string()));
            }

            let model = budget_requests::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                user_id: ActiveValue::Set(user.id),
                company_id: ActiveValue::Set(company.id),
                requested_amount: ActiveValue::Set(cmd.requested_amount.cents()),
                current_balance_at_request: ActiveValue::Set(user.balance),
                justification: ActiveValue::Set(justification.clone()),
                status: ActiveValue::Set(BudgetRequestStatus::Pending.as_str().to_string()),
                rejection_reason: ActiveValue::Set(None),
                transfer_number: ActiveValue::Set(None),
                transfer_date: ActiveValue::Set(None),
                reviewed_by: ActiveValue::Set(None),
                reviewed_at: ActiveValue::Set(None),
                transfer_confirmed_by: ActiveValue::Set(None),
                transfer_confirmed_at: ActiveValue::Set(None),
                settled_by: ActiveValue::Set(None),
                settled_at: ActiveValue::Set(None),
                created_at: ActiveValue::Set(Utc::now()),
            };
            model
                .insert(&db_tx)
                .await
                .map_err(|err| EngineError::on_insert(err, PENDING_EXISTS))
        })?;

        let request = BudgetRequest::try_from(model)?;
        tracing::info!(
            request = %request.id,
            user = %request.user_id,
            company = %request.company_id,
            amount = %request.requested_amount,
            "budget request created"
        );
        let message = format!(
            "{} requested {}: {}",
            principal.username,
            request.requested_amount.display_pln(),
            request.justification
        );
        let notifications = self
            .staff_ids(&[Role::Accountant, Role::Admin])
            .await
            .into_iter()
            .map(|reviewer| {
                Notification::new(
                    reviewer,
                    NotificationKind::BudgetRequestCreated,
                    message.clone(),
                    Some(request.id),
                )
            })
            .collect();
        self.dispatch(notifications).await;
        Ok(request)
    }

    /// Approve or reject a pending budget request.
    ///
    /// Approval spawns a `pending` advance for the requested amount; the
    /// balance is credited later, when that advance is transferred.
    ///
    /// Authorization: accountant or admin.
    pub async fn review_budget_request(
        &self,
        principal: &Principal,
        request_id: Uuid,
        action: ReviewAction,
        rejection_reason: Option<&str>,
    ) -> ResultEngine<BudgetRequestReview> {
        require_reviewer(principal)?;
        let reason = match action {
            ReviewAction::Approve => None,
            ReviewAction::Reject => Some(require_optional_text(
                rejection_reason,
                MIN_REASON_LEN,
                "rejection reason",
            )?),
        };

        let next = match action {
            ReviewAction::Approve => BudgetRequestStatus::Approved,
            ReviewAction::Reject => BudgetRequestStatus::Rejected,
        };

        let (model, advance) = with_tx!(self, |db_tx| {
            // The guarded write must stay the first statement of the transaction.
            let res = budget_requests::Entity::update_many()
                .col_expr(budget_requests::Column::Status, Expr::value(next.as_str()))
                .col_expr(
                    budget_requests::Column::RejectionReason,
                    Expr::value(reason.clone()),
                )
                .col_expr(
                    budget_requests::Column::ReviewedBy,
                    Expr::value(principal.id.to_string()),
                )
                .col_expr(budget_requests::Column::ReviewedAt, Expr::value(Utc::now()))
                .filter(budget_requests::Column::Id.eq(request_id.to_string()))
                .filter(budget_requests::Column::Status.eq(BudgetRequestStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            let model = self.require_budget_request(&db_tx, request_id).await?;
            expect_single_row(res.rows_affected, "budget request")?;

            let advance = match action {
                ReviewAction::Approve => {
                    let cmd = NewAdvanceCmd {
                        user_id: parse_uuid(&model.user_id, "user")?,
                        company_id: parse_uuid(&model.company_id, "company")?,
                        amount: MoneyCents::new(model.requested_amount),
                        description: format!("Budget request: {}", model.justification),
                    };
                    Some(
                        self.insert_advance(
                            &db_tx,
                            &cmd,
                            AdvanceSource::BudgetRequest,
                            Some(request_id),
                            principal.id,
                        )
                        .await?,
                    )
                }
                ReviewAction::Reject => None,
            };
            Ok((model, advance))
        })?;

        let request = BudgetRequest::try_from(model)?;
        let advance = advance.map(Advance::try_from).transpose()?;
        let (message, notification) = match &advance {
            Some(advance) => (
                format!(
                    "Budget request approved, advance {} created",
                    advance.id
                ),
                Notification::new(
                    request.user_id,
                    NotificationKind::BudgetRequestApproved,
                    format!(
                        "Your budget request for {} has been approved",
                        request.requested_amount.display_pln()
                    ),
                    Some(request.id),
                ),
            ),
            None => (
                "Budget request rejected".to_string(),
                Notification::new(
                    request.user_id,
                    NotificationKind::BudgetRequestRejected,
                    format!(
                        "Your budget request for {} has been rejected: {}",
                        request.requested_amount.display_pln(),
                        request.rejection_reason.as_deref().unwrap_or_default()
                    ),
                    Some(request.id),
                ),
            ),
        };
        tracing::info!(
            request = %request.id,
            status = request.status.as_str(),
            reviewer = %principal.id,
            "budget request reviewed"
        );
        self.dispatch(vec![notification]).await;
        Ok(BudgetRequestReview {
            request,
            advance,
            message,
        })
    }

    /// Record the bank transfer for an approved request. The advance created
    /// on approval is transferred (and the balance credited) in the same
    /// transaction.
    ///
    /// Authorization: accountant or admin.
    pub async fn confirm_budget_request_transfer(
        &self,
        principal: &Principal,
        request_id: Uuid,
        info: TransferInfo,
    ) -> ResultEngine<BudgetRequest> {
        require_reviewer(principal)?;
        let stamp = TransferStamp::new(&info, principal.id, true)?;

        let model = with_tx!(self, |db_tx| {
            let res = budget_requests::Entity::update_many()
                .col_expr(
                    budget_requests::Column::Status,
                    Expr::value(BudgetRequestStatus::MoneyTransferred.as_str()),
                )
                .col_expr(
                    budget_requests::Column::TransferNumber,
                    Expr::value(stamp.number.clone()),
                )
                .col_expr(budget_requests::Column::TransferDate, Expr::value(stamp.date))
                .col_expr(
                    budget_requests::Column::TransferConfirmedBy,
                    Expr::value(stamp.confirmed_by.to_string()),
                )
                .col_expr(
                    budget_requests::Column::TransferConfirmedAt,
                    Expr::value(stamp.confirmed_at),
                )
                .filter(budget_requests::Column::Id.eq(request_id.to_string()))
                .filter(budget_requests::Column::Status.eq(BudgetRequestStatus::Approved.as_str()))
                .exec(&db_tx)
                .await?;
            let model = self.require_budget_request(&db_tx, request_id).await?;
            if res.rows_affected != 1 {
                return Err(EngineError::stale("budget request", &model.status, "approved"));
            }

            let linked = self
                .linked_advance(&db_tx, &model.id, AdvanceStatus::Pending)
                .await?;
            if let Some(advance) = linked {
                self.transfer_advance_in_tx(&db_tx, parse_uuid(&advance.id, "advance")?, &stamp)
                    .await?;
            }
            Ok(model)
        })?;

        let request = BudgetRequest::try_from(model)?;
        tracing::info!(request = %request.id, confirmer = %principal.id, "budget request transfer confirmed");
        self.dispatch(vec![Notification::new(
            request.user_id,
            NotificationKind::BudgetRequestTransferConfirmed,
            format!(
                "{} has been transferred to you",
                request.requested_amount.display_pln()
            ),
            Some(request.id),
        )])
        .await;
        Ok(request)
    }

    /// Close a transferred budget request together with every invoice it
    /// funded and its advance.
    ///
    /// Authorization: accountant or admin.
    pub async fn settle_budget_request(
        &self,
        principal: &Principal,
        request_id: Uuid,
    ) -> ResultEngine<SettlementOutcome> {
        require_reviewer(principal)?;

        let (model, settled_invoice_ids) = with_tx!(self, |db_tx| {
            let now = Utc::now();
            let res = budget_requests::Entity::update_many()
                .col_expr(
                    budget_requests::Column::Status,
                    Expr::value(BudgetRequestStatus::Settled.as_str()),
                )
                .col_expr(
                    budget_requests::Column::SettledBy,
                    Expr::value(principal.id.to_string()),
                )
                .col_expr(budget_requests::Column::SettledAt, Expr::value(now))
                .filter(budget_requests::Column::Id.eq(request_id.to_string()))
                .filter(
                    budget_requests::Column::Status
                        .eq(BudgetRequestStatus::MoneyTransferred.as_str()),
                )
                .exec(&db_tx)
                .await?;
            let model = self.require_budget_request(&db_tx, request_id).await?;
            if res.rows_affected != 1 {
                return Err(EngineError::stale(
                    "budget request",
                    &model.status,
                    "money_transferred",
                ));
            }

            let mut ids = self
                .settle_linked_invoices(
                    &db_tx,
                    InvoiceLink::BudgetRequest(model.id.clone()),
                    &[InvoiceStatus::Transferred, InvoiceStatus::Accepted],
                    principal.id,
                    now,
                )
                .await?;
            let linked = self
                .linked_advance(&db_tx, &model.id, AdvanceStatus::Transferred)
                .await?;
            if let Some(advance) = linked {
                let (_, advance_invoices) = self
                    .settle_advance_in_tx(
                        &db_tx,
                        parse_uuid(&advance.id, "advance")?,
                        principal.id,
                        now,
                    )
                    .await?;
                ids.extend(advance_invoices);
            }
            Ok((model, ids))
        })?;

        let request = BudgetRequest::try_from(model)?;
        tracing::info!(
            request = %request.id,
            invoices = settled_invoice_ids.len(),
            "budget request settled"
        );
        self.dispatch(vec![Notification::new(
            request.user_id,
            NotificationKind::BudgetRequestSettled,
            format!(
                "Your budget request for {} has been settled ({} invoice(s) closed)",
                request.requested_amount.display_pln(),
                settled_invoice_ids.len()
            ),
            Some(request.id),
        )])
        .await;
        Ok(SettlementOutcome {
            settled_invoice_ids,
        })
    }

    /// Withdraw one's own pending request. The row is deleted.
    pub async fn cancel_budget_request(
        &self,
        principal: &Principal,
        request_id: Uuid,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let res = budget_requests::Entity::delete_many()
                .filter(budget_requests::Column::Id.eq(request_id.to_string()))
                .filter(budget_requests::Column::UserId.eq(principal.id.to_string()))
                .filter(budget_requests::Column::Status.eq(BudgetRequestStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if res.rows_affected == 1 {
                return Ok(());
            }
            match budget_requests::Entity::find_by_id(request_id.to_string())
                .one(&db_tx)
                .await?
            {
                Some(model) if model.user_id == principal.id.to_string() => Err(
                    EngineError::Conflict(format!(
                        "budget request is {}, only pending requests can be cancelled",
                        model.status
                    )),
                ),
                _ => Err(EngineError::NotFound(
                    "budget request not exists".to_string(),
                )),
            }
        })?;

        tracing::info!(request = %request_id, user = %principal.id, "budget request cancelled");
        Ok(())
    }

    /// Delete every budget request matching all present filters. Returns the
    /// number of rows removed.
    ///
    /// Authorization: admin, with the admin's password re-entered.
    pub async fn bulk_delete_budget_requests(
        &self,
        principal: &Principal,
        filter: BudgetRequestBulkFilter,
        admin_password: &str,
    ) -> ResultEngine<u64> {
        require_admin(principal)?;
        self.verify_principal_password(&self.database, principal, admin_password)
            .await?;
        if filter.is_empty() {
            return Err(EngineError::BadRequest(
                "at least one filter is required".to_string(),
            ));
        }

        let mut query = budget_requests::Entity::delete_many();
        if let Some(statuses) = filter.statuses.as_ref().filter(|s| !s.is_empty()) {
            query = query.filter(
                budget_requests::Column::Status
                    .is_in(statuses.iter().map(|status| status.as_str())),
            );
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(budget_requests::Column::UserId.eq(user_id.to_string()));
        }
        if let Some(from) = filter.created_from {
            query = query.filter(budget_requests::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_to {
            query = query.filter(budget_requests::Column::CreatedAt.lte(to));
        }
        if let Some(days) = filter.older_than_days {
            let cutoff = Duration::try_days(i64::from(days))
                .and_then(|age| Utc::now().checked_sub_signed(age))
                .ok_or_else(|| {
                    EngineError::BadRequest(format!("older_than_days {days} is out of range"))
                })?;
            query = query.filter(budget_requests::Column::CreatedAt.lt(cutoff));
        }

        let deleted = with_tx!(self, |db_tx| Ok(query.exec(&db_tx).await?.rows_affected))?;
        tracing::info!(admin = %principal.id, deleted, "budget requests bulk deleted");
        Ok(deleted)
    }

    /// Users see their own requests; reviewers see everything.
    pub async fn list_budget_requests(
        &self,
        principal: &Principal,
        filter: BudgetRequestListFilter,
    ) -> ResultEngine<Vec<BudgetRequest>> {
        let mut query = budget_requests::Entity::find();
        let user_id = if principal.is_reviewer() {
            filter.user_id
        } else {
            Some(principal.id)
        };
        if let Some(user_id) = user_id {
            query = query.filter(budget_requests::Column::UserId.eq(user_id.to_string()));
        }
        if let Some(company_id) = filter.company_id {
            query = query.filter(budget_requests::Column::CompanyId.eq(company_id.to_string()));
        }
        if let Some(status) = filter.status {
            query = query.filter(budget_requests::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(budget_requests::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(BudgetRequest::try_from)
            .collect()
    }

    pub async fn budget_request(
        &self,
        principal: &Principal,
        request_id: Uuid,
    ) -> ResultEngine<BudgetRequest> {
        let model = self
            .require_budget_request(&self.database, request_id)
            .await?;
        require_visible(principal, &model.user_id, "budget request")?;
        BudgetRequest::try_from(model)
    }

    async fn linked_advance<C: ConnectionTrait>(
        &self,
        db: &C,
        request_id: &str,
        status: AdvanceStatus,
    ) -> ResultEngine<Option<advances::Model>> {
        Ok(advances::Entity::find()
            .filter(advances::Column::SourceType.eq(AdvanceSource::BudgetRequest.as_str()))
            .filter(advances::Column::SourceId.eq(request_id.to_string()))
            .filter(advances::Column::Status.eq(status.as_str()))
            .one(db)
            .await?)
    }
}
