use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Advance, AdvanceListFilter, AdvanceSource, AdvanceStatus, EngineError, InvoiceStatus,
    LedgerKind, MoneyCents, NewAdvanceCmd, Notification, NotificationKind, Principal,
    ResultEngine, TransferInfo, advances,
    util::{
        MIN_JUSTIFICATION_LEN, MIN_TRANSFER_NUMBER_LEN, expect_single_row,
        normalize_optional_text, parse_uuid, require_positive, require_text,
    },
};

use super::{
    Engine, SettlementOutcome,
    access::{require_reviewer, require_visible},
    invoices::InvoiceLink,
    ledger::BalanceChange,
    with_tx,
};

/// Validated transfer metadata, stamped on both advances and budget requests.
pub(super) struct TransferStamp {
    pub number: Option<String>,
    pub date: DateTime<Utc>,
    pub confirmed_by: Uuid,
    pub confirmed_at: DateTime<Utc>,
}

impl TransferStamp {
    pub(super) fn new(
        info: &TransferInfo,
        confirmed_by: Uuid,
        number_required: bool,
    ) -> ResultEngine<Self> {
        let number = match normalize_optional_text(info.transfer_number.as_deref()) {
            Some(number) => Some(require_text(
                &number,
                MIN_TRANSFER_NUMBER_LEN,
                "transfer number",
            )?),
            None if number_required => {
                return Err(EngineError::BadRequest(format!(
                    "transfer number must be at least {MIN_TRANSFER_NUMBER_LEN} characters"
                )));
            }
            None => None,
        };
        let now = Utc::now();
        Ok(Self {
            number,
            date: info.transfer_date.unwrap_or(now),
            confirmed_by,
            confirmed_at: now,
        })
    }
}

impl Engine {
    pub(super) async fn require_advance<C: ConnectionTrait>(
        &self,
        db: &C,
        advance_id: Uuid,
    ) -> ResultEngine<advances::Model> {
        advances::Entity::find_by_id(advance_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("advance not exists".to_string()))
    }

    /// Insert a `pending` advance. The caller has validated every input.
    pub(super) async fn insert_advance<C: ConnectionTrait>(
        &self,
        db_tx: &C,
        cmd: &NewAdvanceCmd,
        source: AdvanceSource,
        source_id: Option<Uuid>,
        created_by: Uuid,
    ) -> ResultEngine<advances::Model> {
        let model = advances::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            user_id: ActiveValue::Set(cmd.user_id.to_string()),
            company_id: ActiveValue::Set(cmd.company_id.to_string()),
            amount: ActiveValue::Set(cmd.amount.cents()),
            description: ActiveValue::Set(cmd.description.clone()),
            status: ActiveValue::Set(AdvanceStatus::Pending.as_str().to_string()),
            source_type: ActiveValue::Set(source.as_str().to_string()),
            source_id: ActiveValue::Set(source_id.map(|id| id.to_string())),
            transfer_number: ActiveValue::Set(None),
            transfer_date: ActiveValue::Set(None),
            transfer_confirmed_by: ActiveValue::Set(None),
            transfer_confirmed_at: ActiveValue::Set(None),
            settled_by: ActiveValue::Set(None),
            settled_at: ActiveValue::Set(None),
            created_by: ActiveValue::Set(created_by.to_string()),
            created_at: ActiveValue::Set(Utc::now()),
        };
        Ok(model.insert(db_tx).await?)
    }

    /// Create an advance by hand for any user.
    ///
    /// Authorization: accountant or admin.
    pub async fn create_manual_advance(
        &self,
        principal: &Principal,
        cmd: NewAdvanceCmd,
    ) -> ResultEngine<Advance> {
        require_reviewer(principal)?;
        require_positive(cmd.amount, "amount")?;
        let description = require_text(&cmd.description, MIN_JUSTIFICATION_LEN, "description")?;
        let cmd = NewAdvanceCmd {
            description,
            ..cmd
        };

        let model = with_tx!(self, |db_tx| {
            self.require_user(&db_tx, cmd.user_id).await?;
            self.require_active_company(&db_tx, cmd.company_id).await?;
            self.insert_advance(&db_tx, &cmd, AdvanceSource::Manual, None, principal.id)
                .await
        })?;

        let advance = Advance::try_from(model)?;
        tracing::info!(advance = %advance.id, user = %advance.user_id, amount = %advance.amount, "manual advance created");
        Ok(advance)
    }

    /// Pay out a pending advance: credit the owner's balance and mark the
    /// advance `transferred`.
    ///
    /// Authorization: accountant or admin.
    pub async fn transfer_advance(
        &self,
        principal: &Principal,
        advance_id: Uuid,
        info: TransferInfo,
    ) -> ResultEngine<Advance> {
        require_reviewer(principal)?;
        let stamp = TransferStamp::new(&info, principal.id, false)?;

        let model = with_tx!(self, |db_tx| {
            self.transfer_advance_in_tx(&db_tx, advance_id, &stamp).await
        })?;

        let advance = Advance::try_from(model)?;
        tracing::info!(advance = %advance.id, user = %advance.user_id, amount = %advance.amount, "advance transferred");
        self.dispatch(vec![Notification::new(
            advance.user_id,
            NotificationKind::AdvanceTransferred,
            format!(
                "Advance of {} has been transferred to you",
                advance.amount.display_pln()
            ),
            Some(advance.id),
        )])
        .await;
        Ok(advance)
    }

    /// Move the advance `pending → transferred`, then credit the balance and
    /// append the `advance_credit` ledger row. All writes share `db_tx`.
    pub(super) async fn transfer_advance_in_tx<C: ConnectionTrait>(
        &self,
        db_tx: &C,
        advance_id: Uuid,
        stamp: &TransferStamp,
    ) -> ResultEngine<advances::Model> {
        let res = advances::Entity::update_many()
            .col_expr(
                advances::Column::Status,
                Expr::value(AdvanceStatus::Transferred.as_str()),
            )
            .col_expr(
                advances::Column::TransferNumber,
                Expr::value(stamp.number.clone()),
            )
            .col_expr(advances::Column::TransferDate, Expr::value(stamp.date))
            .col_expr(
                advances::Column::TransferConfirmedBy,
                Expr::value(stamp.confirmed_by.to_string()),
            )
            .col_expr(
                advances::Column::TransferConfirmedAt,
                Expr::value(stamp.confirmed_at),
            )
            .filter(advances::Column::Id.eq(advance_id.to_string()))
            .filter(advances::Column::Status.eq(AdvanceStatus::Pending.as_str()))
            .exec(db_tx)
            .await?;
        let model = self.require_advance(db_tx, advance_id).await?;
        expect_single_row(res.rows_affected, "advance")?;

        self.post_balance_change(
            db_tx,
            BalanceChange {
                user_id: parse_uuid(&model.user_id, "user")?,
                kind: LedgerKind::AdvanceCredit,
                amount: MoneyCents::new(model.amount),
                reference_id: Some(advance_id),
                notes: Some(format!("advance transfer: {}", model.description)),
                created_by: stamp.confirmed_by,
            },
        )
        .await?;
        Ok(model)
    }

    /// Close a transferred advance and every accepted invoice it funded.
    ///
    /// Authorization: accountant or admin.
    pub async fn settle_advance(
        &self,
        principal: &Principal,
        advance_id: Uuid,
    ) -> ResultEngine<SettlementOutcome> {
        require_reviewer(principal)?;

        let (model, settled_invoice_ids) = with_tx!(self, |db_tx| {
            self.settle_advance_in_tx(&db_tx, advance_id, principal.id, Utc::now())
                .await
        })?;

        let advance = Advance::try_from(model)?;
        tracing::info!(
            advance = %advance.id,
            invoices = settled_invoice_ids.len(),
            "advance settled"
        );
        self.dispatch(vec![Notification::new(
            advance.user_id,
            NotificationKind::AdvanceSettled,
            format!(
                "Advance of {} has been settled ({} invoice(s) closed)",
                advance.amount.display_pln(),
                settled_invoice_ids.len()
            ),
            Some(advance.id),
        )])
        .await;
        Ok(SettlementOutcome {
            settled_invoice_ids,
        })
    }

    /// Guarded `transferred → settled`, then the invoice cascade. Returns the
    /// settled advance and the ids of the invoices closed.
    pub(super) async fn settle_advance_in_tx<C: ConnectionTrait>(
        &self,
        db_tx: &C,
        advance_id: Uuid,
        settled_by: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<(advances::Model, Vec<Uuid>)> {
        let res = advances::Entity::update_many()
            .col_expr(
                advances::Column::Status,
                Expr::value(AdvanceStatus::Settled.as_str()),
            )
            .col_expr(
                advances::Column::SettledBy,
                Expr::value(settled_by.to_string()),
            )
            .col_expr(advances::Column::SettledAt, Expr::value(now))
            .filter(advances::Column::Id.eq(advance_id.to_string()))
            .filter(advances::Column::Status.eq(AdvanceStatus::Transferred.as_str()))
            .exec(db_tx)
            .await?;
        let model = self.require_advance(db_tx, advance_id).await?;
        if res.rows_affected != 1 {
            return Err(EngineError::stale("advance", &model.status, "transferred"));
        }

        let ids = self
            .settle_linked_invoices(
                db_tx,
                InvoiceLink::Advance(model.id.clone()),
                &[InvoiceStatus::Accepted],
                settled_by,
                now,
            )
            .await?;
        Ok((model, ids))
    }

    /// Users see their own advances; reviewers see everything.
    pub async fn list_advances(
        &self,
        principal: &Principal,
        filter: AdvanceListFilter,
    ) -> ResultEngine<Vec<Advance>> {
        let mut query = advances::Entity::find();
        let user_id = if principal.is_reviewer() {
            filter.user_id
        } else {
            Some(principal.id)
        };
        if let Some(user_id) = user_id {
            query = query.filter(advances::Column::UserId.eq(user_id.to_string()));
        }
        if let Some(company_id) = filter.company_id {
            query = query.filter(advances::Column::CompanyId.eq(company_id.to_string()));
        }
        if let Some(status) = filter.status {
            query = query.filter(advances::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(advances::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Advance::try_from)
            .collect()
    }

    pub async fn advance(&self, principal: &Principal, advance_id: Uuid) -> ResultEngine<Advance> {
        let model = self.require_advance(&self.database, advance_id).await?;
        require_visible(principal, &model.user_id, "advance")?;
        Advance::try_from(model)
    }
}
