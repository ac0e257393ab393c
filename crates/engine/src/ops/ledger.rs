use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, LedgerEntry, LedgerKind, MoneyCents, Principal, ResultEngine,
    saldo_transactions, users,
    util::{MIN_JUSTIFICATION_LEN, expect_single_row, normalize_optional_text, require_positive, require_text},
};

use super::{Engine, access::require_admin, access::require_reviewer, with_tx};

/// One balance mutation, written as a ledger row plus the `users.balance`
/// update in the caller's transaction.
pub(super) struct BalanceChange {
    pub user_id: Uuid,
    pub kind: LedgerKind,
    /// Signed delta applied to the balance.
    pub amount: MoneyCents,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Result of replaying a user's ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReport {
    pub user_id: Uuid,
    pub stored_balance: MoneyCents,
    pub replayed_balance: MoneyCents,
    pub entries: usize,
    pub consistent: bool,
    /// Human-readable description of every broken row.
    pub problems: Vec<String>,
}

impl Engine {
    /// Apply a balance change and append the matching ledger row.
    ///
    /// The balance write is guarded on the value we read, so a concurrent
    /// change to the same balance surfaces as `Conflict` instead of a lost
    /// update. Must be called inside a transaction: the two writes only make
    /// sense together.
    pub(super) async fn post_balance_change<C: ConnectionTrait>(
        &self,
        db_tx: &C,
        change: BalanceChange,
    ) -> ResultEngine<LedgerEntry> {
        change.kind.check_amount(change.amount)?;
        let user = self.require_user(db_tx, change.user_id).await?;
        let before = MoneyCents::new(user.balance);
        let after = before
            .checked_add(change.amount)
            .ok_or_else(|| EngineError::BadRequest("balance overflow".to_string()))?;

        let res = users::Entity::update_many()
            .col_expr(users::Column::Balance, Expr::value(after.cents()))
            .filter(users::Column::Id.eq(user.id.clone()))
            .filter(users::Column::Balance.eq(before.cents()))
            .exec(db_tx)
            .await?;
        expect_single_row(res.rows_affected, "balance")?;

        let last_seq = saldo_transactions::Entity::find()
            .filter(saldo_transactions::Column::UserId.eq(user.id.clone()))
            .order_by_desc(saldo_transactions::Column::Seq)
            .one(db_tx)
            .await?
            .map_or(0, |row| row.seq);

        let row = saldo_transactions::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            user_id: ActiveValue::Set(user.id),
            seq: ActiveValue::Set(last_seq + 1),
            amount: ActiveValue::Set(change.amount.cents()),
            balance_before: ActiveValue::Set(before.cents()),
            balance_after: ActiveValue::Set(after.cents()),
            transaction_type: ActiveValue::Set(change.kind.as_str().to_string()),
            reference_id: ActiveValue::Set(change.reference_id.map(|id| id.to_string())),
            notes: ActiveValue::Set(change.notes),
            created_by: ActiveValue::Set(change.created_by.to_string()),
            created_at: ActiveValue::Set(Utc::now()),
        }
        .insert(db_tx)
        .await?;

        tracing::info!(
            user = %change.user_id,
            kind = change.kind.as_str(),
            amount = %change.amount,
            balance = %after,
            "balance changed"
        );
        LedgerEntry::try_from(row)
    }

    /// Credit a user's balance (`zasilenie`).
    pub async fn top_up(
        &self,
        principal: &Principal,
        user_id: Uuid,
        amount: MoneyCents,
        notes: Option<&str>,
    ) -> ResultEngine<LedgerEntry> {
        require_reviewer(principal)?;
        require_positive(amount, "amount")?;
        let notes = normalize_optional_text(notes);
        with_tx!(self, |db_tx| {
            self.post_balance_change(
                &db_tx,
                BalanceChange {
                    user_id,
                    kind: LedgerKind::TopUp,
                    amount,
                    reference_id: None,
                    notes,
                    created_by: principal.id,
                },
            )
            .await
        })
    }

    /// Manual correction by an admin. `amount` may be negative; a note
    /// explaining the correction is mandatory.
    pub async fn adjust_balance(
        &self,
        principal: &Principal,
        user_id: Uuid,
        amount: MoneyCents,
        notes: &str,
    ) -> ResultEngine<LedgerEntry> {
        require_admin(principal)?;
        let notes = require_text(notes, MIN_JUSTIFICATION_LEN, "adjustment notes")?;
        LedgerKind::Adjustment.check_amount(amount)?;
        with_tx!(self, |db_tx| {
            self.post_balance_change(
                &db_tx,
                BalanceChange {
                    user_id,
                    kind: LedgerKind::Adjustment,
                    amount,
                    reference_id: None,
                    notes: Some(notes),
                    created_by: principal.id,
                },
            )
            .await
        })
    }

    /// Ledger rows of a user in replay order.
    pub async fn ledger_history(
        &self,
        principal: &Principal,
        user_id: Uuid,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        if !principal.is_reviewer() && principal.id != user_id {
            return Err(EngineError::Forbidden(
                "cannot read another user's ledger".to_string(),
            ));
        }
        self.require_user(&self.database, user_id).await?;
        self.ledger_rows(&self.database, user_id)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    /// Replay a user's ledger from zero and compare it with the stored
    /// balance. Never writes.
    pub async fn verify_ledger(
        &self,
        principal: &Principal,
        user_id: Uuid,
    ) -> ResultEngine<LedgerReport> {
        require_reviewer(principal)?;
        let db_tx = self.database.begin().await?;
        let user = self.require_user(&db_tx, user_id).await?;
        let rows = self.ledger_rows(&db_tx, user_id).await?;
        db_tx.commit().await?;

        let stored_balance = MoneyCents::new(user.balance);
        let mut problems = Vec::new();
        let mut running = MoneyCents::ZERO;
        for row in &rows {
            if row.balance_before != running.cents() {
                problems.push(format!(
                    "entry #{} starts at {} but the previous entry ended at {running}",
                    row.seq,
                    MoneyCents::new(row.balance_before)
                ));
            }
            if row.balance_before.checked_add(row.amount) != Some(row.balance_after) {
                problems.push(format!(
                    "entry #{}: {} + {} != {}",
                    row.seq,
                    MoneyCents::new(row.balance_before),
                    MoneyCents::new(row.amount),
                    MoneyCents::new(row.balance_after)
                ));
            }
            running = running
                .checked_add(MoneyCents::new(row.amount))
                .ok_or_else(|| EngineError::Internal("ledger replay overflow".to_string()))?;
        }
        if running != stored_balance {
            problems.push(format!(
                "replayed balance {running} differs from stored balance {stored_balance}"
            ));
        }

        if !problems.is_empty() {
            tracing::warn!(user = %user_id, problems = problems.len(), "ledger inconsistent");
        }
        Ok(LedgerReport {
            user_id,
            stored_balance,
            replayed_balance: running,
            entries: rows.len(),
            consistent: problems.is_empty(),
            problems,
        })
    }

    async fn ledger_rows<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
    ) -> ResultEngine<Vec<saldo_transactions::Model>> {
        Ok(saldo_transactions::Entity::find()
            .filter(saldo_transactions::Column::UserId.eq(user_id.to_string()))
            .order_by_asc(saldo_transactions::Column::CreatedAt)
            .order_by_asc(saldo_transactions::Column::Seq)
            .all(db)
            .await?)
    }
}
