//! Balance ledger ("saldo") rows.
//!
//! Append-only: one row per balance mutation, carrying the signed delta and
//! the before/after snapshots. Replaying a user's rows by `seq` from zero
//! reproduces `users.balance`.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, ResultEngine,
    util::{parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKind {
    /// Balance top-up booked by an accountant.
    #[serde(rename = "zasilenie")]
    TopUp,
    #[serde(rename = "advance_credit")]
    AdvanceCredit,
    #[serde(rename = "adjustment")]
    Adjustment,
    #[serde(rename = "invoice_deduction")]
    InvoiceDeduction,
    #[serde(rename = "invoice_refund")]
    InvoiceRefund,
    #[serde(rename = "invoice_delete_refund")]
    InvoiceDeleteRefund,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopUp => "zasilenie",
            Self::AdvanceCredit => "advance_credit",
            Self::Adjustment => "adjustment",
            Self::InvoiceDeduction => "invoice_deduction",
            Self::InvoiceRefund => "invoice_refund",
            Self::InvoiceDeleteRefund => "invoice_delete_refund",
        }
    }

    /// Check that `amount` carries the sign this kind of movement requires.
    ///
    /// Credits are positive, deductions negative, adjustments any non-zero
    /// value.
    pub fn check_amount(self, amount: MoneyCents) -> ResultEngine<()> {
        let ok = match self {
            Self::TopUp | Self::AdvanceCredit | Self::InvoiceRefund | Self::InvoiceDeleteRefund => {
                amount.is_positive()
            }
            Self::InvoiceDeduction => amount.is_negative(),
            Self::Adjustment => !amount.is_zero(),
        };
        if !ok {
            return Err(EngineError::BadRequest(format!(
                "invalid amount {amount} for {} ledger entry",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl TryFrom<&str> for LedgerKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "zasilenie" => Ok(Self::TopUp),
            "advance_credit" => Ok(Self::AdvanceCredit),
            "adjustment" => Ok(Self::Adjustment),
            "invoice_deduction" => Ok(Self::InvoiceDeduction),
            "invoice_refund" => Ok(Self::InvoiceRefund),
            "invoice_delete_refund" => Ok(Self::InvoiceDeleteRefund),
            other => Err(EngineError::BadRequest(format!(
                "invalid ledger transaction type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub seq: i64,
    pub amount: MoneyCents,
    pub balance_before: MoneyCents,
    pub balance_after: MoneyCents,
    pub transaction_type: LedgerKind,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "saldo_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub seq: i64,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub transaction_type: String,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "ledger entry")?,
            user_id: parse_uuid(&model.user_id, "user")?,
            seq: model.seq,
            amount: MoneyCents::new(model.amount),
            balance_before: MoneyCents::new(model.balance_before),
            balance_after: MoneyCents::new(model.balance_after),
            transaction_type: LedgerKind::try_from(model.transaction_type.as_str())?,
            reference_id: parse_optional_uuid(model.reference_id.as_deref(), "reference")?,
            notes: model.notes,
            created_by: parse_uuid(&model.created_by, "creator")?,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_uses_legacy_storage_names() {
        assert_eq!(LedgerKind::TopUp.as_str(), "zasilenie");
        assert_eq!(
            LedgerKind::try_from("invoice_delete_refund").unwrap(),
            LedgerKind::InvoiceDeleteRefund
        );
        assert_eq!(
            serde_json::to_string(&LedgerKind::TopUp).unwrap(),
            "\"zasilenie\""
        );
    }

    #[test]
    fn amount_sign_follows_kind() {
        assert!(LedgerKind::AdvanceCredit.check_amount(MoneyCents::new(1)).is_ok());
        assert!(LedgerKind::AdvanceCredit.check_amount(MoneyCents::new(-1)).is_err());
        assert!(LedgerKind::InvoiceDeduction.check_amount(MoneyCents::new(-1)).is_ok());
        assert!(LedgerKind::InvoiceDeduction.check_amount(MoneyCents::new(1)).is_err());
        assert!(LedgerKind::Adjustment.check_amount(MoneyCents::new(-5)).is_ok());
        assert!(LedgerKind::Adjustment.check_amount(MoneyCents::ZERO).is_err());
    }
}
