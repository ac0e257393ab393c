//! Budget requests: a user's ask for additional spendable allowance.
//!
//! Lifecycle:
//!
//! ```text
//! pending ──approve──▶ approved ──confirm transfer──▶ money_transferred ──settle──▶ settled
//!    │
//!    └──reject──▶ rejected
//! ```
//!
//! `rejected` and `settled` are terminal. A `pending` request may also be
//! cancelled (hard-deleted) by its owner.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents,
    util::{parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetRequestStatus {
    Pending,
    Approved,
    Rejected,
    MoneyTransferred,
    Settled,
}

impl BudgetRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::MoneyTransferred => "money_transferred",
            Self::Settled => "settled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Settled)
    }
}

impl TryFrom<&str> for BudgetRequestStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "money_transferred" => Ok(Self::MoneyTransferred),
            "settled" => Ok(Self::Settled),
            other => Err(EngineError::BadRequest(format!(
                "invalid budget request status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub requested_amount: MoneyCents,
    pub current_balance_at_request: MoneyCents,
    pub justification: String,
    pub status: BudgetRequestStatus,
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

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budget_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub company_id: String,
    pub requested_amount: i64,
    pub current_balance_at_request: i64,
    pub justification: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub transfer_number: Option<String>,
    pub transfer_date: Option<DateTimeUtc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTimeUtc>,
    pub transfer_confirmed_by: Option<String>,
    pub transfer_confirmed_at: Option<DateTimeUtc>,
    pub settled_by: Option<String>,
    pub settled_at: Option<DateTimeUtc>,
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
    #[sea_orm(
        belongs_to = "super::companies::Entity",
        from = "Column::CompanyId",
        to = "super::companies::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Companies,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::companies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Companies.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for BudgetRequest {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "budget request")?,
            user_id: parse_uuid(&model.user_id, "user")?,
            company_id: parse_uuid(&model.company_id, "company")?,
            requested_amount: MoneyCents::new(model.requested_amount),
            current_balance_at_request: MoneyCents::new(model.current_balance_at_request),
            justification: model.justification,
            status: BudgetRequestStatus::try_from(model.status.as_str())?,
            rejection_reason: model.rejection_reason,
            transfer_number: model.transfer_number,
            transfer_date: model.transfer_date,
            reviewed_by: parse_optional_uuid(model.reviewed_by.as_deref(), "reviewer")?,
            reviewed_at: model.reviewed_at,
            transfer_confirmed_by: parse_optional_uuid(
                model.transfer_confirmed_by.as_deref(),
                "transfer confirmer",
            )?,
            transfer_confirmed_at: model.transfer_confirmed_at,
            settled_by: parse_optional_uuid(model.settled_by.as_deref(), "settler")?,
            settled_at: model.settled_at,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in [
            BudgetRequestStatus::Pending,
            BudgetRequestStatus::Approved,
            BudgetRequestStatus::Rejected,
            BudgetRequestStatus::MoneyTransferred,
            BudgetRequestStatus::Settled,
        ] {
            assert_eq!(
                BudgetRequestStatus::try_from(status.as_str()).unwrap(),
                status
            );
        }
    }

    #[test]
    fn only_rejected_and_settled_are_terminal() {
        assert!(BudgetRequestStatus::Rejected.is_terminal());
        assert!(BudgetRequestStatus::Settled.is_terminal());
        assert!(!BudgetRequestStatus::Approved.is_terminal());
        assert!(!BudgetRequestStatus::MoneyTransferred.is_terminal());
    }
}
