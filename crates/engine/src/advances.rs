//! Advances: money actually disbursed to a user.
//!
//! An advance is either created by hand by an accountant or spawned when a
//! budget request is approved. Its state machine is linear:
//! `pending → transferred → settled`. The user's balance is credited on
//! `transfer`, never before.

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
pub enum AdvanceStatus {
    Pending,
    Transferred,
    Settled,
}

impl AdvanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transferred => "transferred",
            Self::Settled => "settled",
        }
    }
}

impl TryFrom<&str> for AdvanceStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "transferred" => Ok(Self::Transferred),
            "settled" => Ok(Self::Settled),
            other => Err(EngineError::BadRequest(format!(
                "invalid advance status: {other}"
            ))),
        }
    }
}

/// Where an advance came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceSource {
    Manual,
    BudgetRequest,
}

impl AdvanceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::BudgetRequest => "budget_request",
        }
    }
}

impl TryFrom<&str> for AdvanceSource {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "manual" => Ok(Self::Manual),
            "budget_request" => Ok(Self::BudgetRequest),
            other => Err(EngineError::BadRequest(format!(
                "invalid advance source: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub amount: MoneyCents,
    pub description: String,
    pub status: AdvanceStatus,
    pub source_type: AdvanceSource,
    /// Back-reference to the budget request when `source_type` is
    /// `budget_request`.
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

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "advances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub company_id: String,
    pub amount: i64,
    pub description: String,
    pub status: String,
    pub source_type: String,
    pub source_id: Option<String>,
    pub transfer_number: Option<String>,
    pub transfer_date: Option<DateTimeUtc>,
    pub transfer_confirmed_by: Option<String>,
    pub transfer_confirmed_at: Option<DateTimeUtc>,
    pub settled_by: Option<String>,
    pub settled_at: Option<DateTimeUtc>,
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

impl TryFrom<Model> for Advance {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "advance")?,
            user_id: parse_uuid(&model.user_id, "user")?,
            company_id: parse_uuid(&model.company_id, "company")?,
            amount: MoneyCents::new(model.amount),
            description: model.description,
            status: AdvanceStatus::try_from(model.status.as_str())?,
            source_type: AdvanceSource::try_from(model.source_type.as_str())?,
            source_id: parse_optional_uuid(model.source_id.as_deref(), "advance source")?,
            transfer_number: model.transfer_number,
            transfer_date: model.transfer_date,
            transfer_confirmed_by: parse_optional_uuid(
                model.transfer_confirmed_by.as_deref(),
                "transfer confirmer",
            )?,
            transfer_confirmed_at: model.transfer_confirmed_at,
            settled_by: parse_optional_uuid(model.settled_by.as_deref(), "settler")?,
            settled_at: model.settled_at,
            created_by: parse_uuid(&model.created_by, "creator")?,
            created_at: model.created_at,
        })
    }
}
