//! Invoices: expense documents submitted by users.
//!
//! ```text
//! pending ─▶ in_review ─▶ accepted ─▶ transferred ─▶ settled
//!    │            │           │  └──────(cascade)────────▲
//!    └────────────┴──▶ rejected ◀──┘
//! ```
//!
//! Accepting deducts the invoice amount from the owner's balance; rejecting an
//! already accepted invoice refunds it. Settled invoices are immutable except
//! for the settlement cascade that put them there.

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
pub enum InvoiceStatus {
    Pending,
    InReview,
    Accepted,
    Rejected,
    Transferred,
    Settled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Transferred => "transferred",
            Self::Settled => "settled",
        }
    }

    /// Statuses whose balance deduction can still be refunded.
    pub fn is_refundable(self) -> bool {
        matches!(self, Self::Accepted | Self::Transferred)
    }
}

impl TryFrom<&str> for InvoiceStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_review" => Ok(Self::InReview),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "transferred" => Ok(Self::Transferred),
            "settled" => Ok(Self::Settled),
            other => Err(EngineError::BadRequest(format!(
                "invalid invoice status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Einvoice,
    Paragon,
    Correction,
}

impl InvoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Einvoice => "einvoice",
            Self::Paragon => "paragon",
            Self::Correction => "correction",
        }
    }
}

impl TryFrom<&str> for InvoiceType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "einvoice" => Ok(Self::Einvoice),
            "paragon" => Ok(Self::Paragon),
            "correction" => Ok(Self::Correction),
            other => Err(EngineError::BadRequest(format!(
                "invalid invoice type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub invoice_number: String,
    pub ksef_number: Option<String>,
    pub image_key: String,
    pub amount: MoneyCents,
    pub status: InvoiceStatus,
    pub invoice_type: InvoiceType,
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

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub company_id: String,
    pub invoice_number: String,
    pub ksef_number: Option<String>,
    pub image_key: String,
    pub amount: i64,
    pub status: String,
    pub invoice_type: String,
    pub original_invoice_id: Option<String>,
    pub advance_id: Option<String>,
    pub budget_request_id: Option<String>,
    pub description: Option<String>,
    pub justification: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTimeUtc>,
    pub transferred_at: Option<DateTimeUtc>,
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
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Invoice {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "invoice")?,
            user_id: parse_uuid(&model.user_id, "user")?,
            company_id: parse_uuid(&model.company_id, "company")?,
            invoice_number: model.invoice_number,
            ksef_number: model.ksef_number,
            image_key: model.image_key,
            amount: MoneyCents::new(model.amount),
            status: InvoiceStatus::try_from(model.status.as_str())?,
            invoice_type: InvoiceType::try_from(model.invoice_type.as_str())?,
            original_invoice_id: parse_optional_uuid(
                model.original_invoice_id.as_deref(),
                "original invoice",
            )?,
            advance_id: parse_optional_uuid(model.advance_id.as_deref(), "advance")?,
            budget_request_id: parse_optional_uuid(
                model.budget_request_id.as_deref(),
                "budget request",
            )?,
            description: model.description,
            justification: model.justification,
            rejection_reason: model.rejection_reason,
            reviewed_by: parse_optional_uuid(model.reviewed_by.as_deref(), "reviewer")?,
            reviewed_at: model.reviewed_at,
            transferred_at: model.transferred_at,
            settled_by: parse_optional_uuid(model.settled_by.as_deref(), "settler")?,
            settled_at: model.settled_at,
            created_at: model.created_at,
        })
    }
}
