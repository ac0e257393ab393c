//! Invoice deletion requests.
//!
//! Non-admins cannot delete an invoice directly: they file a request that an
//! admin approves (deleting the invoice) or rejects.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError,
    util::{parse_optional_uuid, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl DeletionRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for DeletionRequestStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(EngineError::BadRequest(format!(
                "invalid deletion request status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: Uuid,
    /// Kept after approval even though the invoice row is gone.
    pub invoice_id: Uuid,
    pub requested_by: Uuid,
    pub reason: String,
    pub status: DeletionRequestStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoice_deletion_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub invoice_id: String,
    pub requested_by: String,
    pub reason: String,
    pub status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTimeUtc>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for DeletionRequest {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "deletion request")?,
            invoice_id: parse_uuid(&model.invoice_id, "invoice")?,
            requested_by: parse_uuid(&model.requested_by, "requester")?,
            reason: model.reason,
            status: DeletionRequestStatus::try_from(model.status.as_str())?,
            reviewed_by: parse_optional_uuid(model.reviewed_by.as_deref(), "reviewer")?,
            reviewed_at: model.reviewed_at,
            rejection_reason: model.rejection_reason,
            created_at: model.created_at,
        })
    }
}
