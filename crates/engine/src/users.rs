//! Users, roles and the authenticated principal.
//!
//! The `users` row carries the running `balance`. The balance is never written
//! directly: every change goes through the ledger (see `ops::ledger`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, util::parse_uuid};

/// Role of a user in the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Accountant,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Accountant => "accountant",
            Self::Admin => "admin",
        }
    }

    /// Accountants and admins review requests and see every company.
    pub fn is_reviewer(self) -> bool {
        matches!(self, Self::Accountant | Self::Admin)
    }
}

impl TryFrom<&str> for Role {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "accountant" => Ok(Self::Accountant),
            "admin" => Ok(Self::Admin),
            other => Err(EngineError::BadRequest(format!("invalid role: {other}"))),
        }
    }
}

/// The authenticated caller of an engine operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
        }
    }

    pub fn is_reviewer(&self) -> bool {
        self.role.is_reviewer()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Public view of a user (never exposes the password hash).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub balance: MoneyCents,
    pub created_at: DateTimeUtc,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub balance: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub(crate) fn principal(&self) -> ResultEngine<Principal> {
        Ok(Principal {
            id: parse_uuid(&self.id, "user")?,
            username: self.username.clone(),
            role: Role::try_from(self.role.as_str())?,
        })
    }
}

impl TryFrom<Model> for User {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "user")?,
            role: Role::try_from(model.role.as_str())?,
            username: model.username,
            balance: MoneyCents::new(model.balance),
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_string() {
        for role in [Role::User, Role::Accountant, Role::Admin] {
            assert_eq!(Role::try_from(role.as_str()).unwrap(), role);
        }
        assert!(Role::try_from("root").is_err());
    }

    #[test]
    fn only_accountants_and_admins_review() {
        assert!(!Role::User.is_reviewer());
        assert!(Role::Accountant.is_reviewer());
        assert!(Role::Admin.is_reviewer());
    }
}
