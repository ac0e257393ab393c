use sea_orm::{ConnectionTrait, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Principal, ResultEngine, Role, companies, company_permissions, password,
    users,
};

use super::Engine;

pub(super) fn require_reviewer(principal: &Principal) -> ResultEngine<()> {
    if !principal.is_reviewer() {
        return Err(EngineError::Forbidden(
            "accountant or admin role required".to_string(),
        ));
    }
    Ok(())
}

pub(super) fn require_admin(principal: &Principal) -> ResultEngine<()> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden("admin role required".to_string()));
    }
    Ok(())
}

/// Owners and reviewers may read an entity; everyone else gets `NotFound` so
/// ids of other users' entities are not disclosed.
pub(super) fn require_visible(
    principal: &Principal,
    owner_id: &str,
    what: &str,
) -> ResultEngine<()> {
    if principal.is_reviewer() || owner_id == principal.id.to_string() {
        return Ok(());
    }
    Err(EngineError::NotFound(format!("{what} not exists")))
}

impl Engine {
    pub(super) async fn require_user<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
    ) -> ResultEngine<users::Model> {
        users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("user not exists".to_string()))
    }

    pub(super) async fn require_company<C: ConnectionTrait>(
        &self,
        db: &C,
        company_id: Uuid,
    ) -> ResultEngine<companies::Model> {
        companies::Entity::find_by_id(company_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("company not exists".to_string()))
    }

    pub(super) async fn require_active_company<C: ConnectionTrait>(
        &self,
        db: &C,
        company_id: Uuid,
    ) -> ResultEngine<companies::Model> {
        let company = self.require_company(db, company_id).await?;
        if !company.active {
            return Err(EngineError::BadRequest(format!(
                "company '{}' is inactive",
                company.name
            )));
        }
        Ok(company)
    }

    /// `user`-role principals must hold a permission row for the company;
    /// accountants and admins implicitly see every company.
    pub(super) async fn require_company_access<C: ConnectionTrait>(
        &self,
        db: &C,
        principal: &Principal,
        company_id: Uuid,
    ) -> ResultEngine<()> {
        if principal.is_reviewer() {
            return Ok(());
        }
        let allowed = company_permissions::Entity::find_by_id((
            principal.id.to_string(),
            company_id.to_string(),
        ))
        .one(db)
        .await?
        .is_some();
        if !allowed {
            return Err(EngineError::Forbidden(
                "no permission for this company".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) async fn permitted_company_ids<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: Uuid,
    ) -> ResultEngine<Vec<String>> {
        Ok(company_permissions::Entity::find()
            .filter(company_permissions::Column::UserId.eq(user_id.to_string()))
            .all(db)
            .await?
            .into_iter()
            .map(|row| row.company_id)
            .collect())
    }

    /// Re-verify the principal's own password before a destructive action.
    pub(super) async fn verify_principal_password<C: ConnectionTrait>(
        &self,
        db: &C,
        principal: &Principal,
        password: &str,
    ) -> ResultEngine<()> {
        let user = self.require_user(db, principal.id).await?;
        if !password::verify_password(password, &user.password_hash) {
            return Err(EngineError::Unauthorized(
                "password confirmation failed".to_string(),
            ));
        }
        Ok(())
    }

    /// Ids of every user holding one of `roles`, the audience of review
    /// queues.
    pub(super) async fn staff_ids(&self, roles: &[Role]) -> Vec<Uuid> {
        let rows = users::Entity::find()
            .filter(users::Column::Role.is_in(roles.iter().map(|role| role.as_str())))
            .all(&self.database)
            .await;
        match rows {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| Uuid::parse_str(&row.id).ok())
                .collect(),
            Err(err) => {
                tracing::warn!("failed to load staff for notification: {err}");
                Vec::new()
            }
        }
    }
}
