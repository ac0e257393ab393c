use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Principal, ResultEngine, Role, User,
    password::{hash_password, verify_password},
    users,
    util::require_text,
};

use super::{Engine, access::require_reviewer, with_tx};

const INVALID_CREDENTIALS: &str = "invalid username or password";

impl Engine {
    /// Create a user with a freshly hashed password and a zero balance.
    ///
    /// Used by the provisioning tool; there is no self sign-up.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> ResultEngine<User> {
        let username = require_text(username, 1, "username")?;
        let password_hash = hash_password(&self.password_policy, password)?;

        let model = with_tx!(self, |db_tx| {
            let model = users::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                username: ActiveValue::Set(username.clone()),
                password_hash: ActiveValue::Set(password_hash.clone()),
                role: ActiveValue::Set(role.as_str().to_string()),
                balance: ActiveValue::Set(0),
                created_at: ActiveValue::Set(Utc::now()),
            };
            model
                .insert(&db_tx)
                .await
                .map_err(|err| EngineError::on_insert(err, "username already taken"))
        })?;

        let user = User::try_from(model)?;
        tracing::info!(user = %user.id, username = %user.username, role = user.role.as_str(), "user created");
        Ok(user)
    }

    /// Resolve credentials to a [`Principal`].
    pub async fn authenticate(&self, username: &str, password: &str) -> ResultEngine<Principal> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username.trim()))
            .one(&self.database)
            .await?;
        let Some(model) = model else {
            return Err(EngineError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };
        if !verify_password(password, &model.password_hash) {
            return Err(EngineError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        model.principal()
    }

    /// Profile and current balance of the principal.
    pub async fn me(&self, principal: &Principal) -> ResultEngine<User> {
        let model = self.require_user(&self.database, principal.id).await?;
        User::try_from(model)
    }

    /// Authorization: accountant or admin, or the user themself.
    pub async fn user(&self, principal: &Principal, user_id: Uuid) -> ResultEngine<User> {
        if !principal.is_reviewer() && principal.id != user_id {
            return Err(EngineError::Forbidden(
                "cannot read another user's profile".to_string(),
            ));
        }
        let model = self.require_user(&self.database, user_id).await?;
        User::try_from(model)
    }

    /// Authorization: accountant or admin.
    pub async fn list_users(&self, principal: &Principal) -> ResultEngine<Vec<User>> {
        require_reviewer(principal)?;
        users::Entity::find()
            .order_by_asc(users::Column::Username)
            .all(&self.database)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }
}
