use chrono::Utc;
use sea_orm::{
    ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Company, EngineError, Principal, ResultEngine, companies, company_permissions,
    util::{normalize_optional_text, require_text},
};

use super::{Engine, access::require_admin, with_tx};

impl Engine {
    /// Register a company. Names are unique ignoring case.
    ///
    /// Authorization: admin.
    pub async fn create_company(
        &self,
        principal: &Principal,
        name: &str,
        tax_id: Option<&str>,
    ) -> ResultEngine<Company> {
        require_admin(principal)?;
        let name = require_text(name, 1, "company name")?;
        let tax_id = normalize_optional_text(tax_id);

        let model = with_tx!(self, |db_tx| {
            let exists = companies::Entity::find()
                .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::Conflict(format!(
                    "company '{name}' already exists"
                )));
            }
            let model = companies::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                name: ActiveValue::Set(name.clone()),
                tax_id: ActiveValue::Set(tax_id.clone()),
                active: ActiveValue::Set(true),
                created_at: ActiveValue::Set(Utc::now()),
            };
            Ok(model.insert(&db_tx).await?)
        })?;

        let company = Company::try_from(model)?;
        tracing::info!(company = %company.id, name = %company.name, "company created");
        Ok(company)
    }

    /// Activate or deactivate a company. Inactive companies keep their
    /// history but accept no new requests, advances or invoices.
    ///
    /// Authorization: admin.
    pub async fn set_company_active(
        &self,
        principal: &Principal,
        company_id: Uuid,
        active: bool,
    ) -> ResultEngine<Company> {
        require_admin(principal)?;
        let model = with_tx!(self, |db_tx| {
            let model = self.require_company(&db_tx, company_id).await?;
            let mut active_model: companies::ActiveModel = model.into();
            active_model.active = ActiveValue::Set(active);
            Ok(active_model.update(&db_tx).await?)
        })?;

        tracing::info!(company = %company_id, active, "company activity changed");
        Company::try_from(model)
    }

    /// Companies visible to the principal: all of them for reviewers, the
    /// permitted ones for users.
    pub async fn list_companies(&self, principal: &Principal) -> ResultEngine<Vec<Company>> {
        let mut query = companies::Entity::find();
        if !principal.is_reviewer() {
            let permitted = self
                .permitted_company_ids(&self.database, principal.id)
                .await?;
            query = query.filter(companies::Column::Id.is_in(permitted));
        }
        query
            .order_by_asc(companies::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Company::try_from)
            .collect()
    }

    /// Replace the set of companies a user may transact against.
    ///
    /// Authorization: admin.
    pub async fn set_user_companies(
        &self,
        principal: &Principal,
        user_id: Uuid,
        company_ids: Vec<Uuid>,
    ) -> ResultEngine<Vec<Company>> {
        require_admin(principal)?;
        let mut company_ids = company_ids;
        company_ids.sort_unstable();
        company_ids.dedup();

        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            for company_id in &company_ids {
                self.require_company(&db_tx, *company_id).await?;
            }
            company_permissions::Entity::delete_many()
                .filter(company_permissions::Column::UserId.eq(user_id.to_string()))
                .exec(&db_tx)
                .await?;
            if !company_ids.is_empty() {
                let rows = company_ids
                    .iter()
                    .map(|company_id| company_permissions::ActiveModel {
                        user_id: ActiveValue::Set(user_id.to_string()),
                        company_id: ActiveValue::Set(company_id.to_string()),
                    });
                company_permissions::Entity::insert_many(rows)
                    .exec(&db_tx)
                    .await?;
            }
            Ok(())
        })?;

        tracing::info!(user = %user_id, companies = company_ids.len(), "company permissions replaced");
        self.companies_of(user_id).await
    }

    /// Companies a user holds permission rows for.
    ///
    /// Authorization: admin, or the user themself.
    pub async fn user_companies(
        &self,
        principal: &Principal,
        user_id: Uuid,
    ) -> ResultEngine<Vec<Company>> {
        if !principal.is_admin() && principal.id != user_id {
            return Err(EngineError::Forbidden(
                "cannot read another user's permissions".to_string(),
            ));
        }
        self.require_user(&self.database, user_id).await?;
        self.companies_of(user_id).await
    }

    async fn companies_of(&self, user_id: Uuid) -> ResultEngine<Vec<Company>> {
        let permitted = self.permitted_company_ids(&self.database, user_id).await?;
        companies::Entity::find()
            .filter(companies::Column::Id.is_in(permitted))
            .order_by_asc(companies::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Company::try_from)
            .collect()
    }
}
