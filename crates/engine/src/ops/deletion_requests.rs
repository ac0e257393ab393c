use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    DeletionRequest, DeletionRequestListFilter, DeletionRequestStatus, EngineError,
    InvoiceStatus, Notification, NotificationKind, Principal, ResultEngine, ReviewAction, Role,
    deletion_requests, invoices,
    util::{MIN_REASON_LEN, expect_single_row, require_optional_text, require_text},
};

use super::{
    Engine,
    access::{require_admin, require_visible},
    with_tx,
};

const PENDING_EXISTS: &str = "a deletion request for this invoice is already pending";

impl Engine {
    /// Ask an admin to delete an invoice.
    ///
    /// Authorization: the invoice owner, or an accountant/admin.
    pub async fn create_deletion_request(
        &self,
        principal: &Principal,
        invoice_id: Uuid,
        reason: &str,
    ) -> ResultEngine<DeletionRequest> {
        let reason = require_text(reason, MIN_REASON_LEN, "deletion reason")?;

        let (model, invoice_number) = with_tx!(self, |db_tx| {
            let invoice = self.require_invoice(&db_tx, invoice_id).await?;
            require_visible(principal, &invoice.user_id, "invoice")?;
            if invoice.status == InvoiceStatus::Settled.as_str() {
                return Err(EngineError::Conflict(
                    "settled invoices cannot be deleted".to_string(),
                ));
            }
            let pending = deletion_requests::Entity::find()
                .filter(deletion_requests::Column::InvoiceId.eq(invoice.id.clone()))
                .filter(
                    deletion_requests::Column::Status.eq(DeletionRequestStatus::Pending.as_str()),
                )
                .one(&db_tx)
                .await?;
            if pending.is_some() {
                return Err(EngineError::Conflict(PENDING_EXISTS.to_string()));
            }

            let model = deletion_requests::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                invoice_id: ActiveValue::Set(invoice.id),
                requested_by: ActiveValue::Set(principal.id.to_string()),
                reason: ActiveValue::Set(reason.clone()),
                status: ActiveValue::Set(DeletionRequestStatus::Pending.as_str().to_string()),
                reviewed_by: ActiveValue::Set(None),
                reviewed_at: ActiveValue::Set(None),
                rejection_reason: ActiveValue::Set(None),
                created_at: ActiveValue::Set(Utc::now()),
            }
            .insert(&db_tx)
            .await
            .map_err(|err| EngineError::on_insert(err, PENDING_EXISTS))?;
            Ok((model, invoice.invoice_number))
        })?;

        let request = DeletionRequest::try_from(model)?;
        tracing::info!(request = %request.id, invoice = %invoice_id, "invoice deletion requested");
        let message = format!(
            "{} asks to delete invoice {invoice_number}: {}",
            principal.username, request.reason
        );
        let notifications = self
            .staff_ids(&[Role::Admin])
            .await
            .into_iter()
            .map(|admin| {
                Notification::new(
                    admin,
                    NotificationKind::DeletionRequestCreated,
                    message.clone(),
                    Some(request.id),
                )
            })
            .collect();
        self.dispatch(notifications).await;
        Ok(request)
    }

    /// Approve (deleting the invoice) or reject a pending deletion request.
    ///
    /// Authorization: admin, with the admin's password re-entered.
    pub async fn review_deletion_request(
        &self,
        principal: &Principal,
        request_id: Uuid,
        action: ReviewAction,
        rejection_reason: Option<&str>,
        admin_password: &str,
    ) -> ResultEngine<DeletionRequest> {
        require_admin(principal)?;
        self.verify_principal_password(&self.database, principal, admin_password)
            .await?;
        let reason = match action {
            ReviewAction::Approve => None,
            ReviewAction::Reject => Some(require_optional_text(
                rejection_reason,
                MIN_REASON_LEN,
                "rejection reason",
            )?),
        };
        let next = match action {
            ReviewAction::Approve => DeletionRequestStatus::Approved,
            ReviewAction::Reject => DeletionRequestStatus::Rejected,
        };

        let (model, deleted_blob) = with_tx!(self, |db_tx| {
            let res = deletion_requests::Entity::update_many()
                .col_expr(deletion_requests::Column::Status, Expr::value(next.as_str()))
                .col_expr(
                    deletion_requests::Column::RejectionReason,
                    Expr::value(reason.clone()),
                )
                .col_expr(
                    deletion_requests::Column::ReviewedBy,
                    Expr::value(principal.id.to_string()),
                )
                .col_expr(deletion_requests::Column::ReviewedAt, Expr::value(Utc::now()))
                .filter(deletion_requests::Column::Id.eq(request_id.to_string()))
                .filter(
                    deletion_requests::Column::Status.eq(DeletionRequestStatus::Pending.as_str()),
                )
                .exec(&db_tx)
                .await?;
            let model = deletion_requests::Entity::find_by_id(request_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("deletion request not exists".to_string()))?;
            expect_single_row(res.rows_affected, "deletion request")?;

            let mut deleted_blob = None;
            if action == ReviewAction::Approve {
                let invoice = invoices::Entity::find_by_id(model.invoice_id.clone())
                    .one(&db_tx)
                    .await?;
                // The invoice may already be gone; approving still succeeds.
                if let Some(invoice) = invoice {
                    self.delete_invoice_in_tx(&db_tx, &invoice, principal.id)
                        .await?;
                    deleted_blob = Some(invoice.image_key);
                }
            }

            Ok((model, deleted_blob))
        })?;

        let request = DeletionRequest::try_from(model)?;
        tracing::info!(
            request = %request.id,
            invoice = %request.invoice_id,
            status = request.status.as_str(),
            "invoice deletion request reviewed"
        );
        if let Some(key) = deleted_blob {
            self.discard_blob(request.invoice_id, &key).await;
        }
        let message = match request.status {
            DeletionRequestStatus::Approved => {
                "Your invoice deletion request was approved".to_string()
            }
            _ => format!(
                "Your invoice deletion request was rejected: {}",
                request.rejection_reason.as_deref().unwrap_or_default()
            ),
        };
        self.dispatch(vec![Notification::new(
            request.requested_by,
            NotificationKind::DeletionRequestReviewed,
            message,
            Some(request.id),
        )])
        .await;
        Ok(request)
    }

    /// Reviewers see every request; other users only the ones they filed.
    pub async fn list_deletion_requests(
        &self,
        principal: &Principal,
        filter: DeletionRequestListFilter,
    ) -> ResultEngine<Vec<DeletionRequest>> {
        let mut query = deletion_requests::Entity::find();
        if !principal.is_reviewer() {
            query = query
                .filter(deletion_requests::Column::RequestedBy.eq(principal.id.to_string()));
        }
        if let Some(status) = filter.status {
            query = query.filter(deletion_requests::Column::Status.eq(status.as_str()));
        }
        if let Some(invoice_id) = filter.invoice_id {
            query = query.filter(deletion_requests::Column::InvoiceId.eq(invoice_id.to_string()));
        }
        let rows = query
            .order_by_desc(deletion_requests::Column::CreatedAt)
            .all(&self.database)
            .await?;
        rows.into_iter().map(DeletionRequest::try_from).collect()
    }

    pub async fn deletion_request(
        &self,
        principal: &Principal,
        request_id: Uuid,
    ) -> ResultEngine<DeletionRequest> {
        let model = deletion_requests::Entity::find_by_id(request_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("deletion request not exists".to_string()))?;
        require_visible(principal, &model.requested_by, "deletion request")?;
        DeletionRequest::try_from(model)
    }
}
