use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use api_types::ErrorResponse;
pub use server::{ServerState, router, run, run_with_listener, spawn_with_listener};

mod advances;
mod budget_requests;
mod companies;
mod convert;
mod deletion_requests;
mod invoices;
mod ledger;
mod server;
mod users;

pub mod types {
    pub use api_types::{ActionResponse, ErrorResponse, ReviewAction, SettlementResponse};

    pub mod budget_request {
        pub use api_types::budget_request::{
            BudgetRequestCreated, BudgetRequestNew, BudgetRequestQuery, BudgetRequestReview,
            BudgetRequestReviewResponse, BudgetRequestView, BulkDelete, BulkDeleteFilters,
            BulkDeleteResponse, TransferConfirm,
        };
    }

    pub mod advance {
        pub use api_types::advance::{AdvanceNew, AdvanceQuery, AdvanceTransfer, AdvanceView};
    }

    pub mod invoice {
        pub use api_types::invoice::{InvoiceNew, InvoiceQuery, InvoiceReview, InvoiceView};
    }

    pub mod deletion_request {
        pub use api_types::deletion_request::{
            DeletionRequestCreated, DeletionRequestNew, DeletionRequestQuery,
            DeletionRequestReview, DeletionRequestView,
        };
    }

    pub mod ledger {
        pub use api_types::ledger::{BalanceChange, LedgerEntryView, LedgerReportView};
    }

    pub mod company {
        pub use api_types::company::{CompanyNew, CompanyPatch, CompanyView, UserCompanies};
    }

    pub mod user {
        pub use api_types::user::UserView;
    }
}

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::BadRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        EngineError::Internal(_) | EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        EngineError::Internal(msg) => {
            tracing::error!("internal error: {msg}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_forbidden_maps_to_403() {
        let res = ServerError::from(EngineError::Forbidden("forbidden".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        let res = ServerError::from(EngineError::NotFound("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn engine_conflict_maps_to_409() {
        let res = ServerError::from(EngineError::Conflict("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn engine_validation_maps_to_400() {
        let res = ServerError::from(EngineError::BadRequest("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn engine_unauthorized_maps_to_401() {
        let res = ServerError::from(EngineError::Unauthorized("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_errors_map_to_500() {
        let res = ServerError::from(EngineError::Internal("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
