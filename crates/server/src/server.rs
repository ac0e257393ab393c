use axum::{
    Json, Router,
    extract::{Request, State},
    http::{Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};

use std::{net::SocketAddr, sync::Arc};

use crate::{advances, budget_requests, companies, deletion_requests, invoices, ledger, users};
use api_types::ErrorResponse;
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
}

/// Reject state-changing requests whose `Origin` names a different host.
///
/// Requests without an `Origin` header (CLI clients, server to server) pass.
async fn origin_check(request: Request, next: Next) -> Response {
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if mutating && !same_origin(&request) {
        tracing::warn!(
            "rejected cross-origin {} {}",
            request.method(),
            request.uri().path()
        );
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "cross-origin request rejected".to_string(),
            }),
        )
            .into_response();
    }
    next.run(request).await
}

fn same_origin(request: &Request) -> bool {
    let Some(origin) = request.headers().get(header::ORIGIN) else {
        return true;
    };
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|host| host.to_str().ok());
    let origin_authority = origin
        .to_str()
        .ok()
        .and_then(|origin| origin.parse::<Uri>().ok())
        .and_then(|uri| uri.authority().map(|authority| authority.as_str().to_string()));

    match (origin_authority, host) {
        (Some(origin), Some(host)) => origin.eq_ignore_ascii_case(host),
        _ => false,
    }
}

async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(credentials)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if credentials.username().is_empty() || credentials.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let principal = state
        .engine
        .authenticate(credentials.username(), credentials.password())
        .await
        .map_err(|err| {
            tracing::debug!("authentication failed for {}: {err}", credentials.username());
            StatusCode::UNAUTHORIZED
        })?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/me", get(users::me))
        .route("/users", get(users::list))
        .route("/users/{id}", get(users::get))
        .route("/users/{id}/ledger", get(ledger::history))
        .route("/users/{id}/ledger/verify", get(ledger::verify))
        .route("/users/{id}/top-up", post(ledger::top_up))
        .route("/users/{id}/adjust", post(ledger::adjust))
        .route(
            "/users/{id}/companies",
            get(companies::user_companies).put(companies::set_user_companies),
        )
        .route("/companies", get(companies::list).post(companies::create))
        .route("/companies/{id}", patch(companies::patch))
        .route(
            "/budget-requests",
            get(budget_requests::list).post(budget_requests::create),
        )
        .route(
            "/budget-requests/bulk-delete",
            post(budget_requests::bulk_delete),
        )
        .route(
            "/budget-requests/{id}",
            get(budget_requests::get).delete(budget_requests::cancel),
        )
        .route(
            "/budget-requests/{id}/review",
            post(budget_requests::review),
        )
        .route(
            "/budget-requests/{id}/confirm-transfer",
            post(budget_requests::confirm_transfer),
        )
        .route(
            "/budget-requests/{id}/settle",
            post(budget_requests::settle),
        )
        .route("/advances", get(advances::list).post(advances::create))
        .route("/advances/{id}", get(advances::get))
        .route("/advances/{id}/transfer", post(advances::transfer))
        .route("/advances/{id}/settle", post(advances::settle))
        .route("/invoices", get(invoices::list).post(invoices::create))
        .route(
            "/invoices/{id}",
            get(invoices::get).delete(invoices::delete),
        )
        .route("/invoices/{id}/start-review", post(invoices::start_review))
        .route("/invoices/{id}/review", post(invoices::review))
        .route("/invoices/{id}/transfer", post(invoices::transfer))
        .route(
            "/invoice-deletion-requests",
            get(deletion_requests::list).post(deletion_requests::create),
        )
        .route("/invoice-deletion-requests/{id}", get(deletion_requests::get))
        .route(
            "/invoice-deletion-requests/{id}/review",
            post(deletion_requests::review),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .route_layer(middleware::from_fn(origin_check))
        .with_state(state)
}

pub async fn run(engine: Engine, addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState {
        engine: Arc::new(engine),
    };

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(origin: Option<&str>, host: Option<&str>) -> Request {
        let mut builder = Request::builder().method(Method::POST).uri("/invoices");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn missing_origin_is_allowed() {
        assert!(same_origin(&request(None, Some("localhost:3000"))));
    }

    #[test]
    fn matching_origin_is_allowed() {
        assert!(same_origin(&request(
            Some("http://localhost:3000"),
            Some("localhost:3000")
        )));
    }

    #[test]
    fn foreign_origin_is_rejected() {
        assert!(!same_origin(&request(
            Some("https://evil.example"),
            Some("localhost:3000")
        )));
    }

    #[test]
    fn origin_without_host_is_rejected() {
        assert!(!same_origin(&request(Some("http://localhost:3000"), None)));
    }
}
