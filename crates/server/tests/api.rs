use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::Engine as _;
use http_body_util::BodyExt;
use sea_orm::{ConnectOptions, Database};
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::{Engine, PasswordPolicy, Principal, Role};
use migration::MigratorTrait;
use server::{ServerState, router};

struct TestApp {
    router: Router,
    company_id: String,
}

async fn app() -> TestApp {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();

    let engine = Engine::builder()
        .database(db)
        .password_policy(PasswordPolicy::insecure_fast())
        .build()
        .await
        .unwrap();

    let admin = engine
        .create_user("admin", "admin-pass", Role::Admin)
        .await
        .unwrap();
    engine
        .create_user("accountant", "accountant-pass", Role::Accountant)
        .await
        .unwrap();
    let alice = engine
        .create_user("alice", "alice-pass", Role::User)
        .await
        .unwrap();
    let admin = Principal::new(admin.id, admin.username, admin.role);
    let company = engine
        .create_company(&admin, "Acme", None)
        .await
        .unwrap();
    engine
        .set_user_companies(&admin, alice.id, vec![company.id])
        .await
        .unwrap();

    TestApp {
        router: router(ServerState {
            engine: Arc::new(engine),
        }),
        company_id: company.id.to_string(),
    }
}

fn basic(username: &str, password: &str) -> String {
    let secret = format!("{username}:{password}");
    format!(
        "Basic {}",
        base64::prelude::BASE64_STANDARD.encode(secret)
    )
}

fn request(method: Method, uri: &str, auth: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "localhost:3000");
    if let Some((username, password)) = auth {
        builder = builder.header(header::AUTHORIZATION, basic(username, password));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn file_request(app: &TestApp, amount: &str) -> String {
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/budget-requests",
            Some(("alice", "alice-pass")),
            Some(json!({
                "companyId": app.company_id,
                "requestedAmount": amount,
                "justification": "Szkolenie w Warszawie",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["requestId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn requests_without_valid_credentials_are_rejected() {
    let app = app().await;

    let (status, _) = send(&app, request(Method::GET, "/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        request(Method::GET, "/me", Some(("alice", "wrong")), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        request(Method::GET, "/me", Some(("alice", "alice-pass")), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["balance"], "0.00");
}

#[tokio::test]
async fn cross_origin_mutations_are_forbidden() {
    let app = app().await;
    let mut req = request(
        Method::POST,
        "/budget-requests",
        Some(("alice", "alice-pass")),
        Some(json!({
            "companyId": app.company_id,
            "requestedAmount": "10",
            "justification": "Szkolenie w Warszawie",
        })),
    );
    req.headers_mut()
        .insert(header::ORIGIN, "https://evil.example".parse().unwrap());

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("cross-origin"));

    // reads are never origin-checked
    let mut req = request(Method::GET, "/me", Some(("alice", "alice-pass")), None);
    req.headers_mut()
        .insert(header::ORIGIN, "https://evil.example".parse().unwrap());
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn budget_request_flow_credits_balance_on_transfer() {
    let app = app().await;
    let request_id = file_request(&app, "150.00").await;

    let review_uri = format!("/budget-requests/{request_id}/review");
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &review_uri,
            Some(("alice", "alice-pass")),
            Some(json!({ "action": "approve" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &review_uri,
            Some(("accountant", "accountant-pass")),
            Some(json!({ "action": "approve" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert!(body["advanceId"].is_string());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &review_uri,
            Some(("admin", "admin-pass")),
            Some(json!({ "action": "approve" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/budget-requests/{request_id}/confirm-transfer"),
            Some(("accountant", "accountant-pass")),
            Some(json!({ "transferNumber": "PRZ/2026/10" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, me) = send(
        &app,
        request(Method::GET, "/me", Some(("alice", "alice-pass")), None),
    )
    .await;
    assert_eq!(me["balance"], "150.00");

    let (status, view) = send(
        &app,
        request(
            Method::GET,
            &format!("/budget-requests/{request_id}"),
            Some(("alice", "alice-pass")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "money_transferred");
    assert_eq!(view["transferNumber"], "PRZ/2026/10");
}

#[tokio::test]
async fn validation_errors_map_to_bad_request() {
    let app = app().await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/budget-requests",
            Some(("alice", "alice-pass")),
            Some(json!({
                "companyId": app.company_id,
                "requestedAmount": "12.345",
                "justification": "Szkolenie w Warszawie",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let request_id = file_request(&app, "40").await;
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &format!("/budget-requests/{request_id}/review"),
            Some(("accountant", "accountant-pass")),
            Some(json!({ "action": "reject", "rejectionReason": "nie" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            Method::GET,
            "/budget-requests?status=archived",
            Some(("accountant", "accountant-pass")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ledger_endpoints_respect_ownership() {
    let app = app().await;
    let (_, me) = send(
        &app,
        request(Method::GET, "/me", Some(("alice", "alice-pass")), None),
    )
    .await;
    let alice_id = me["id"].as_str().unwrap().to_string();

    let (status, entry) = send(
        &app,
        request(
            Method::POST,
            &format!("/users/{alice_id}/top-up"),
            Some(("accountant", "accountant-pass")),
            Some(json!({ "amount": "25.50", "notes": "zasilenie" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    assert_eq!(entry["balanceAfter"], "25.50");
    assert_eq!(entry["transactionType"], "zasilenie");

    let (status, history) = send(
        &app,
        request(
            Method::GET,
            &format!("/users/{alice_id}/ledger"),
            Some(("alice", "alice-pass")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        request(
            Method::GET,
            &format!("/users/{alice_id}/ledger/verify"),
            Some(("alice", "alice-pass")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = send(
        &app,
        request(
            Method::GET,
            &format!("/users/{alice_id}/ledger/verify"),
            Some(("admin", "admin-pass")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["consistent"], true);
}
