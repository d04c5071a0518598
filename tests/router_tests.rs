//! Router tests for requests rejected before any database access.
//!
//! The pool is created lazily and never connects, so these run without
//! PostgreSQL.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use library_service::{
    api, config::AppConfig, models::UserClaims, repository::Repository, services::Services,
    AppState,
};

fn test_app() -> (Router, AppConfig) {
    let config = AppConfig::default();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("Failed to build lazy pool");

    let services = Services::new(Repository::new(pool), config.auth.clone());
    let state = AppState {
        config: Arc::new(config.clone()),
        services: Arc::new(services),
    };

    (api::create_router(state), config)
}

fn token(config: &AppConfig, user_id: i32, is_staff: bool) -> String {
    let now = Utc::now().timestamp();
    UserClaims {
        sub: format!("user{}@mail.com", user_id),
        user_id,
        is_staff,
        exp: now + 3600,
        iat: now,
    }
    .create_token(&config.auth.jwt_secret)
    .expect("Failed to create token")
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = test_app();

    let (status, body) = send(app, request(Method::GET, "/api/v1/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_borrowings_require_token() {
    let (app, _) = test_app();

    let (status, body) = send(app, request(Method::GET, "/api/v1/borrowings", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let (app, _) = test_app();

    let (status, _) = send(
        app,
        request(Method::GET, "/api/v1/users/me", Some("not-a-jwt"), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let (app, config) = test_app();
    let mut other = config.clone();
    other.auth.jwt_secret = "another-secret".to_string();
    let forged = token(&other, 1, true);

    let (status, _) = send(
        app,
        request(Method::GET, "/api/v1/borrowings", Some(&forged), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_staff_cannot_create_book() {
    let (app, config) = test_app();
    let bearer = token(&config, 2, false);

    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/v1/books",
            Some(&bearer),
            Some(json!({
                "title": "Kobzar",
                "author": "Taras Shevchenko",
                "cover": "Hard",
                "inventory": 3,
                "daily_fee": "2.00"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotAuthorized");
}

#[tokio::test]
async fn test_non_staff_cannot_delete_book() {
    let (app, config) = test_app();
    let bearer = token(&config, 2, false);

    let (status, _) = send(
        app,
        request(Method::DELETE, "/api/v1/books/1", Some(&bearer), None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_create_book_with_negative_inventory() {
    let (app, config) = test_app();
    let bearer = token(&config, 1, true);

    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/v1/books",
            Some(&bearer),
            Some(json!({
                "title": "Kobzar",
                "author": "Taras Shevchenko",
                "cover": "Hard",
                "inventory": -1,
                "daily_fee": "2.00"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["inventory"].is_array());
}

#[tokio::test]
async fn test_malformed_json_body() {
    let (app, config) = test_app();
    let bearer = token(&config, 1, true);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/books")
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["non_field_errors"].is_array());
}

#[tokio::test]
async fn test_borrowing_requires_expected_return_date_and_book() {
    let (app, config) = test_app();
    let bearer = token(&config, 2, false);

    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/v1/borrowings",
            Some(&bearer),
            Some(json!({ "borrow_date": "2024-01-01" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"]["expected_return_date"][0], "This field is required.");
    assert_eq!(body["fields"]["book"][0], "This field is required.");
}

#[tokio::test]
async fn test_staff_list_with_malformed_user_id() {
    let (app, config) = test_app();
    let bearer = token(&config, 1, true);

    let (status, body) = send(
        app,
        request(Method::GET, "/api/v1/borrowings?user_id=abc", Some(&bearer), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["user_id"].is_array());
}

#[tokio::test]
async fn test_return_requires_date() {
    let (app, config) = test_app();
    let bearer = token(&config, 2, false);

    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/api/v1/borrowings/5/return",
            Some(&bearer),
            Some(json!({})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"]["actual_return_date"][0], "This field is required.");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _) = test_app();

    let (status, body) = send(app, request(Method::GET, "/api-docs/openapi.json", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/borrowings/{id}/return"].is_object());
}

#[tokio::test]
async fn test_malformed_borrowing_id_is_json_error() {
    let (app, config) = test_app();
    let bearer = token(&config, 2, false);

    let req = request(
        Method::POST,
        "/api/v1/borrowings/abc/return",
        Some(&bearer),
        Some(json!({ "actual_return_date": "2023-01-09" })),
    );
    let response = app.oneshot(req).await.expect("Request failed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/json"));

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("Failed to read body");
    let body: Value = serde_json::from_slice(&bytes).expect("JSON error body");
    assert_eq!(body["error"], "BadValue");
    assert!(body["fields"]["id"].is_array());
}

#[tokio::test]
async fn test_malformed_book_id_is_json_error() {
    let (app, _) = test_app();

    let (status, body) = send(app, request(Method::GET, "/api/v1/books/xyz", None, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 6);
    assert!(body["fields"]["id"].is_array());
}
