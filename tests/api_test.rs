//! Router-level tests driven through `tower::ServiceExt::oneshot`.
//!
//! None of these reach a real database: the audit cases either fail
//! validation or target a closed local port.

use std::sync::Arc;

use auditix::catalog::CatalogRegistry;
use auditix::config::AppConfig;
use auditix::AppState;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let catalogs = CatalogRegistry::embedded().expect("embedded catalogs");
    auditix::routes::router(AppState::new(AppConfig::default(), Arc::new(catalogs)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn liveness_endpoint_responds() {
    let response = app()
        .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_reports_loaded_catalogs() {
    let response = app()
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["catalogs"], 3);
}

#[tokio::test]
async fn home_page_renders_the_form() {
    let response = app()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("action=\"/audit_database\""));
    assert!(html.contains("value=\"mssql\""));
}

#[tokio::test]
async fn lists_catalogs() {
    let response = app()
        .oneshot(Request::get("/api/v1/catalogs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let catalogs = body["data"].as_array().unwrap();
    assert_eq!(catalogs.len(), 3);
    assert!(catalogs.iter().all(|c| c["standard"] == "CIS"));
    assert!(catalogs.iter().all(|c| c["checks"].as_u64().unwrap() > 0));
}

#[tokio::test]
async fn catalog_detail_lists_checks_in_order() {
    let response = app()
        .oneshot(
            Request::get("/api/v1/catalogs/postgresql/cis")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["engine"], "postgres");
    let checks = body["data"]["checks"].as_array().unwrap();
    assert_eq!(checks[0]["id"], "1.1");
    assert_eq!(checks[0]["classification"], "manual");
}

#[tokio::test]
async fn unknown_catalog_is_not_found() {
    let response = app()
        .oneshot(
            Request::get("/api/v1/catalogs/db2/cis")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_db_type_is_rejected_before_connecting() {
    let response = app()
        .oneshot(form_request(
            "/audit_database",
            "db_type=db2&host=localhost&database=app&username=auditor&password=x",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn form_paths_accept_a_trailing_slash() {
    for uri in ["/audit/", "/audit_database/"] {
        let response = app()
            .oneshot(form_request(
                uri,
                "db_type=db2&host=localhost&database=app&username=auditor&password=x",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{uri}");
    }
}

#[tokio::test]
async fn injected_username_is_rejected() {
    let response = app()
        .oneshot(form_request(
            "/audit",
            "db_type=postgres&host=localhost&database=app&username=x%27%3B--&password=x",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let response = app()
        .oneshot(
            Request::post("/api/v1/audits")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"db_type\": \"postgres\""))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unreachable_target_yields_connection_error_envelope() {
    let request = json!({
        "db_type": "postgres",
        "host": "127.0.0.1",
        "port": 1,
        "database": "app",
        "username": "auditor",
        "password": "not-logged"
    });
    let response = app()
        .oneshot(
            Request::post("/api/v1/audits")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "CONNECTION_FAILED");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("127.0.0.1:1"));
    assert!(!message.contains("not-logged"));
}
