//! HTTP-level tests for the visitor API, driven through the router with
//! `oneshot` against an in-memory SQLite store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use visitlog::analytics::VisitorService;
use visitlog::api::create_api_router;
use visitlog::config::CacheConfig;
use visitlog::storage::{QueryExecutor, SqliteExecutor};

const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0";

async fn create_app() -> Router {
    let executor = SqliteExecutor::new("sqlite::memory:", 5).await.unwrap();
    executor.init().await.unwrap();
    let service = Arc::new(VisitorService::new(Arc::new(executor), CacheConfig::default()));
    create_api_router(service)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_visit(session_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/visitors")
        .header("content-type", "application/json")
        .header("user-agent", FIREFOX_UA)
        .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
        .body(Body::from(
            serde_json::json!({ "sessionId": session_id }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_record_then_read_stats() {
    let app = create_app().await;

    let (status, json) = send(&app, post_visit("api-session-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["sessionId"], "api-session-1");

    let (status, json) = send(&app, get("/api/visitors")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["today"], 1);

    let recent = json["data"]["recent"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["device_type"], "desktop");
    assert_eq!(recent[0]["browser"], "Firefox");
    assert_eq!(recent[0]["os"], "Windows");
    assert!(recent[0].get("ip_address").is_none());
}

#[tokio::test]
async fn test_record_without_body_generates_session() {
    let app = create_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/visitors?ref=newsletter")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!json["sessionId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_record_rejects_malformed_body() {
    let app = create_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/visitors")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_paginated_validation() {
    let app = create_app().await;

    for uri in [
        "/api/visitors/paginated?page=0",
        "/api/visitors/paginated?pageSize=0",
        "/api/visitors/paginated?pageSize=101",
    ] {
        let (status, json) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["error"], "Invalid pagination parameters");
    }
}

#[tokio::test]
async fn test_paginated_non_numeric_params_use_error_envelope() {
    let app = create_app().await;

    for uri in [
        "/api/visitors/paginated?page=abc",
        "/api/visitors/paginated?page=1&pageSize=lots",
    ] {
        let (status, json) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid pagination parameters");
        assert!(json["details"].as_str().unwrap().contains("deserialize"));
    }
}

#[tokio::test]
async fn test_paginated_envelope() {
    let app = create_app().await;
    for i in 0..3 {
        send(&app, post_visit(&format!("page-session-{}", i))).await;
    }

    let (status, json) = send(&app, get("/api/visitors/paginated?page=1&pageSize=2")).await;
    assert_eq!(status, StatusCode::OK);

    let data = &json["data"];
    assert_eq!(data["visitors"].as_array().unwrap().len(), 2);
    assert_eq!(data["pagination"]["currentPage"], 1);
    assert_eq!(data["pagination"]["pageSize"], 2);
    assert_eq!(data["pagination"]["total"], 3);
    assert_eq!(data["pagination"]["hasMore"], true);
    assert_eq!(data["pagination"]["totalPages"], 2);
}

#[tokio::test]
async fn test_recent_and_cache_clear() {
    let app = create_app().await;

    let (_, json) = send(&app, get("/api/visitors/paginated")).await;
    assert_eq!(json["data"]["pagination"]["total"], 0);

    send(&app, post_visit("cache-session")).await;

    let (status, json) = send(&app, get("/api/visitors/recent?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/visitors/cache")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (_, json) = send(&app, get("/api/visitors/paginated")).await;
    assert_eq!(json["data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_app().await;

    let (status, json) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["healthy"], true);
    assert_eq!(json["backend"], "sqlite");
    assert_eq!(json["testResult"], 1);
}
