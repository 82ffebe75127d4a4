//! HTTP surface tests driven through the axum router without a socket

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::{Harness, NAS_CORE, NAS_UNKNOWN};
use radius_sync::http;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn call(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let app = http::router(h.service.app_state());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;
    let (status, body) = call(&h, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_post_auth_first_login() {
    let h = Harness::new().await;
    h.add_voucher("K7P2QX", None).await;

    let (status, body) = call(
        &h,
        post_json(
            "/radius/post-auth",
            json!({"username": "K7P2QX", "reply": "Access-Accept"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["action"], "first_login");
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_post_auth_ignores_reject_and_unknown_users() {
    let h = Harness::new().await;
    h.add_voucher("K7P2QX", None).await;

    let (_, body) = call(
        &h,
        post_json(
            "/radius/post-auth",
            json!({"username": "K7P2QX", "reply": "Access-Reject"}),
        ),
    )
    .await;
    assert_eq!(body["action"], "ignore");

    let (_, body) = call(
        &h,
        post_json(
            "/radius/post-auth",
            json!({"username": "budi", "reply": "Access-Accept"}),
        ),
    )
    .await;
    assert_eq!(body["action"], "ignore");
}

#[tokio::test]
async fn test_online_sessions_listing() {
    let h = Harness::new().await;
    h.add_voucher("HS0001", None).await;
    h.online("budi", NAS_CORE).await;
    h.online("HS0001", NAS_CORE).await;

    let (status, body) = call(&h, get("/sessions/online")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["pppoe"], 1);
    assert_eq!(body["hotspot"], 1);
    assert_eq!(body["sessions"][0]["routerName"], "core");
}

#[tokio::test]
async fn test_disconnect_endpoint_reports_unregistered_nas() {
    let h = Harness::new().await;
    h.online("budi", NAS_CORE).await;
    h.online("sari", NAS_UNKNOWN).await;

    let (status, body) = call(&h, post_json("/sessions/budi/disconnect", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = call(&h, post_json("/sessions/sari/disconnect", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_bulk_status_endpoint() {
    let h = Harness::new().await;
    h.add_subscriber(1, "andi", None).await;
    h.add_subscriber(2, "dewi", None).await;
    h.online("andi", NAS_CORE).await;

    let (status, body) = call(
        &h,
        post_json("/subscribers/status", json!({"ids": [1, 2], "status": "isolated"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "isolated");
    assert_eq!(body["updated"], 2);
    assert_eq!(body["coa"]["disconnected"], 2);
    assert_eq!(body["coa"]["failed"], 0);
}

#[tokio::test]
async fn test_bulk_status_without_ids_is_bad_request() {
    let h = Harness::new().await;
    let (status, body) = call(
        &h,
        post_json("/subscribers/status", json!({"ids": [], "status": "active"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
