mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use aural_api::{create_router, ServerConfig};

async fn get(path: &str) -> (StatusCode, serde_json::Value) {
    let (state, _connector) = common::app_state();
    let app = create_router(state, None);

    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_healthz_alias() {
    let (status, body) = get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let (status, _) = get("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ws_requires_upgrade() {
    let (status, _) = get("/ws").await;
    assert!(status.is_client_error());
}

fn upgrade_request() -> Request<Body> {
    Request::builder()
        .uri("/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_ws_rejected_when_sessions_full() {
    let (state, connector) = common::app_state_with(ServerConfig {
        max_sessions: 1,
        ..ServerConfig::default()
    });
    let _held = state.limit.try_reserve().expect("free slot");
    let app = create_router(state.clone(), None);

    let response = app.oneshot(upgrade_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["detail"].as_str().unwrap().contains("session limit"));
    assert_eq!(state.sessions.session_count().await, 0);
    assert_eq!(connector.created(), 0);
}

#[tokio::test]
async fn test_rejected_upgrade_frees_slot() {
    let (state, _connector) = common::app_state_with(ServerConfig {
        max_sessions: 1,
        ..ServerConfig::default()
    });
    let app = create_router(state.clone(), None);

    // No upgrade headers: rejected after the slot was reserved
    let response = app
        .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.limit.try_reserve().is_some());
}
