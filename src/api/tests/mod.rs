use super::*;
use crate::config::Config;
use crate::nntp::test_helpers::{MockConnector, fast_retry, mock_server_config};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use std::time::Duration;
use tower::ServiceExt;


/// Config with one mock NNTP server named `primary`
fn test_config() -> Config {
    let mut config = Config {
        servers: vec![mock_server_config("primary", 4)],
        retry: fast_retry(),
        ..Default::default()
    };
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    config.stream.acquire_timeout = Duration::from_secs(2);
    config
}

fn test_service(config: Config, connector: Arc<MockConnector>) -> Arc<StreamService> {
    Arc::new(StreamService::with_connector(config, connector).unwrap())
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns_and_stops() {
    let service = test_service(test_config(), MockConnector::new());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(start_api_server(service, async move {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server should stop on shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let app = create_router(test_service(test_config(), MockConnector::new()));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let mut config = test_config();
    config.api.cors_enabled = false;
    let app = create_router(test_service(config, MockConnector::new()));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_cors_specific_origins() {
    let mut config = test_config();
    config.api.cors_origins = vec!["https://web.stremio.com".to_string()];
    let app = create_router(test_service(config, MockConnector::new()));

    let request = Request::builder()
        .uri("/manifest.json")
        .header("Origin", "https://web.stremio.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://web.stremio.com")
    );
}

#[tokio::test]
async fn test_json_responses_are_not_cached() {
    let app = create_router(test_service(test_config(), MockConnector::new()));
    let response = get(app, "/manifest.json").await;

    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );
}

#[tokio::test]
async fn test_unknown_path_falls_back_to_manifest() {
    let app = create_router(test_service(test_config(), MockConnector::new()));
    let response = get(app, "/configure").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], "org.nzbio");
}
