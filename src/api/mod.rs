//! HTTP API server module
//!
//! Serves the addon surface (manifest and stream listings), the play route
//! that turns an NZB URL into a streaming response body, and a few
//! operational endpoints.

use crate::error::{Error, Result};
use crate::service::StreamService;
use axum::{
    Router,
    http::{HeaderValue, header},
    middleware,
    response::Response,
    routing::get,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Addon
/// - `GET /` and `GET /manifest.json` - Addon manifest
/// - `GET /stream/:type/:id.json` - Streams for a movie or series episode
///
/// ## Playback
/// - `GET /play?nzb=<url>` - Stream the payload of an NZB
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /stats` - Server pool statistics
/// - `GET /streams` - Streams currently running
/// - `GET /events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI specification
///
/// Any other path answers with the addon manifest.
pub fn create_router(service: Arc<StreamService>) -> Router {
    let config = service.config().clone();
    let state = AppState::new(service);

    let router = Router::new()
        // Addon
        .route("/", get(routes::addon_manifest))
        .route("/manifest.json", get(routes::addon_manifest))
        .route("/stream/:kind/:id", get(routes::stream_listing))
        // Playback
        .route("/play", get(routes::play))
        // System
        .route("/health", get(routes::health_check))
        .route("/stats", get(routes::pool_stats))
        .route("/streams", get(routes::active_streams))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec))
        // Players probe assorted paths; anything unknown gets the manifest
        .fallback(routes::addon_manifest)
        .with_state(state)
        .layer(middleware::map_response(no_cache_json))
        .layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// JSON answers are computed per request and must not be cached
async fn no_cache_json(mut response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    response
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API on the configured bind address until `shutdown` resolves.
///
/// In-flight responses are allowed to finish after `shutdown`; cancel the
/// service's streams first (see [`StreamService::shutdown`]) so long-running
/// play responses end promptly.
pub async fn start_api_server(
    service: Arc<StreamService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind_address = service.config().api.bind_address;

    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(service);
    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(Error::Io)?,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
