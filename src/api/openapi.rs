//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the nzbio HTTP API using utoipa
//! for compile-time spec generation. Served at `/openapi.json`.

use utoipa::OpenApi;

/// OpenAPI documentation for the nzbio HTTP API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "nzbio HTTP API",
        version = "0.1.0",
        description = "Addon and playback API streaming Usenet-hosted video from NZB manifests",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    paths(
        // Addon
        crate::api::routes::addon_manifest,
        crate::api::routes::stream_listing,

        // Playback
        crate::api::routes::play,

        // System
        crate::api::routes::health_check,
        crate::api::routes::pool_stats,
        crate::api::routes::active_streams,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Catalog types
        crate::catalog::AddonManifest,
        crate::catalog::ManifestHints,
        crate::catalog::StreamList,
        crate::catalog::StreamEntry,
        crate::catalog::BehaviorHints,
        crate::catalog::ContentKind,

        // Core types from types.rs
        crate::types::StreamId,
        crate::types::StreamState,
        crate::types::Event,
        crate::types::StreamInfo,
        crate::types::ServerStats,
        crate::types::PoolStats,

        // API response types
        crate::api::routes::StatsResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "addon", description = "Addon manifest and stream listings"),
        (name = "playback", description = "Streaming NZB payloads"),
        (name = "system", description = "Health, statistics, events, OpenAPI spec"),
    )
)]
pub struct ApiDoc;
