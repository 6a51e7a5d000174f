//! Addon handlers: manifest and per-title stream listings.

use crate::api::AppState;
use crate::catalog::{AddonManifest, ContentKind, StreamList};
use crate::error::{Error, Result};
use axum::{
    Json,
    extract::{Path, State},
};

/// GET /manifest.json - Addon manifest
#[utoipa::path(
    get,
    path = "/manifest.json",
    tag = "addon",
    responses(
        (status = 200, description = "Addon manifest", body = AddonManifest)
    )
)]
pub async fn addon_manifest() -> Json<AddonManifest> {
    Json(AddonManifest::default())
}

/// GET /stream/:type/:id.json - Streams for a title
///
/// Lookup and search failures are logged and answered with an empty list,
/// so a flaky indexer never breaks the player.
#[utoipa::path(
    get,
    path = "/stream/{type}/{id}.json",
    tag = "addon",
    params(
        ("type" = String, Path, description = "movie or series"),
        ("id" = String, Path, description = "IMDb id, with :season:episode for series")
    ),
    responses(
        (status = 200, description = "Playable streams, best first", body = StreamList),
        (status = 404, description = "Path does not end in .json", body = crate::error::ApiError)
    )
)]
pub async fn stream_listing(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<StreamList>> {
    let raw_id = id
        .strip_suffix(".json")
        .ok_or_else(|| Error::NotFound(format!("/stream/{}/{}", kind, id)))?;

    let streams = match kind.parse::<ContentKind>() {
        Ok(kind) => state.service.catalog().streams(kind, raw_id).await,
        Err(e) => Err(e),
    };

    match streams {
        Ok(streams) => Ok(Json(StreamList { streams })),
        Err(e) => {
            tracing::warn!(kind = %kind, id = %raw_id, error = %e, "stream listing failed");
            Ok(Json(StreamList::default()))
        }
    }
}
