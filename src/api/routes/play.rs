//! Playback handler: NZB URL in, decoded payload bytes out.

use super::PlayQuery;
use crate::api::AppState;
use crate::api::error_response::error_response;
use crate::error::{Error, Result};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;

/// GET /play?nzb=<url> - Stream the payload file of an NZB
///
/// The response status is decided by the first body item: a stream that
/// fails before producing any bytes answers with a JSON error instead of an
/// empty 200. Later failures abort the body, since headers are already sent.
#[utoipa::path(
    get,
    path = "/play",
    tag = "playback",
    params(PlayQuery),
    responses(
        (status = 200, description = "Decoded payload bytes", content_type = "video/mp4"),
        (status = 400, description = "Missing or invalid NZB URL", body = crate::error::ApiError),
        (status = 404, description = "Manifest has no payload file", body = crate::error::ApiError),
        (status = 413, description = "Manifest exceeds limits", body = crate::error::ApiError),
        (status = 422, description = "Malformed manifest", body = crate::error::ApiError),
        (status = 502, description = "Upstream failure", body = crate::error::ApiError),
        (status = 503, description = "No server available or shutting down", body = crate::error::ApiError),
        (status = 504, description = "Timed out", body = crate::error::ApiError)
    )
)]
pub async fn play(
    State(state): State<AppState>,
    Query(query): Query<PlayQuery>,
) -> Result<Response> {
    let nzb_url = query
        .nzb
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::InvalidRequest("missing 'nzb' query parameter".to_string()))?;

    let opened = state.service.open_stream(nzb_url.trim()).await?;
    let mut body = opened.body;

    let first = match body.next().await {
        Some(Err(e)) => {
            tracing::warn!(stream_id = opened.id.0, error = %e, "stream failed before first byte");
            return Ok(error_response(&e));
        }
        Some(Ok(chunk)) => Some(Ok(chunk)),
        None => None,
    };
    let stream = futures::stream::iter(first).chain(body);

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&opened.filename)),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(disposition) = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"",
        opened.filename.replace(['"', '\\'], "")
    )) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

/// Media type for a payload filename
pub fn content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mkv" => "video/x-matroska",
        "mp4" | "m4v" => "video/mp4",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "ts" | "m2ts" => "video/mp2t",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        _ => "video/mp4",
    }
}
