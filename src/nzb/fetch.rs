use crate::error::{Error, ManifestError, Result};
use bytes::{Bytes, BytesMut};
use std::time::Duration;

/// Download an NZB document over HTTP(S).
///
/// The body is read incrementally and abandoned as soon as it exceeds
/// `max_bytes`, so an oversized or endless response never gets buffered in
/// full.
pub async fn fetch_nzb(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<Bytes> {
    let parsed = url::Url::parse(url)
        .map_err(|e| Error::InvalidRequest(format!("invalid NZB URL '{}': {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidRequest(format!(
            "unsupported NZB URL scheme '{}'",
            parsed.scheme()
        )));
    }

    tracing::debug!(url = %redact(&parsed), "fetching NZB");

    let mut response = client
        .get(parsed)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;

    let too_large = |actual: usize| {
        Error::Manifest(ManifestError::TooLarge {
            what: "document bytes",
            limit: max_bytes,
            actual,
        })
    };

    if let Some(length) = response.content_length()
        && length > max_bytes as u64
    {
        return Err(too_large(usize::try_from(length).unwrap_or(usize::MAX)));
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > max_bytes {
            return Err(too_large(body.len() + chunk.len()));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}

// Indexer download links carry the API key in the query string
fn redact(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
