//! Catalog lookup: from a content id to a list of playable streams.
//!
//! A stream request resolves the IMDb id through TMDB, builds a search query,
//! fans out to every configured Newznab indexer and turns the results into
//! stream entries pointing back at this service's play route.

mod addon;
mod content_id;
mod indexer;
mod listing;
mod metadata;

pub use addon::{AddonManifest, ManifestHints};
pub use content_id::{ContentId, ContentKind, Episode};
pub use indexer::{
    IndexerClient, SearchResult, dedup_by_title, parse_results, quality_markers, retain_recent,
};
pub use listing::{ADDON_ID, BehaviorHints, StreamEntry, StreamList, build_streams, human_size};
pub use metadata::{Metadata, MetadataClient};

use crate::config::Config;
use crate::error::{Error, Result};

/// Resolves content ids to stream entries
#[derive(Clone)]
pub struct Catalog {
    metadata: MetadataClient,
    indexers: IndexerClient,
    base_url: String,
}

impl Catalog {
    /// Build a catalog from `config`, sharing `http` for all requests
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            metadata: MetadataClient::new(http.clone(), config.metadata.clone()),
            indexers: IndexerClient::new(http, config.indexers.clone(), config.search.clone()),
            base_url: config.api.base_url(),
        }
    }

    /// Streams for `raw_id` of the given kind
    pub async fn streams(&self, kind: ContentKind, raw_id: &str) -> Result<Vec<StreamEntry>> {
        let id = ContentId::parse(kind, raw_id)?;
        let metadata = self
            .metadata
            .lookup(&id.imdb_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no metadata for {}", id.imdb_id)))?;

        let query = id.search_query(&metadata);
        tracing::info!(
            imdb_id = %id.imdb_id,
            title = %metadata.title,
            query = %query,
            "searching indexers"
        );

        let results = self.indexers.search_all(&query).await;
        let streams = build_streams(&results, &metadata, &self.base_url);
        tracing::info!(imdb_id = %id.imdb_id, streams = streams.len(), "streams listed");
        Ok(streams)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
