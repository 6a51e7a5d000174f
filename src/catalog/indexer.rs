//! Newznab indexer search.
//!
//! Indexers answer `t=search` queries with an RSS 2.0 feed; each `<item>` is
//! one NZB. Sizes come from the enclosure or the `newznab:attr name="size"`
//! extension, categories from `<category>` or `newznab:attr name="category"`.

use crate::config::{IndexerConfig, SearchConfig};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

#[allow(clippy::expect_used)]
static QUALITY_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)4K|2160p|1080p|720p|480p|HDTV|WEB-DL|BluRay|HEVC|x265|H\.265|H264|x264")
        .expect("quality marker pattern is valid")
});

/// One NZB offered by an indexer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    /// Release title
    pub title: String,
    /// URL of the NZB document
    pub link: String,
    /// Publication date
    pub pub_date: Option<DateTime<Utc>>,
    /// Payload size in bytes
    pub size: Option<u64>,
    /// Indexer category (`"Unknown"` when absent)
    pub category: String,
    /// Quality markers found in the title, in order of appearance
    pub quality: Vec<String>,
    /// Name of the indexer that returned the item
    pub indexer: String,
}

/// Searches every configured indexer
#[derive(Clone)]
pub struct IndexerClient {
    http: reqwest::Client,
    indexers: Vec<IndexerConfig>,
    search: SearchConfig,
}

impl IndexerClient {
    /// Create a client sharing `http`
    pub fn new(http: reqwest::Client, indexers: Vec<IndexerConfig>, search: SearchConfig) -> Self {
        Self {
            http,
            indexers,
            search,
        }
    }

    /// Configured indexers
    pub fn indexers(&self) -> &[IndexerConfig] {
        &self.indexers
    }

    /// Query a single indexer
    pub async fn search(&self, indexer: &IndexerConfig, query: &str) -> Result<Vec<SearchResult>> {
        debug!(indexer = %indexer.name, query, "searching indexer");

        let response = self
            .http
            .get(&indexer.url)
            .query(&[
                ("apikey", indexer.api_key.as_str()),
                ("t", "search"),
                ("q", query),
                ("extended", "1"),
            ])
            .timeout(self.search.timeout)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        let results = parse_results(&body, &indexer.name)?;
        debug!(indexer = %indexer.name, results = results.len(), "indexer answered");
        Ok(results)
    }

    /// Query all indexers concurrently.
    ///
    /// A failing indexer contributes nothing. Results are deduplicated by
    /// title and filtered by the retention window.
    pub async fn search_all(&self, query: &str) -> Vec<SearchResult> {
        let searches = self.indexers.iter().map(|indexer| async move {
            match self.search(indexer, query).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(indexer = %indexer.name, error = %e, "indexer search failed");
                    Vec::new()
                }
            }
        });
        let all: Vec<SearchResult> = futures::future::join_all(searches)
            .await
            .into_iter()
            .flatten()
            .collect();
        let total = all.len();

        let unique = dedup_by_title(all);
        let unique_count = unique.len();
        let kept = retain_recent(unique, self.search.retention_days, Utc::now());

        info!(
            query,
            total,
            unique = unique_count,
            kept = kept.len(),
            "indexer search complete"
        );
        kept
    }
}

/// Parse a Newznab RSS response
pub fn parse_results(body: &[u8], indexer: &str) -> Result<Vec<SearchResult>> {
    let channel = rss::Channel::read_from(body)
        .map_err(|e| Error::Other(format!("{} returned an unreadable feed: {}", indexer, e)))?;

    let mut results = Vec::with_capacity(channel.items().len());
    for item in channel.items() {
        let Some(title) = item.title().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        let Some(link) = item
            .link()
            .or_else(|| item.enclosure().map(|e| e.url()))
            .map(str::trim)
            .filter(|l| !l.is_empty())
        else {
            debug!(indexer, title, "skipping item without an NZB link");
            continue;
        };

        let pub_date = match item.pub_date() {
            None => None,
            Some(raw) => match DateTime::parse_from_rfc2822(raw.trim()) {
                Ok(date) => Some(date.with_timezone(&Utc)),
                Err(_) => {
                    debug!(indexer, title, date = raw, "skipping item with unreadable date");
                    continue;
                }
            },
        };

        let size = item
            .enclosure()
            .and_then(|e| e.length().trim().parse::<u64>().ok())
            .filter(|&n| n > 0)
            .or_else(|| newznab_attr(item, "size").and_then(|v| v.parse().ok()));

        let category = item
            .categories()
            .first()
            .map(|c| c.name().trim().to_string())
            .filter(|c| !c.is_empty())
            .or_else(|| newznab_attr(item, "category").map(str::to_string))
            .unwrap_or_else(|| "Unknown".to_string());

        results.push(SearchResult {
            title: title.to_string(),
            link: link.to_string(),
            pub_date,
            size,
            category,
            quality: quality_markers(title),
            indexer: indexer.to_string(),
        });
    }
    Ok(results)
}

fn newznab_attr<'a>(item: &'a rss::Item, name: &str) -> Option<&'a str> {
    item.extensions()
        .get("newznab")?
        .get("attr")?
        .iter()
        .find(|ext| ext.attrs().get("name").map(String::as_str) == Some(name))
        .and_then(|ext| ext.attrs().get("value"))
        .map(String::as_str)
}

/// Quality markers (resolution, source, codec) mentioned in a release title
pub fn quality_markers(title: &str) -> Vec<String> {
    QUALITY_MARKERS
        .find_iter(title)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop results with a repeated (case-insensitive) title.
///
/// A later duplicate replaces the earlier entry but keeps its position.
pub fn dedup_by_title(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(results.len());
    let mut unique: Vec<SearchResult> = Vec::with_capacity(results.len());
    for result in results {
        let key = result.title.to_lowercase();
        match positions.get(&key) {
            Some(&index) => unique[index] = result,
            None => {
                positions.insert(key, unique.len());
                unique.push(result);
            }
        }
    }
    unique
}

/// Keep undated results and those published within `retention_days` of `now`
pub fn retain_recent(
    results: Vec<SearchResult>,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Vec<SearchResult> {
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));
    results
        .into_iter()
        .filter(|r| r.pub_date.is_none_or(|date| date >= cutoff))
        .collect()
}
