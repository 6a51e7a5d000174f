use super::{Metadata, SearchResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Addon id, also the prefix of every binge group
pub const ADDON_ID: &str = "org.nzbio";

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Response body of the stream route
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct StreamList {
    /// Playable streams, best quality first
    pub streams: Vec<StreamEntry>,
}

/// One playable stream offered to the player
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    /// Short label, e.g. `NZB 1080p [Indexer]`
    pub name: String,
    /// Multi-line details shown under the label
    pub description: String,
    /// URL of this service's play route for the NZB
    pub url: String,
    /// Player hints
    pub behavior_hints: BehaviorHints,
}

/// Player hints attached to a stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    /// The stream is a raw container the web player cannot handle
    pub not_web_ready: bool,
    /// Release title
    pub filename: String,
    /// Payload size in bytes, when the indexer reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_size: Option<u64>,
    /// Groups streams the player may auto-continue with
    pub binge_group: String,
}

/// Build stream entries for `results`, sorted by quality preference.
///
/// `base_url` is the externally reachable address of this service.
pub fn build_streams(
    results: &[SearchResult],
    metadata: &Metadata,
    base_url: &str,
) -> Vec<StreamEntry> {
    let mut streams: Vec<StreamEntry> = results
        .iter()
        .map(|result| stream_entry(result, metadata, base_url))
        .collect();
    streams.sort_by_key(|s| quality_rank(&s.name));
    streams
}

fn stream_entry(result: &SearchResult, metadata: &Metadata, base_url: &str) -> StreamEntry {
    let tier = quality_tier(&result.quality);
    let markers = result.quality.join(" ");

    let mut description = vec![
        format!("📺 {}", metadata.title),
        format!("🔍 {}", result.indexer),
        format!("🎥 {}", result.category),
        format!("📦 {}", human_size(result.size)),
    ];
    if !markers.is_empty() {
        description.push(format!("🎬 {}", markers));
    }

    StreamEntry {
        name: format!("NZB {} [{}]", tier, result.indexer),
        description: description.join("\n"),
        url: format!(
            "{}/play?nzb={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(&result.link)
        ),
        behavior_hints: BehaviorHints {
            not_web_ready: true,
            filename: result.title.clone(),
            video_size: result.size.filter(|&n| n > 0),
            binge_group: format!(
                "{}|{}|{}",
                ADDON_ID,
                tier.to_lowercase(),
                slug(&result.category)
            ),
        },
    }
}

/// First resolution marker among `markers`, or `"SD"`
fn quality_tier(markers: &[String]) -> String {
    const TIERS: [&str; 5] = ["4k", "2160p", "1080p", "720p", "480p"];
    markers
        .iter()
        .find(|m| TIERS.contains(&m.to_lowercase().as_str()))
        .cloned()
        .unwrap_or_else(|| "SD".to_string())
}

/// 1080p, then 720p, then 2160p/4K, then 480p, then everything else
fn quality_rank(name: &str) -> u32 {
    const ORDER: [(&str, u32); 5] = [
        ("1080p", 1),
        ("720p", 2),
        ("2160p", 3),
        ("4K", 3),
        ("480p", 4),
    ];
    ORDER
        .iter()
        .find(|(marker, _)| name.contains(marker))
        .map(|(_, rank)| *rank)
        .unwrap_or(999)
}

fn slug(category: &str) -> String {
    category
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Size for display: `"1.50 GB"`, `"700.00 MB"` or `"Unknown"`
pub fn human_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(n) if n > GIB => format!("{:.2} GB", n as f64 / GIB as f64),
        Some(n) if n > MIB => format!("{:.2} MB", n as f64 / MIB as f64),
        _ => "Unknown".to_string(),
    }
}
