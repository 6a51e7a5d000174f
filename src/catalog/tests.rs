use super::*;
use crate::config::{ApiConfig, IndexerConfig, MetadataConfig, SearchConfig};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===================================================================
// Fixtures
// ===================================================================

fn feed(items: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
  <channel>
    <title>Test Indexer</title>
    <link>https://indexer.test</link>
    <description>search results</description>
    {}
  </channel>
</rss>"#,
        items.join("\n")
    )
}

fn item(title: &str, link: &str, pub_date: Option<&str>, extra: &str) -> String {
    let date = pub_date
        .map(|d| format!("<pubDate>{}</pubDate>", d))
        .unwrap_or_default();
    format!(
        "<item><title>{}</title><link>{}</link>{}{}</item>",
        title, link, date, extra
    )
}

fn recent() -> String {
    (Utc::now() - ChronoDuration::days(3)).to_rfc2822()
}

fn result(title: &str, quality: &[&str], size: Option<u64>) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        link: format!("https://indexer.test/getnzb/{}.nzb", title),
        pub_date: None,
        size,
        category: "Movies > HD".to_string(),
        quality: quality.iter().map(|q| q.to_string()).collect(),
        indexer: "Alpha".to_string(),
    }
}

fn matrix() -> Metadata {
    Metadata {
        tmdb_id: 603,
        title: "The Matrix".to_string(),
        year: Some(1999),
        kind: ContentKind::Movie,
    }
}

fn search_config() -> SearchConfig {
    SearchConfig {
        retention_days: 365,
        timeout: Duration::from_secs(2),
    }
}

// ===================================================================
// Feed parsing
// ===================================================================

#[test]
fn test_parse_results_reads_newznab_fields() {
    let date = recent();
    let body = feed(&[
        item(
            "The.Matrix.1999.1080p.BluRay.x264-GRP",
            "https://indexer.test/getnzb/a.nzb",
            Some(&date),
            r#"<category>Movies &gt; HD</category>
               <enclosure url="https://indexer.test/getnzb/a.nzb" length="8589934592" type="application/x-nzb"/>"#,
        ),
        item(
            "The.Matrix.1999.720p.WEB-DL",
            "https://indexer.test/getnzb/b.nzb",
            None,
            r#"<newznab:attr name="category" value="2040"/>
               <newznab:attr name="size" value="4294967296"/>"#,
        ),
    ]);

    let results = parse_results(body.as_bytes(), "Alpha").unwrap();
    assert_eq!(results.len(), 2);

    let first = &results[0];
    assert_eq!(first.title, "The.Matrix.1999.1080p.BluRay.x264-GRP");
    assert_eq!(first.link, "https://indexer.test/getnzb/a.nzb");
    assert_eq!(first.size, Some(8_589_934_592));
    assert_eq!(first.category, "Movies > HD");
    assert_eq!(first.quality, vec!["1080p", "BluRay", "x264"]);
    assert_eq!(first.indexer, "Alpha");
    assert!(first.pub_date.is_some());

    let second = &results[1];
    assert_eq!(second.size, Some(4_294_967_296));
    assert_eq!(second.category, "2040");
    assert!(second.pub_date.is_none());
}

#[test]
fn test_parse_results_skips_unusable_items() {
    let body = feed(&[
        item("", "https://indexer.test/a.nzb", None, ""),
        item("Bad.Date.1080p", "https://indexer.test/b.nzb", Some("yesterday-ish"), ""),
        "<item><title>No.Link</title></item>".to_string(),
        item("Kept", "https://indexer.test/c.nzb", None, ""),
    ]);

    let results = parse_results(body.as_bytes(), "Alpha").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Kept");
    assert_eq!(results[0].category, "Unknown");
    assert_eq!(results[0].size, None);
}

#[test]
fn test_parse_results_rejects_non_feed() {
    let err = parse_results(b"<html>rate limited</html>", "Alpha").unwrap_err();
    assert!(err.to_string().contains("Alpha"));
}

#[test]
fn test_quality_markers_case_insensitive_in_order() {
    assert_eq!(
        quality_markers("Show.S01E01.2160p.hevc.H.265.HDTV"),
        vec!["2160p", "hevc", "H.265", "HDTV"]
    );
    assert!(quality_markers("Plain Title").is_empty());
}

// ===================================================================
// Dedup and retention
// ===================================================================

#[test]
fn test_dedup_later_duplicate_replaces_in_place() {
    let mut a = result("Movie.1080p", &["1080p"], Some(1));
    a.indexer = "Alpha".to_string();
    let b = result("Other.720p", &["720p"], Some(2));
    let mut c = result("MOVIE.1080P", &["1080P"], Some(3));
    c.indexer = "Beta".to_string();

    let unique = dedup_by_title(vec![a, b, c]);
    assert_eq!(unique.len(), 2);
    assert_eq!(unique[0].indexer, "Beta");
    assert_eq!(unique[0].size, Some(3));
    assert_eq!(unique[1].title, "Other.720p");
}

#[test]
fn test_retention_keeps_undated_and_recent() {
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let mut undated = result("Undated", &[], None);
    undated.pub_date = None;
    let mut fresh = result("Fresh", &[], None);
    fresh.pub_date = Some(now - ChronoDuration::days(10));
    let mut stale = result("Stale", &[], None);
    stale.pub_date = Some(now - ChronoDuration::days(400));

    let kept = retain_recent(vec![undated, fresh, stale], 365, now);
    let titles: Vec<_> = kept.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Undated", "Fresh"]);
}

// ===================================================================
// Stream listing
// ===================================================================

#[test]
fn test_human_size() {
    assert_eq!(human_size(Some(3 * 1024 * 1024 * 1024 / 2)), "1.50 GB");
    assert_eq!(human_size(Some(700 * 1024 * 1024)), "700.00 MB");
    assert_eq!(human_size(Some(1024)), "Unknown");
    assert_eq!(human_size(None), "Unknown");
}

#[test]
fn test_build_streams_sorted_by_quality_preference() {
    let results = vec![
        result("A.480p", &["480p"], None),
        result("B.2160p", &["2160p", "HEVC"], None),
        result("C.Cam", &[], None),
        result("D.720p", &["720p"], None),
        result("E.1080p", &["1080p", "x264"], Some(2 * 1024 * 1024 * 1024)),
        result("F.4K", &["4K"], None),
    ];

    let streams = build_streams(&results, &matrix(), "http://play.test/");
    let names: Vec<_> = streams.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "NZB 1080p [Alpha]",
            "NZB 720p [Alpha]",
            "NZB 2160p [Alpha]",
            "NZB 4K [Alpha]",
            "NZB 480p [Alpha]",
            "NZB SD [Alpha]",
        ]
    );

    let best = &streams[0];
    assert_eq!(
        best.description,
        "📺 The Matrix\n🔍 Alpha\n🎥 Movies > HD\n📦 2.00 GB\n🎬 1080p x264"
    );
    assert_eq!(
        best.url,
        "http://play.test/play?nzb=https%3A%2F%2Findexer.test%2Fgetnzb%2FE.1080p.nzb"
    );
    assert!(best.behavior_hints.not_web_ready);
    assert_eq!(best.behavior_hints.filename, "E.1080p");
    assert_eq!(best.behavior_hints.video_size, Some(2 * 1024 * 1024 * 1024));
    assert_eq!(best.behavior_hints.binge_group, "org.nzbio|1080p|movies->-hd");

    let sd = streams.last().unwrap();
    assert!(!sd.description.contains("🎬"));
    assert_eq!(sd.behavior_hints.binge_group, "org.nzbio|sd|movies->-hd");
}

#[test]
fn test_stream_entry_serializes_camel_case() {
    let streams = build_streams(&[result("X.720p", &["720p"], None)], &matrix(), "http://h");
    let json = serde_json::to_value(&streams[0]).unwrap();
    assert_eq!(json["behaviorHints"]["notWebReady"], true);
    assert_eq!(json["behaviorHints"]["bingeGroup"], "org.nzbio|720p|movies->-hd");
    assert!(json["behaviorHints"].get("videoSize").is_none());
}

#[test]
fn test_addon_manifest_shape() {
    let json = serde_json::to_value(AddonManifest::default()).unwrap();
    assert_eq!(json["id"], ADDON_ID);
    assert_eq!(json["resources"], serde_json::json!(["stream"]));
    assert_eq!(json["types"], serde_json::json!(["movie", "series"]));
    assert_eq!(json["idPrefixes"], serde_json::json!(["tt"]));
    assert_eq!(json["behaviorHints"]["configurationRequired"], false);
}

// ===================================================================
// Indexer client against HTTP mocks
// ===================================================================

#[tokio::test]
async fn test_search_sends_newznab_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("apikey", "key-a"))
        .and(query_param("t", "search"))
        .and(query_param("q", "The Matrix 1999"))
        .and(query_param("extended", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[item(
            "The.Matrix.1999.1080p",
            "https://indexer.test/a.nzb",
            None,
            "",
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let indexer = IndexerConfig {
        name: "Alpha".to_string(),
        url: format!("{}/api", server.uri()),
        api_key: "key-a".to_string(),
    };
    let client = IndexerClient::new(reqwest::Client::new(), vec![indexer.clone()], search_config());

    let results = client.search(&indexer, "The Matrix 1999").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].quality, vec!["1080p"]);
}

#[tokio::test]
async fn test_search_all_tolerates_failing_indexer_and_dedups() {
    let server = MockServer::start().await;
    let date = recent();
    Mock::given(method("GET"))
        .and(path("/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
            item("Shared.Release.1080p", "https://a.test/1.nzb", Some(&date), ""),
            item("Alpha.Only.720p", "https://a.test/2.nzb", None, ""),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/beta"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
            item("shared.release.1080p", "https://b.test/1.nzb", Some(&date), ""),
            item(
                "Ancient.Release",
                "https://b.test/2.nzb",
                Some("Mon, 01 Jan 2001 00:00:00 +0000"),
                "",
            ),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let indexers = ["alpha", "beta", "broken"]
        .iter()
        .map(|name| IndexerConfig {
            name: name.to_string(),
            url: format!("{}/{}", server.uri(), name),
            api_key: "k".to_string(),
        })
        .collect();
    let client = IndexerClient::new(reqwest::Client::new(), indexers, search_config());

    let results = client.search_all("anything").await;
    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.title.as_str(), r.indexer.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("shared.release.1080p", "beta"),
            ("Alpha.Only.720p", "alpha"),
        ]
    );
}

#[tokio::test]
async fn test_search_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(feed(&[]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let indexer = IndexerConfig {
        name: "Slow".to_string(),
        url: server.uri(),
        api_key: "k".to_string(),
    };
    let client = IndexerClient::new(
        reqwest::Client::new(),
        vec![indexer.clone()],
        SearchConfig {
            retention_days: 365,
            timeout: Duration::from_millis(50),
        },
    );

    assert!(client.search(&indexer, "q").await.is_err());
    assert!(client.search_all("q").await.is_empty());
}

// ===================================================================
// Catalog end to end
// ===================================================================

async fn catalog_with(server: &MockServer) -> Catalog {
    let config = crate::config::Config {
        indexers: vec![IndexerConfig {
            name: "Alpha".to_string(),
            url: format!("{}/api", server.uri()),
            api_key: "k".to_string(),
        }],
        metadata: MetadataConfig {
            tmdb_api_key: Some("tmdb".to_string()),
            base_url: server.uri(),
            timeout: Duration::from_secs(2),
        },
        api: ApiConfig {
            public_url: Some("https://nzbio.example/".to_string()),
            ..Default::default()
        },
        search: search_config(),
        ..Default::default()
    };
    Catalog::new(reqwest::Client::new(), &config)
}

#[tokio::test]
async fn test_catalog_series_episode_flow() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/find/tt0903747"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tv_results": [{"id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("q", "Breaking Bad S02E05"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[item(
            "Breaking.Bad.S02E05.720p.HDTV",
            "https://a.test/bb.nzb",
            None,
            "<category>TV</category>",
        )])))
        .mount(&server)
        .await;

    let streams = catalog_with(&server)
        .await
        .streams(ContentKind::Series, "tt0903747:2:5")
        .await
        .unwrap();

    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].name, "NZB 720p [Alpha]");
    assert!(streams[0].url.starts_with("https://nzbio.example/play?nzb="));
    assert!(streams[0].description.starts_with("📺 Breaking Bad\n"));
}

#[tokio::test]
async fn test_catalog_unknown_title_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/find/tt0000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = catalog_with(&server)
        .await
        .streams(ContentKind::Movie, "tt0000000")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
