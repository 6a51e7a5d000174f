use super::ContentKind;
use crate::config::MetadataConfig;
use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

/// Title information resolved from an IMDb id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// TMDB identifier
    pub tmdb_id: u64,
    /// Display title
    pub title: String,
    /// Release (or first air) year, when known
    pub year: Option<i32>,
    /// Whether TMDB knows this as a movie or a series
    pub kind: ContentKind,
}

#[derive(Debug, Default, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<MovieResult>,
    #[serde(default)]
    tv_results: Vec<TvResult>,
}

#[derive(Debug, Deserialize)]
struct MovieResult {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvResult {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    first_air_date: Option<String>,
}

/// TMDB `find` client
#[derive(Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    config: MetadataConfig,
}

impl MetadataClient {
    /// Create a client sharing `http`
    pub fn new(http: reqwest::Client, config: MetadataConfig) -> Self {
        Self { http, config }
    }

    /// Resolve `imdb_id` to a title.
    ///
    /// Movie matches win over series matches. Returns `Ok(None)` when TMDB
    /// knows nothing about the id.
    pub async fn lookup(&self, imdb_id: &str) -> Result<Option<Metadata>> {
        let api_key = self
            .config
            .tmdb_api_key
            .as_deref()
            .ok_or_else(|| Error::Config {
                message: "no TMDB API key configured".to_string(),
                key: Some("metadata.tmdb_api_key".to_string()),
            })?;

        let url = format!(
            "{}/find/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(imdb_id)
        );
        tracing::debug!(imdb_id, "looking up TMDB metadata");

        let response: FindResponse = self
            .http
            .get(&url)
            .query(&[("api_key", api_key), ("external_source", "imdb_id")])
            .timeout(self.config.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let metadata = if let Some(movie) = response.movie_results.into_iter().next() {
            Some(Metadata {
                tmdb_id: movie.id,
                title: movie.title,
                year: year_of(movie.release_date.as_deref()),
                kind: ContentKind::Movie,
            })
        } else {
            response.tv_results.into_iter().next().map(|show| Metadata {
                tmdb_id: show.id,
                title: show.name,
                year: year_of(show.first_air_date.as_deref()),
                kind: ContentKind::Series,
            })
        };

        match &metadata {
            Some(m) => tracing::debug!(imdb_id, title = %m.title, year = ?m.year, "TMDB match"),
            None => tracing::debug!(imdb_id, "no TMDB match"),
        }
        Ok(metadata)
    }
}

fn year_of(date: Option<&str>) -> Option<i32> {
    let date = date?.trim();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.year())
        .ok()
}
