use super::Metadata;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Kind of catalog item a stream is requested for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// A feature film
    Movie,
    /// A TV series episode
    Series,
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "movie" => Ok(ContentKind::Movie),
            "series" => Ok(ContentKind::Series),
            other => Err(Error::InvalidRequest(format!(
                "unsupported content type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Movie => f.write_str("movie"),
            ContentKind::Series => f.write_str("series"),
        }
    }
}

/// Season and episode of a series request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Episode {
    /// Season number
    pub season: u32,
    /// Episode number within the season
    pub episode: u32,
}

/// A parsed catalog identifier: `tt1234567` or `tt1234567:1:2`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentId {
    /// Movie or series
    pub kind: ContentKind,
    /// IMDb identifier, always starting with `tt`
    pub imdb_id: String,
    /// Present for series requests
    pub episode: Option<Episode>,
}

impl ContentId {
    /// Parse a raw (possibly percent-encoded) identifier for `kind`
    pub fn parse(kind: ContentKind, raw: &str) -> Result<Self> {
        let decoded = urlencoding::decode(raw)
            .map_err(|e| Error::InvalidRequest(format!("invalid content id encoding: {}", e)))?;

        let (imdb_id, episode) = match kind {
            ContentKind::Series if decoded.contains(':') => {
                let mut parts = decoded.split(':');
                let imdb_id = parts.next().unwrap_or_default();
                let season = parse_number(parts.next(), "season")?;
                let episode = parse_number(parts.next(), "episode")?;
                (imdb_id.to_string(), Some(Episode { season, episode }))
            }
            ContentKind::Series => {
                return Err(Error::InvalidRequest(format!(
                    "series id '{}' is missing season and episode",
                    decoded
                )));
            }
            ContentKind::Movie => (decoded.into_owned(), None),
        };

        if !imdb_id.starts_with("tt") || imdb_id.len() <= 2 {
            return Err(Error::InvalidRequest(format!(
                "'{}' is not an IMDb id",
                imdb_id
            )));
        }

        Ok(Self {
            kind,
            imdb_id,
            episode,
        })
    }

    /// Indexer search string for this item
    ///
    /// Movies search as `"{title} {year}"`, episodes as `"{title} S01E02"`.
    pub fn search_query(&self, metadata: &Metadata) -> String {
        match (self.episode, metadata.year) {
            (Some(ep), _) => format!("{} S{:02}E{:02}", metadata.title, ep.season, ep.episode),
            (None, Some(year)) => format!("{} {}", metadata.title, year),
            (None, None) => metadata.title.clone(),
        }
    }
}

fn parse_number(part: Option<&str>, what: &str) -> Result<u32> {
    part.and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| Error::InvalidRequest(format!("invalid {} number", what)))
}
