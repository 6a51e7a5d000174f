//! NZB manifests: parsing, payload selection and retrieval by URL.
//!
//! A manifest lists the Usenet articles that make up one or more files. The
//! streaming pipeline serves exactly one of those files, the payload, chosen
//! by [`select_payload`].

mod fetch;
mod parser;
mod selector;

pub use fetch::fetch_nzb;
pub use parser::{ManifestLimits, parse_manifest};
pub use selector::select_payload;

use serde::{Deserialize, Serialize};

/// A parsed NZB document. Immutable after parsing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// `<head><meta type="...">` entries in document order
    pub meta: Vec<MetaEntry>,
    /// File entries in document order
    pub files: Vec<FileEntry>,
}

impl Manifest {
    /// First meta value of the given type (`title`, `password`, `category`, ...)
    pub fn meta(&self, kind: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.kind.eq_ignore_ascii_case(kind))
            .map(|m| m.value.as_str())
    }

    /// Release title from `<meta type="title">`
    pub fn title(&self) -> Option<&str> {
        self.meta("title")
    }

    /// Archive password from `<meta type="password">`
    pub fn password(&self) -> Option<&str> {
        self.meta("password")
    }
}

/// One `<meta>` entry from the manifest head
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    /// The `type` attribute
    pub kind: String,
    /// Element text
    pub value: String,
}

/// One `<file>` element
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// `poster` attribute, empty when absent
    pub poster: String,
    /// `subject` attribute, empty when absent
    pub subject: String,
    /// `date` attribute as unix seconds
    pub date: Option<i64>,
    /// Newsgroups the file was posted to
    pub groups: Vec<String>,
    /// Segments sorted by number, unique by number
    pub segments: Vec<SegmentRef>,
}

impl FileEntry {
    /// Sum of declared segment sizes (advisory; yEnc overhead included)
    pub fn declared_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes).sum()
    }

    /// Filename from the subject line, if it carries one in quotes.
    ///
    /// Usenet subjects typically look like
    /// `Some.Movie.2024 [01/50] - "Some.Movie.2024.mkv" yEnc (1/100)`.
    pub fn filename(&self) -> Option<&str> {
        let start = self.subject.find('"')?;
        let rest = &self.subject[start + 1..];
        let end = rest.find('"')?;
        let name = &rest[..end];
        (!name.is_empty()).then_some(name)
    }
}

/// One `<segment>` element
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentRef {
    /// 1-based sequence number
    pub number: u32,
    /// Declared encoded size in bytes (advisory, 0 when absent)
    pub bytes: u64,
    /// Message ID without angle brackets
    pub message_id: String,
}

impl SegmentRef {
    /// Message ID in the `<...>` form NNTP commands expect
    pub fn bracketed_id(&self) -> String {
        format!("<{}>", self.message_id)
    }
}
