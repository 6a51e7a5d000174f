//! Streaming NZB parser built on `quick-xml`.

use super::{FileEntry, Manifest, MetaEntry, SegmentRef};
use crate::config::StreamConfig;
use crate::error::ManifestError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use std::borrow::Cow;

/// Size limits applied while parsing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManifestLimits {
    /// Maximum document size in bytes
    pub max_bytes: usize,
    /// Maximum `<segment>` elements in one `<file>`
    pub max_segments_per_file: usize,
}

impl Default for ManifestLimits {
    fn default() -> Self {
        StreamConfig::default().into()
    }
}

impl From<StreamConfig> for ManifestLimits {
    fn from(config: StreamConfig) -> Self {
        Self {
            max_bytes: config.max_manifest_bytes,
            max_segments_per_file: config.max_segments_per_file,
        }
    }
}

impl From<&StreamConfig> for ManifestLimits {
    fn from(config: &StreamConfig) -> Self {
        Self {
            max_bytes: config.max_manifest_bytes,
            max_segments_per_file: config.max_segments_per_file,
        }
    }
}

/// Parse an NZB document.
///
/// Element names are matched by local name, so namespaced and
/// un-namespaced documents parse the same. Segments come back sorted by
/// number; a repeated number keeps its first occurrence.
pub fn parse_manifest(bytes: &[u8], limits: ManifestLimits) -> Result<Manifest, ManifestError> {
    if bytes.len() > limits.max_bytes {
        return Err(ManifestError::TooLarge {
            what: "document bytes",
            limit: limits.max_bytes,
            actual: bytes.len(),
        });
    }

    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut state = ParseState::default();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ManifestError::Malformed(format!(
                "XML error at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            XmlEvent::Start(e) => state.open(&e, false, limits)?,
            XmlEvent::Empty(e) => state.open(&e, true, limits)?,
            XmlEvent::End(e) => state.close(e.local_name().as_ref(), limits)?,
            XmlEvent::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ManifestError::Malformed(format!("bad text content: {}", e)))?;
                state.text(&text);
            }
            XmlEvent::CData(c) => {
                let raw = c.into_inner();
                state.text(&String::from_utf8_lossy(&raw));
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    state.finish()
}

#[derive(Default)]
struct ParseState {
    root: RootState,
    in_head: bool,
    meta: Option<MetaEntry>,
    file: Option<FileEntry>,
    group: Option<String>,
    segment: Option<PendingSegment>,
    manifest: Manifest,
}

#[derive(Default, PartialEq, Eq)]
enum RootState {
    #[default]
    NotSeen,
    Open,
    Closed,
}

struct PendingSegment {
    number: u32,
    bytes: u64,
    text: String,
}

impl ParseState {
    fn open(
        &mut self,
        element: &BytesStart<'_>,
        self_closing: bool,
        limits: ManifestLimits,
    ) -> Result<(), ManifestError> {
        let name = element.local_name();
        let name = name.as_ref();

        match self.root {
            RootState::NotSeen => {
                if name != b"nzb" {
                    return Err(ManifestError::Malformed(format!(
                        "root element is <{}>, expected <nzb>",
                        String::from_utf8_lossy(name)
                    )));
                }
                self.root = if self_closing {
                    RootState::Closed
                } else {
                    RootState::Open
                };
                return Ok(());
            }
            RootState::Closed => {
                return Err(ManifestError::Malformed(
                    "content after closing </nzb>".into(),
                ));
            }
            RootState::Open => {}
        }

        match name {
            b"head" if self.file.is_none() => self.in_head = !self_closing,
            b"meta" if self.in_head => {
                let kind = attribute(element, b"type")?.unwrap_or_default();
                let entry = MetaEntry {
                    kind: kind.into_owned(),
                    value: String::new(),
                };
                if self_closing {
                    self.manifest.meta.push(entry);
                } else {
                    self.meta = Some(entry);
                }
            }
            b"file" => {
                if self.file.is_some() {
                    return Err(ManifestError::Malformed("nested <file> element".into()));
                }
                let file = FileEntry {
                    poster: attribute(element, b"poster")?
                        .map(Cow::into_owned)
                        .unwrap_or_default(),
                    subject: attribute(element, b"subject")?
                        .map(Cow::into_owned)
                        .unwrap_or_default(),
                    date: attribute(element, b"date")?.and_then(|d| d.trim().parse().ok()),
                    groups: Vec::new(),
                    segments: Vec::new(),
                };
                self.file = Some(file);
                if self_closing {
                    self.close(b"file", limits)?;
                }
            }
            b"group" if self.file.is_some() && !self_closing => {
                self.group = Some(String::new());
            }
            b"segment" if self.file.is_some() => {
                let number = attribute(element, b"number")?
                    .and_then(|n| n.trim().parse::<u32>().ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        ManifestError::Malformed(
                            "segment without a valid positive number".into(),
                        )
                    })?;
                let bytes = attribute(element, b"bytes")?
                    .and_then(|b| b.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                if self_closing {
                    return Err(ManifestError::Malformed(format!(
                        "segment {} has an empty message id",
                        number
                    )));
                }
                self.segment = Some(PendingSegment {
                    number,
                    bytes,
                    text: String::new(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(segment) = self.segment.as_mut() {
            segment.text.push_str(text);
        } else if let Some(group) = self.group.as_mut() {
            group.push_str(text);
        } else if let Some(meta) = self.meta.as_mut() {
            meta.value.push_str(text);
        }
    }

    fn close(&mut self, name: &[u8], limits: ManifestLimits) -> Result<(), ManifestError> {
        match name {
            b"nzb" if self.root == RootState::Open => {
                if self.file.is_some() {
                    return Err(ManifestError::Malformed("unclosed <file> element".into()));
                }
                self.root = RootState::Closed;
            }
            b"head" => self.in_head = false,
            b"meta" => {
                if let Some(mut meta) = self.meta.take() {
                    meta.value = meta.value.trim().to_string();
                    self.manifest.meta.push(meta);
                }
            }
            b"group" => {
                if let Some(group) = self.group.take()
                    && let Some(file) = self.file.as_mut()
                {
                    let group = group.trim();
                    if !group.is_empty() {
                        file.groups.push(group.to_string());
                    }
                }
            }
            b"segment" => {
                if let Some(segment) = self.segment.take()
                    && let Some(file) = self.file.as_mut()
                {
                    let message_id = normalize_message_id(&segment.text);
                    if message_id.is_empty() {
                        return Err(ManifestError::Malformed(format!(
                            "segment {} has an empty message id",
                            segment.number
                        )));
                    }
                    file.segments.push(SegmentRef {
                        number: segment.number,
                        bytes: segment.bytes,
                        message_id,
                    });
                }
            }
            b"file" => {
                if let Some(file) = self.file.take() {
                    let file = finish_file(file, limits)?;
                    self.manifest.files.push(file);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<Manifest, ManifestError> {
        match self.root {
            RootState::Closed => Ok(self.manifest),
            RootState::NotSeen => Err(ManifestError::Malformed("document has no root element".into())),
            RootState::Open => Err(ManifestError::Malformed("unexpected end of document".into())),
        }
    }
}

fn finish_file(mut file: FileEntry, limits: ManifestLimits) -> Result<FileEntry, ManifestError> {
    if file.segments.is_empty() {
        return Err(ManifestError::Malformed(format!(
            "file '{}' has no segments",
            file.subject
        )));
    }
    if file.segments.len() > limits.max_segments_per_file {
        return Err(ManifestError::TooLarge {
            what: "segments per file",
            limit: limits.max_segments_per_file,
            actual: file.segments.len(),
        });
    }

    let declared = file.segments.len();
    file.segments.sort_by_key(|s| s.number);
    file.segments.dedup_by_key(|s| s.number);
    if file.segments.len() != declared {
        tracing::debug!(
            subject = %file.subject,
            dropped = declared - file.segments.len(),
            "dropped duplicate segment numbers"
        );
    }
    Ok(file)
}

fn attribute<'a>(
    element: &'a BytesStart<'_>,
    wanted: &[u8],
) -> Result<Option<Cow<'a, str>>, ManifestError> {
    for attr in element.attributes() {
        let attr =
            attr.map_err(|e| ManifestError::Malformed(format!("bad attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == wanted {
            let value = attr
                .unescape_value()
                .map_err(|e| ManifestError::Malformed(format!("bad attribute value: {}", e)))?;
            return Ok(Some(Cow::Owned(value.into_owned())));
        }
    }
    Ok(None)
}

fn normalize_message_id(raw: &str) -> String {
    let id = raw.trim();
    let id = id.strip_prefix('<').unwrap_or(id);
    let id = id.strip_suffix('>').unwrap_or(id);
    id.trim().to_string()
}
