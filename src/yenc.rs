//! yEnc decoding for article bodies
//!
//! An article carries one part of a file framed as
//!
//! ```text
//! =ybegin part=1 total=3 line=128 size=2000000 name=movie.mkv
//! =ypart begin=1 end=768000
//! <encoded data lines>
//! =yend size=768000 part=1 pcrc32=0ab1c2d3
//! ```
//!
//! Decoding rule: `decoded = encoded - 42 (mod 256)`; after an escape byte `=`
//! the following byte is additionally reduced by 64. CR and LF only delimit
//! lines.
//!
//! Reference: http://www.yenc.org/yenc-draft.1.3.txt

use crate::error::YencError;
use bytes::Bytes;

/// One decoded article
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedPart {
    /// Original filename from `=ybegin name=`
    pub name: String,
    /// Part number for multi-part posts
    pub part: Option<u32>,
    /// Total parts for multi-part posts
    pub total: Option<u32>,
    /// Size of the whole file from `=ybegin size=`
    pub file_size: u64,
    /// 1-based inclusive byte range from `=ypart`
    pub range: Option<(u64, u64)>,
    /// CRC32 of `data`
    pub crc32: u32,
    /// Decoded bytes
    pub data: Bytes,
}

impl DecodedPart {
    /// Whether the article is one part of a larger file
    pub fn is_multipart(&self) -> bool {
        self.part.is_some() || self.range.is_some()
    }
}

/// Decode a yEnc article body.
///
/// Lines before `=ybegin` (article headers, blank separator) are skipped.
/// Integrity is enforced against the trailer: the decoded length must equal
/// `size`, and the checksum must match `pcrc32`, or `crc32` when the article
/// is a single-part post.
///
/// The input must already be free of NNTP dot-stuffing; a data line that
/// starts with `..` decodes both dots.
pub fn decode(article: &[u8]) -> Result<DecodedPart, YencError> {
    let framed = ybegin_offset(article)
        .map(|at| &article[at..])
        .ok_or_else(|| YencError::Frame("missing =ybegin header".into()))?;

    let decoded = nntp_rs::yenc_decode(framed).map_err(frame_error)?;

    let range = decoded.part.as_ref().map(|p| (p.begin, p.end));
    if let Some((begin, end)) = range
        && (begin == 0 || end < begin)
    {
        return Err(YencError::Frame(format!(
            "=ypart has an invalid range {}-{}",
            begin, end
        )));
    }

    let actual = decoded.data.len() as u64;
    if decoded.trailer.size != actual {
        return Err(YencError::SizeMismatch {
            expected: decoded.trailer.size,
            actual,
        });
    }

    // A multi-part trailer's crc32 covers the whole file, not this part
    let multipart = decoded.header.part.is_some() || range.is_some();
    let expected = decoded
        .trailer
        .pcrc32
        .or(if multipart { None } else { decoded.trailer.crc32 });
    if let Some(expected) = expected
        && expected != decoded.calculated_crc32
    {
        return Err(YencError::ChecksumMismatch {
            expected,
            actual: decoded.calculated_crc32,
        });
    }

    Ok(DecodedPart {
        name: full_name(framed).unwrap_or(decoded.header.name),
        part: decoded.header.part,
        total: decoded.header.total,
        file_size: decoded.header.size,
        range,
        crc32: decoded.calculated_crc32,
        data: Bytes::from(decoded.data),
    })
}

fn ybegin_offset(article: &[u8]) -> Option<usize> {
    if article.starts_with(b"=ybegin ") {
        return Some(0);
    }
    article
        .windows(b"\n=ybegin ".len())
        .position(|w| w == b"\n=ybegin ")
        .map(|at| at + 1)
}

fn frame_error(err: nntp_rs::NntpError) -> YencError {
    match err {
        nntp_rs::NntpError::InvalidResponse(reason) => YencError::Frame(reason),
        other => YencError::Frame(other.to_string()),
    }
}

/// `name=` runs to the end of the `=ybegin` line; filenames may contain spaces
fn full_name(framed: &[u8]) -> Option<String> {
    let line = framed.split(|&b| b == b'\n').next()?;
    let line = std::str::from_utf8(line).ok()?.trim_end_matches('\r');
    let at = line.find(" name=")?;
    Some(line[at + " name=".len()..].trim_end().to_string())
}
