//! NZB fixtures and yEnc article generators

/// Minimal valid NZB (single segment, no namespace)
pub const MINIMAL_NZB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nzb>
  <file poster="test@example.com" date="1234567890" subject="clip.mp4 (1/1)">
    <groups>
      <group>alt.test</group>
    </groups>
    <segments>
      <segment bytes="100" number="1">clip-part1@example.com</segment>
    </segments>
  </file>
</nzb>"#;

/// A typical release: video payload, a parity file and an info file
///
/// Segments of the video are listed out of order on purpose.
pub const RELEASE_NZB: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="title">Some.Movie.2023.1080p.WEB-DL</meta>
    <meta type="password">hunter2</meta>
  </head>
  <file poster="poster@example.com" date="1700000000" subject="[01/03] - &quot;Some.Movie.2023.1080p.WEB-DL.nfo&quot; yEnc (1/1)">
    <groups>
      <group>alt.binaries.movies</group>
    </groups>
    <segments>
      <segment bytes="2048" number="1">nfo-1@example.com</segment>
    </segments>
  </file>
  <file poster="poster@example.com" date="1700000000" subject="[02/03] - &quot;Some.Movie.2023.1080p.WEB-DL.mkv&quot; yEnc (1/3)">
    <groups>
      <group>alt.binaries.movies</group>
      <group>alt.binaries.hdtv</group>
    </groups>
    <segments>
      <segment bytes="768000" number="3">mkv-3@example.com</segment>
      <segment bytes="768000" number="1">mkv-1@example.com</segment>
      <segment bytes="768000" number="2">mkv-2@example.com</segment>
    </segments>
  </file>
  <file poster="poster@example.com" date="1700000000" subject="[03/03] - &quot;Some.Movie.2023.1080p.WEB-DL.par2&quot; yEnc (1/1)">
    <groups>
      <group>alt.binaries.movies</group>
    </groups>
    <segments>
      <segment bytes="40960" number="1">par2-1@example.com</segment>
    </segments>
  </file>
</nzb>"#;

/// Generate an NZB with one file from `(message_id, size_bytes)` pairs
pub fn create_nzb_from_segments(filename: &str, group: &str, segments: &[(String, u64)]) -> String {
    let mut segments_xml = String::new();
    for (i, (message_id, size)) in segments.iter().enumerate() {
        segments_xml.push_str(&format!(
            "      <segment bytes=\"{}\" number=\"{}\">{}</segment>\n",
            size,
            i + 1,
            message_id
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="test@example.com" date="{}" subject="&quot;{}&quot; yEnc (1/{})">
    <groups>
      <group>{}</group>
    </groups>
    <segments>
{}    </segments>
  </file>
</nzb>"#,
        chrono::Utc::now().timestamp(),
        filename,
        segments.len(),
        group,
        segments_xml
    )
}

/// Deterministic test bytes covering every byte value
pub fn test_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + i / 256) as u8).collect()
}

/// Encode `data` as a yEnc article body with a CRC32 trailer.
///
/// `part` is `(number, total, begin, file_size)` for multi-part posts,
/// with `begin` 1-based.
pub fn yenc_article(data: &[u8], name: &str, part: Option<(u32, u32, u64, u64)>) -> Vec<u8> {
    let part = part.map(|(number, total, begin, file_size)| {
        (number, total, begin, begin + data.len() as u64 - 1, file_size)
    });
    nntp_rs::yenc_encode(data, name, 128, part).expect("line length within 1..=997")
}
