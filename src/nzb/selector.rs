use super::{FileEntry, Manifest};
use crate::error::ManifestError;

/// Choose the payload file: the entry with the largest declared size.
///
/// Ties go to the earliest entry in manifest order. Entries without segments
/// are never chosen.
pub fn select_payload(manifest: &Manifest) -> Result<&FileEntry, ManifestError> {
    let mut best: Option<(&FileEntry, u64)> = None;

    for file in manifest.files.iter().filter(|f| !f.segments.is_empty()) {
        let total = file.declared_bytes();
        if best.is_none_or(|(_, best_total)| total > best_total) {
            best = Some((file, total));
        }
    }

    best.map(|(file, _)| file)
        .ok_or(ManifestError::NoPayloadFound)
}
