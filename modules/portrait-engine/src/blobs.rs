// Blob directory scanning and candidate ranking.
//
// Ranking, best first:
//   1. canonical `profile.<ext>` files
//   2. legacy numeric-timestamp files, newest (largest number) first
//   3. any other image file, most recently uploaded first

use std::cmp::Ordering;
use std::time::Duration;

use crate::error::PortraitError;
use crate::traits::{bounded, BlobStore};
use crate::types::BlobObject;

/// Stem of every canonical filename.
pub const CANONICAL_STEM: &str = "profile";

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "avif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRank {
    Canonical,
    Timestamp(u128),
    Other,
}

impl FileRank {
    fn tier(&self) -> u8 {
        match self {
            FileRank::Canonical => 0,
            FileRank::Timestamp(_) => 1,
            FileRank::Other => 2,
        }
    }
}

/// Rank a filename, or `None` if it is not a supported image.
pub fn classify(filename: &str) -> Option<FileRank> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if stem.is_empty() || !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }

    if stem.eq_ignore_ascii_case(CANONICAL_STEM) {
        return Some(FileRank::Canonical);
    }
    if stem.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(ts) = stem.parse::<u128>() {
            return Some(FileRank::Timestamp(ts));
        }
    }
    Some(FileRank::Other)
}

pub fn is_canonical(filename: &str) -> bool {
    classify(filename) == Some(FileRank::Canonical)
}

/// Drop non-images and order the rest best-first.
pub fn rank_candidates(objects: Vec<BlobObject>) -> Vec<BlobObject> {
    let mut ranked: Vec<(FileRank, BlobObject)> = objects
        .into_iter()
        .filter_map(|o| classify(&o.filename).map(|rank| (rank, o)))
        .collect();

    ranked.sort_by(|(ra, a), (rb, b)| compare(*ra, a, *rb, b));
    ranked.into_iter().map(|(_, o)| o).collect()
}

fn compare(ra: FileRank, a: &BlobObject, rb: FileRank, b: &BlobObject) -> Ordering {
    ra.tier()
        .cmp(&rb.tier())
        .then_with(|| match (ra, rb) {
            (FileRank::Timestamp(x), FileRank::Timestamp(y)) => y.cmp(&x),
            _ => Ordering::Equal,
        })
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.filename.cmp(&b.filename))
}

/// List and rank one owner directory.
pub async fn scan_owner(
    blobs: &dyn BlobStore,
    owner_key: &str,
    timeout: Duration,
) -> Result<Vec<BlobObject>, PortraitError> {
    let listed = bounded(timeout, "storage list", blobs.list(owner_key))
        .await
        .map_err(|e| PortraitError::StorageList {
            owner_key: owner_key.to_string(),
            message: e.to_string(),
        })?;
    Ok(rank_candidates(listed))
}
