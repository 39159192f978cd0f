// Garbage collection of superseded objects under one owner key.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::blobs::is_canonical;
use crate::error::PortraitError;
use crate::traits::{bounded, BlobStore};
use crate::types::{BlobObject, CleanupReport};

/// Filenames to keep when the caller gave no allow-list.
///
/// The object the records now point at is kept. A directory that does not
/// host it keeps its canonical files, so the only curated copy of an image
/// is never collected on a guess.
pub fn default_keep(
    owner_key: &str,
    listed: &[BlobObject],
    in_use: Option<&(String, String)>,
) -> HashSet<String> {
    match in_use {
        Some((owner, filename)) if owner == owner_key => HashSet::from([filename.clone()]),
        _ => listed
            .iter()
            .filter(|o| is_canonical(&o.filename))
            .map(|o| o.filename.clone())
            .collect(),
    }
}

/// Store bookkeeping entries such as `.emptyFolderPlaceholder` are not ours to delete.
fn is_bookkeeping(filename: &str) -> bool {
    filename.starts_with('.')
}

/// Delete every object under `owner_key` whose filename is not in `keep`.
/// An empty directory, or one with nothing extra, is a successful no-op.
pub async fn collect(
    blobs: &dyn BlobStore,
    owner_key: &str,
    listed: Vec<BlobObject>,
    keep: &HashSet<String>,
    timeout: Duration,
    concurrency: usize,
) -> CleanupReport {
    let doomed: Vec<String> = listed
        .into_iter()
        .filter(|o| !keep.contains(&o.filename) && !is_bookkeeping(&o.filename))
        .map(|o| o.path())
        .collect();

    if doomed.is_empty() {
        return CleanupReport::default();
    }

    let results: Vec<(String, anyhow::Result<()>)> = stream::iter(doomed)
        .map(|path| async move {
            let result = bounded(timeout, "storage delete", blobs.delete(&path)).await;
            (path, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = CleanupReport::default();
    for (path, result) in results {
        match result {
            Ok(()) => report.deleted_count += 1,
            Err(e) => {
                let err = PortraitError::StorageDelete {
                    path: path.clone(),
                    message: e.to_string(),
                };
                warn!(error = %err, "Delete failed");
                report.failed.push(path);
            }
        }
    }
    report.failed.sort();

    info!(
        owner_key,
        deleted = report.deleted_count,
        failed = report.failed.len(),
        "Garbage collected"
    );
    report
}

/// List `owner_key` and collect it. Listing failure is returned to the caller.
pub async fn collect_owner(
    blobs: &dyn BlobStore,
    owner_key: &str,
    keep: Option<&HashSet<String>>,
    in_use: Option<&(String, String)>,
    timeout: Duration,
    concurrency: usize,
) -> Result<CleanupReport, PortraitError> {
    let listed = bounded(timeout, "storage list", blobs.list(owner_key))
        .await
        .map_err(|e| PortraitError::StorageList {
            owner_key: owner_key.to_string(),
            message: e.to_string(),
        })?;

    let mut keep_set = match keep {
        Some(k) => k.clone(),
        None => default_keep(owner_key, &listed, in_use),
    };
    // Never collect the object the records were just pointed at.
    if let Some((owner, filename)) = in_use {
        if owner == owner_key {
            keep_set.insert(filename.clone());
        }
    }

    Ok(collect(blobs, owner_key, listed, &keep_set, timeout, concurrency).await)
}
