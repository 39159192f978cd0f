// Record store scanning: every holder row for a person, plus the
// candidate URLs those rows point at.

use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::error::PortraitError;
use crate::traits::{bounded, RecordStore};
use crate::types::{HolderKind, HolderRow};

/// What one pass over all holder types found.
#[derive(Debug, Default)]
pub struct RecordScan {
    /// Every holder row that could be read, across all holder types.
    pub rows: Vec<HolderRow>,
    /// Distinct non-empty URLs, newest first; at most one per holder type.
    pub candidates: Vec<String>,
    /// Holder types that could not be read.
    pub failures: Vec<(HolderKind, PortraitError)>,
}

/// Read every holder type for `identities` concurrently.
pub async fn scan_holders(
    records: &dyn RecordStore,
    identities: &[String],
    timeout: Duration,
) -> RecordScan {
    let reads = HolderKind::ALL.iter().map(|&kind| async move {
        let what = format!("{kind} read");
        (kind, bounded(timeout, &what, records.holders(kind, identities)).await)
    });

    let mut scan = RecordScan::default();
    let mut newest: Vec<HolderRow> = Vec::new();

    for (kind, result) in join_all(reads).await {
        match result {
            Ok(mut rows) => {
                sort_newest_first(&mut rows);
                if let Some(row) = rows.iter().find(|r| r.candidate().is_some()) {
                    newest.push(row.clone());
                }
                scan.rows.extend(rows);
            }
            Err(e) => {
                warn!(holder = %kind, error = %e, "Holder read failed");
                scan.failures.push((
                    kind,
                    PortraitError::RecordRead {
                        holder: kind,
                        message: e.to_string(),
                    },
                ));
            }
        }
    }

    sort_newest_first(&mut newest);
    for row in &newest {
        if let Some(url) = row.candidate() {
            if !scan.candidates.iter().any(|c| c == url) {
                scan.candidates.push(url.to_string());
            }
        }
    }

    scan
}

/// Rows without a timestamp sort last.
fn sort_newest_first(rows: &mut [HolderRow]) {
    rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
