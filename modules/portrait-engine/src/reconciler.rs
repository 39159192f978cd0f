// Propagation of a resolved URL to every holder row.
//
// All writes are issued at once and every one is awaited; a failed write is
// reported for its row and never stops the others.

use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::PortraitError;
use crate::traits::{bounded, RecordStore};
use crate::types::{HolderKind, HolderOutcome, HolderRow, HolderStatus};

pub async fn propagate(
    records: &dyn RecordStore,
    url: &str,
    rows: &[HolderRow],
    unreadable: &[HolderKind],
    timeout: Duration,
) -> Vec<HolderOutcome> {
    let writes = rows.iter().map(|row| async move {
        let location = &row.location;
        if row.candidate() == Some(url) {
            return HolderOutcome {
                kind: location.kind,
                row_id: Some(location.row_id.clone()),
                status: HolderStatus::Unchanged,
                error: None,
            };
        }

        match bounded(timeout, "holder write", records.write_image_url(location, url)).await {
            Ok(()) => {
                info!(holder = %location.kind, row_id = %location.row_id, "Holder updated");
                HolderOutcome {
                    kind: location.kind,
                    row_id: Some(location.row_id.clone()),
                    status: HolderStatus::Updated,
                    error: None,
                }
            }
            Err(e) => {
                let err = PortraitError::RecordWrite {
                    holder: location.kind,
                    row_id: location.row_id.clone(),
                    message: e.to_string(),
                };
                warn!(error = %err, "Holder write failed");
                HolderOutcome {
                    kind: location.kind,
                    row_id: Some(location.row_id.clone()),
                    status: HolderStatus::Failed,
                    error: Some(err.to_string()),
                }
            }
        }
    });

    let mut outcomes = join_all(writes).await;

    // Holder types we could not read still count against the run.
    outcomes.extend(unreadable.iter().map(|&kind| HolderOutcome {
        kind,
        row_id: None,
        status: HolderStatus::Failed,
        error: Some(format!("{kind} records could not be read")),
    }));

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRecordStore;
    use crate::types::HolderLocation;
    use chrono::Utc;

    const T: Duration = Duration::from_secs(1);

    fn row(kind: HolderKind, id: &str, url: Option<&str>) -> HolderRow {
        HolderRow {
            location: HolderLocation {
                kind,
                row_id: id.to_string(),
            },
            image_url: url.map(String::from),
            updated_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn writes_every_row_that_disagrees() {
        let store = MockRecordStore::new();
        let rows = vec![
            row(HolderKind::Account, "a1", Some("https://x/old.png")),
            row(HolderKind::PublicProfile, "p1", None),
            row(HolderKind::PublicProfile, "p2", Some("https://x/new.png")),
        ];

        let outcomes = propagate(&store, "https://x/new.png", &rows, &[], T).await;

        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![HolderStatus::Updated, HolderStatus::Updated, HolderStatus::Unchanged]
        );
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn one_failed_write_does_not_block_the_rest() {
        let store = MockRecordStore::new().failing_write("a1");
        let rows = vec![
            row(HolderKind::Account, "a1", None),
            row(HolderKind::PublicProfile, "p1", None),
        ];

        let outcomes = propagate(&store, "https://x/new.png", &rows, &[], T).await;

        assert_eq!(outcomes[0].status, HolderStatus::Failed);
        assert!(outcomes[0].error.as_deref().unwrap().contains("a1"));
        assert_eq!(outcomes[1].status, HolderStatus::Updated);
    }

    #[tokio::test]
    async fn unreadable_holder_types_are_reported_failed() {
        let store = MockRecordStore::new();
        let outcomes =
            propagate(&store, "https://x/new.png", &[], &[HolderKind::Account], T).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].row_id, None);
        assert_eq!(outcomes[0].status, HolderStatus::Failed);
    }
}
