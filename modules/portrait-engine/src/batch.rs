// Population-wide cleanup: resolve, propagate and collect for every person,
// a bounded number at a time. One person failing never stops the batch.

use futures::stream::{self, StreamExt};
use tracing::{info, info_span, warn, Instrument};

use crate::engine::PortraitEngine;
use crate::error::{PortraitError, Result};
use crate::traits::bounded;
use crate::types::{BatchReport, IdentityLink, PersonIdentity};

/// How one person's run ended.
#[derive(Debug)]
enum PersonOutcome {
    Clean { deleted: u64 },
    Partial { deleted: u64 },
    Failed,
}

impl PortraitEngine {
    /// Run the full per-person flow for everyone in the record store.
    pub async fn batch_cleanup(&self) -> Result<BatchReport> {
        let people = bounded(
            self.settings().io_timeout,
            "people listing",
            self.records().list_people(),
        )
        .await
        .map_err(|e| PortraitError::Enumeration(e.to_string()))?;

        info!(
            people = people.len(),
            concurrency = self.settings().batch_concurrency,
            "Starting batch cleanup"
        );

        let outcomes: Vec<PersonOutcome> = stream::iter(people)
            .map(|link| self.run_one(link))
            .buffer_unordered(self.settings().batch_concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for outcome in outcomes {
            report.processed += 1;
            match outcome {
                PersonOutcome::Clean { deleted } => {
                    report.succeeded += 1;
                    report.deleted_object_count += deleted;
                }
                PersonOutcome::Partial { deleted } => {
                    report.failed += 1;
                    report.deleted_object_count += deleted;
                }
                PersonOutcome::Failed => report.failed += 1,
            }
        }

        info!("Batch cleanup complete. {report}");
        Ok(report)
    }

    async fn run_one(&self, link: IdentityLink) -> PersonOutcome {
        let raw = link.record_identity.clone();
        let span = info_span!("person", identity = %raw);
        let person = PersonIdentity::from_link(&raw, link);

        match self.cleanup_person(person, None).instrument(span).await {
            Ok((reconciliation, cleanup)) => {
                let deleted = cleanup.deleted_count;
                if reconciliation.is_partial_failure() || !cleanup.failed.is_empty() {
                    PersonOutcome::Partial { deleted }
                } else {
                    PersonOutcome::Clean { deleted }
                }
            }
            Err(e) => {
                warn!(identity = %raw, error = %e, "Person failed");
                PersonOutcome::Failed
            }
        }
    }
}
