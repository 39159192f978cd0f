// PortraitEngine: the public entry points.
//
// Per person the flow is
//   identify -> try_record -> try_storage -> synthesize -> propagate -> (gc)
// Each stage reports Found / NotFound / Failed and one loop decides what runs
// next. Dropping a returned future cancels the run at its next await point;
// writes already made stay made, since a rerun converges to the same state.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, info_span, warn, Instrument};

use crate::blobs;
use crate::config::EngineSettings;
use crate::error::{PortraitError, Result};
use crate::gc;
use crate::identity::resolve_identity;
use crate::liveness::first_live;
use crate::placeholder;
use crate::reconciler::propagate;
use crate::records::{scan_holders, RecordScan};
use crate::traits::{bounded, BlobStore, LinkProber, RecordStore};
use crate::types::{
    CleanupReport, HolderKind, ImageSource, PersonIdentity, PlaceholderResult, Reconciliation,
    Resolution, ResolvedImage, Stage,
};

/// Resolution state machine.
enum Step {
    TryRecord,
    TryStorage,
    Synthesize,
    Resolved(ResolvedImage),
}

/// Result of resolving one person, with the holder scan it was based on.
pub(crate) struct PersonRun {
    pub person: PersonIdentity,
    pub image: ResolvedImage,
    pub scan: RecordScan,
}

#[derive(Clone)]
pub struct PortraitEngine {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    prober: Arc<dyn LinkProber>,
    settings: EngineSettings,
}

impl PortraitEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        prober: Arc<dyn LinkProber>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            records,
            blobs,
            prober,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    /// Resolve the single authoritative, live image URL for whoever
    /// `identity` names. Synthesizes a placeholder when nothing live exists.
    pub async fn resolve(&self, identity: &str) -> Result<Resolution> {
        self.resolve_identity_image(identity)
            .instrument(info_span!("resolve", identity))
            .await
    }

    /// Resolve, then write the result to every holder row.
    pub async fn reconcile(&self, identity: &str) -> Result<Reconciliation> {
        let person = self.identify(identity).await?;
        let (_, reconciliation) = self
            .reconcile_person(person)
            .instrument(info_span!("reconcile", identity))
            .await?;
        Ok(reconciliation)
    }

    /// Reconcile, then delete superseded objects under every owner key.
    ///
    /// `keep` overrides which filenames survive; the object the records now
    /// point at always survives.
    pub async fn cleanup(&self, identity: &str, keep: Option<&[String]>) -> Result<CleanupReport> {
        let person = self.identify(identity).await?;
        let (_, report) = self
            .cleanup_person(person, keep)
            .instrument(info_span!("cleanup", identity))
            .await?;
        Ok(report)
    }

    /// Synthesize and upload a fresh placeholder even if a live image
    /// exists, then point every holder at it.
    pub async fn create_placeholder(&self, identity: &str) -> Result<PlaceholderResult> {
        let person = self.identify(identity).await?;
        self.force_placeholder(person)
            .instrument(info_span!("create_placeholder", identity))
            .await
    }

    async fn resolve_identity_image(&self, identity: &str) -> Result<Resolution> {
        let person = self.identify(identity).await?;
        let run = self.resolve_person(person).await?;
        Ok(Resolution {
            image_url: run.image.url,
            source: run.image.source,
            auth_identity: run.person.auth_identity,
            record_identity: run.person.record_identity,
        })
    }

    async fn force_placeholder(&self, person: PersonIdentity) -> Result<PlaceholderResult> {
        let scan = scan_holders(self.records(), &person.identities(), self.settings.io_timeout).await;

        let url = match self.try_synthesize(&person).await {
            Stage::Found(url) => url,
            Stage::Failed(e) => return Err(hard_failure(&person, e)),
            Stage::NotFound => return Err(no_placeholder(&person)),
        };

        let unreadable = unreadable_kinds(&scan);
        let holders = propagate(
            self.records(),
            &url,
            &scan.rows,
            &unreadable,
            self.settings.io_timeout,
        )
        .await;
        let failed = holders.iter().filter(|h| !h.status.is_success()).count();
        info!(url = %url, holders = holders.len(), failed, "Placeholder propagated");

        Ok(PlaceholderResult { image_url: url })
    }

    // -----------------------------------------------------------------------
    // Per-person flow
    // -----------------------------------------------------------------------

    /// A blank identity names nobody and would address the bucket root.
    pub(crate) async fn identify(&self, identity: &str) -> Result<PersonIdentity> {
        if identity.trim().is_empty() {
            return Err(PortraitError::BlankIdentity);
        }
        Ok(resolve_identity(self.records(), identity, self.settings.io_timeout).await)
    }

    pub(crate) async fn resolve_person(&self, person: PersonIdentity) -> Result<PersonRun> {
        let scan = scan_holders(self.records(), &person.identities(), self.settings.io_timeout).await;

        let mut step = Step::TryRecord;
        let image = loop {
            step = match step {
                Step::TryRecord => match self.try_record(&scan).await {
                    Stage::Found(url) => Step::Resolved(ResolvedImage {
                        url,
                        source: ImageSource::ExistingRecord,
                    }),
                    Stage::NotFound => Step::TryStorage,
                    Stage::Failed(e) => {
                        warn!(error = %e, "Record stage failed, scanning storage");
                        Step::TryStorage
                    }
                },
                Step::TryStorage => match self.try_storage(&person).await {
                    Stage::Found(url) => Step::Resolved(ResolvedImage {
                        url,
                        source: ImageSource::StorageScan,
                    }),
                    Stage::NotFound => Step::Synthesize,
                    Stage::Failed(e) => {
                        warn!(error = %e, "Storage stage failed, synthesizing placeholder");
                        Step::Synthesize
                    }
                },
                Step::Synthesize => match self.try_synthesize(&person).await {
                    Stage::Found(url) => Step::Resolved(ResolvedImage {
                        url,
                        source: ImageSource::Placeholder,
                    }),
                    Stage::Failed(e) => return Err(hard_failure(&person, e)),
                    Stage::NotFound => return Err(no_placeholder(&person)),
                },
                Step::Resolved(image) => break image,
            };
        };

        info!(url = %image.url, source = %image.source, "Image resolved");
        Ok(PersonRun {
            person,
            image,
            scan,
        })
    }

    pub(crate) async fn reconcile_person(
        &self,
        person: PersonIdentity,
    ) -> Result<(PersonRun, Reconciliation)> {
        let run = self.resolve_person(person).await?;
        let unreadable = unreadable_kinds(&run.scan);

        let holders = propagate(
            self.records(),
            &run.image.url,
            &run.scan.rows,
            &unreadable,
            self.settings.io_timeout,
        )
        .await;

        let reconciliation = Reconciliation {
            image_url: run.image.url.clone(),
            source: run.image.source,
            auth_identity: run.person.auth_identity.clone(),
            record_identity: run.person.record_identity.clone(),
            holders,
        };

        if reconciliation.is_partial_failure() {
            warn!(
                failed = reconciliation.failed_holders(),
                total = reconciliation.holders.len(),
                "Reconciliation partially failed"
            );
        } else {
            info!(holders = reconciliation.holders.len(), "Reconciled");
        }

        Ok((run, reconciliation))
    }

    pub(crate) async fn cleanup_person(
        &self,
        person: PersonIdentity,
        keep: Option<&[String]>,
    ) -> Result<(Reconciliation, CleanupReport)> {
        let (run, reconciliation) = self.reconcile_person(person).await?;

        if !reconciliation.propagated() {
            warn!("No holder points at the resolved image, skipping garbage collection");
            return Ok((reconciliation, CleanupReport::default()));
        }

        let in_use = self.blobs.locate(&reconciliation.image_url);
        let keep: Option<HashSet<String>> = keep.map(|k| k.iter().cloned().collect());
        let owner_keys = run.person.owner_keys();

        let collections = owner_keys.iter().map(|owner_key| {
            let in_use = in_use.as_ref();
            let keep = keep.as_ref();
            async move {
                let result = gc::collect_owner(
                    self.blobs.as_ref(),
                    owner_key,
                    keep,
                    in_use,
                    self.settings.io_timeout,
                    self.settings.probe_concurrency,
                )
                .await;
                (owner_key, result)
            }
        });

        let mut report = CleanupReport::default();
        for (owner_key, result) in join_all(collections).await {
            match result {
                Ok(r) => {
                    report.deleted_count += r.deleted_count;
                    report.failed.extend(r.failed);
                }
                Err(e) => {
                    warn!(owner_key = %owner_key, error = %e, "Skipping garbage collection for owner key");
                    report.failed.push(format!("{owner_key}/*"));
                }
            }
        }

        Ok((reconciliation, report))
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn try_record(&self, scan: &RecordScan) -> Stage<String> {
        if scan.candidates.is_empty() {
            return match scan.failures.first() {
                Some((kind, _)) if scan.rows.is_empty() => Stage::Failed(PortraitError::RecordRead {
                    holder: *kind,
                    message: "no holder type could be read".to_string(),
                }),
                _ => Stage::NotFound,
            };
        }

        match first_live(
            self.prober.as_ref(),
            &scan.candidates,
            self.settings.probe_concurrency,
            self.settings.liveness_timeout,
        )
        .await
        {
            Some(url) => Stage::Found(url.to_string()),
            None => {
                info!(candidates = scan.candidates.len(), "No live URL in records");
                Stage::NotFound
            }
        }
    }

    async fn try_storage(&self, person: &PersonIdentity) -> Stage<String> {
        let mut last_error = None;

        for owner_key in person.owner_keys() {
            let ranked =
                match blobs::scan_owner(self.blobs.as_ref(), &owner_key, self.settings.io_timeout)
                    .await
                {
                    Ok(ranked) => ranked,
                    Err(e) => {
                        warn!(owner_key = %owner_key, error = %e, "Storage listing failed");
                        last_error = Some(e);
                        continue;
                    }
                };

            let urls: Vec<String> = ranked
                .iter()
                .map(|o| self.blobs.public_url(&o.path()))
                .collect();

            if let Some(url) = first_live(
                self.prober.as_ref(),
                &urls,
                self.settings.probe_concurrency,
                self.settings.liveness_timeout,
            )
            .await
            {
                return Stage::Found(url.to_string());
            }
            info!(owner_key = %owner_key, candidates = urls.len(), "No live object under owner key");
        }

        match last_error {
            Some(e) => Stage::Failed(e),
            None => Stage::NotFound,
        }
    }

    async fn try_synthesize(&self, person: &PersonIdentity) -> Stage<String> {
        let name = match bounded(
            self.settings.io_timeout,
            "display name lookup",
            self.records.display_name(person),
        )
        .await
        {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "Display name lookup failed, using identity for initial");
                None
            }
        };

        match placeholder::synthesize(
            self.blobs.as_ref(),
            person,
            name.as_deref(),
            self.settings.io_timeout,
        )
        .await
        {
            Ok(url) => Stage::Found(url),
            Err(e) => Stage::Failed(e),
        }
    }
}

fn unreadable_kinds(scan: &RecordScan) -> Vec<HolderKind> {
    scan.failures.iter().map(|(kind, _)| *kind).collect()
}

fn no_placeholder(person: &PersonIdentity) -> PortraitError {
    PortraitError::ResolutionFailed {
        identity: person.raw.clone(),
        reason: "placeholder produced no URL".to_string(),
    }
}

fn hard_failure(person: &PersonIdentity, cause: PortraitError) -> PortraitError {
    warn!(error = %cause, "Terminal fallback failed");
    PortraitError::ResolutionFailed {
        identity: person.raw.clone(),
        reason: cause.to_string(),
    }
}
