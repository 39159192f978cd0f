//! End-to-end tests for PortraitEngine against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use portrait_engine::testing::{MockBlobStore, MockProber, MockRecordStore};
use portrait_engine::{
    BlobStore, EngineSettings, HolderKind, HolderStatus, ImageSource, PortraitEngine,
    PortraitError,
};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    engine: PortraitEngine,
    records: Arc<MockRecordStore>,
    blobs: Arc<MockBlobStore>,
    prober: Arc<MockProber>,
}

fn settings() -> EngineSettings {
    EngineSettings {
        liveness_timeout: Duration::from_millis(500),
        io_timeout: Duration::from_secs(2),
        ..EngineSettings::default()
    }
}

fn harness_with(
    records: MockRecordStore,
    blobs: MockBlobStore,
    settings: EngineSettings,
    answers: impl FnOnce(MockProber, &MockBlobStore) -> MockProber,
) -> Harness {
    let records = Arc::new(records);
    let blobs = Arc::new(blobs);
    let prober = Arc::new(answers(MockProber::backed_by(blobs.clone()), &blobs));
    let engine = PortraitEngine::new(records.clone(), blobs.clone(), prober.clone(), settings);
    Harness {
        engine,
        records,
        blobs,
        prober,
    }
}

fn harness(records: MockRecordStore, blobs: MockBlobStore) -> Harness {
    harness_with(records, blobs, settings(), |p, _| p)
}

/// Person P: record identity `P_rec`, auth identity `P_auth`, one row in each
/// holder table and no image anywhere.
fn person_p() -> MockRecordStore {
    let now = Utc::now();
    MockRecordStore::new()
        .person("P_rec", Some("P_auth"), Some("Pat"))
        .holder(HolderKind::Account, "acct-p", "P_rec", None, now)
        .holder(HolderKind::PublicProfile, "pub-p", "P_auth", None, now)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_record_url_wins_over_storage() {
    let records = MockRecordStore::new()
        .person("P_rec", Some("P_auth"), None)
        .holder(HolderKind::Account, "acct-p", "P_rec", Some("https://cdn.example.com/p.png"), Utc::now());
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png"]);
    let h = harness_with(records, blobs, settings(), |p, _| p.live("https://cdn.example.com/p.png"));

    let res = h.engine.resolve("P_auth").await.unwrap();
    assert_eq!(res.source, ImageSource::ExistingRecord);
    assert_eq!(res.image_url, "https://cdn.example.com/p.png");
    assert_eq!(res.auth_identity.as_deref(), Some("P_auth"));
    assert_eq!(res.record_identity.as_deref(), Some("P_rec"));
}

#[tokio::test]
async fn dead_record_url_falls_through_to_storage() {
    let records = MockRecordStore::new()
        .person("P_rec", Some("P_auth"), None)
        .holder(HolderKind::Account, "acct-p", "P_rec", Some("https://cdn.example.com/gone.png"), Utc::now());
    let blobs = MockBlobStore::new().with_files("P_rec", &["1700000000000.jpg"]);
    let h = harness(records, blobs);

    let res = h.engine.resolve("P_rec").await.unwrap();
    assert_eq!(res.source, ImageSource::StorageScan);
    assert_eq!(res.image_url, h.blobs.public_url("P_rec/1700000000000.jpg"));
}

#[tokio::test]
async fn newest_record_reference_is_tried_first() {
    let now = Utc::now();
    let records = MockRecordStore::new()
        .person("P_rec", Some("P_auth"), None)
        .holder(HolderKind::Account, "acct-p", "P_rec", Some("https://cdn.example.com/old.png"), now - ChronoDuration::days(30))
        .holder(HolderKind::PublicProfile, "pub-p", "P_auth", Some("https://cdn.example.com/new.png"), now);
    let h = harness_with(records, MockBlobStore::new(), settings(), |p, _| {
        p.live("https://cdn.example.com/old.png")
            .live("https://cdn.example.com/new.png")
    });

    let res = h.engine.resolve("P_rec").await.unwrap();
    assert_eq!(res.image_url, "https://cdn.example.com/new.png");
}

#[tokio::test]
async fn canonical_file_is_preferred_over_newer_timestamps() {
    let blobs = MockBlobStore::new().with_files("P_auth", &["1000.jpg", "profile.png", "2000.jpg"]);
    let h = harness(person_p(), blobs);

    let res = h.engine.resolve("P_auth").await.unwrap();
    assert_eq!(res.source, ImageSource::StorageScan);
    assert_eq!(res.image_url, h.blobs.public_url("P_auth/profile.png"));
}

#[tokio::test]
async fn dead_canonical_file_falls_through_to_newest_timestamp() {
    // P has no record referencing an image; P_auth/profile.svg is a dead
    // link and P_auth/2000.png is live.
    let blobs = MockBlobStore::new().with_files("P_auth", &["2000.png", "profile.svg"]);
    let serial = EngineSettings {
        probe_concurrency: 1,
        ..settings()
    };
    let h = harness_with(person_p(), blobs, serial, |p, b| {
        p.dead(&b.public_url("P_auth/profile.svg"))
    });

    let res = h.engine.resolve("P_auth").await.unwrap();

    assert_eq!(res.source, ImageSource::StorageScan);
    assert_eq!(res.image_url, h.blobs.public_url("P_auth/2000.png"));
    assert_eq!(
        h.prober.probed(),
        vec![
            h.blobs.public_url("P_auth/profile.svg"),
            h.blobs.public_url("P_auth/2000.png"),
        ]
    );
}

#[tokio::test]
async fn second_owner_key_is_searched_when_first_is_empty() {
    let blobs = MockBlobStore::new().with_files("P_rec", &["profile.jpg"]);
    let h = harness(person_p(), blobs);

    let res = h.engine.resolve("P_auth").await.unwrap();
    assert_eq!(res.image_url, h.blobs.public_url("P_rec/profile.jpg"));
}

#[tokio::test]
async fn listing_failure_on_one_key_still_searches_the_other() {
    let blobs = MockBlobStore::new()
        .with_files("P_rec", &["profile.jpg"])
        .failing_list("P_auth");
    let h = harness(person_p(), blobs);

    let res = h.engine.resolve("P_rec").await.unwrap();
    assert_eq!(res.source, ImageSource::StorageScan);
    assert_eq!(res.image_url, h.blobs.public_url("P_rec/profile.jpg"));
}

#[tokio::test]
async fn nothing_anywhere_yields_a_placeholder() {
    let h = harness(person_p(), MockBlobStore::new());

    let res = h.engine.resolve("P_rec").await.unwrap();

    assert_eq!(res.source, ImageSource::Placeholder);
    assert!(!res.image_url.is_empty());
    assert_eq!(res.image_url, h.blobs.public_url("P_auth/profile.svg"));
    let svg = String::from_utf8(h.blobs.object_bytes("P_auth/profile.svg").unwrap()).unwrap();
    assert!(svg.contains(">P</text>"));
}

#[tokio::test]
async fn unknown_identity_still_gets_a_placeholder_under_raw_key() {
    let h = harness(MockRecordStore::new(), MockBlobStore::new());

    let res = h.engine.resolve("stranger").await.unwrap();

    assert_eq!(res.source, ImageSource::Placeholder);
    assert_eq!(res.auth_identity, None);
    assert_eq!(res.record_identity, None);
    assert!(h.blobs.contains("stranger/profile.svg"));
}

#[tokio::test]
async fn placeholder_upload_failure_is_the_only_hard_failure() {
    let h = harness(person_p(), MockBlobStore::new().failing_uploads());

    let err = h.engine.resolve("P_auth").await.unwrap_err();
    assert!(matches!(err, PortraitError::ResolutionFailed { .. }));
}

#[tokio::test]
async fn resolution_is_symmetric_across_identity_halves() {
    let blobs = MockBlobStore::new().with_files("P_rec", &["42.png", "43.png"]);
    let h = harness(person_p(), blobs);

    let by_auth = h.engine.resolve("P_auth").await.unwrap();
    let by_record = h.engine.resolve("P_rec").await.unwrap();

    assert_eq!(by_auth.image_url, by_record.image_url);
    assert_eq!(by_auth.image_url, h.blobs.public_url("P_rec/43.png"));
}

#[tokio::test]
async fn placeholder_resolution_is_symmetric_across_identity_halves() {
    let h = harness(person_p(), MockBlobStore::new());

    let by_auth = h.engine.resolve("P_auth").await.unwrap();
    let by_record = h.engine.resolve("P_rec").await.unwrap();

    assert_eq!(by_auth.source, ImageSource::Placeholder);
    assert_eq!(by_record.source, ImageSource::StorageScan);
    assert_eq!(by_auth.image_url, by_record.image_url);
}

#[tokio::test]
async fn blank_identity_is_rejected_before_any_io() {
    let h = harness(person_p(), MockBlobStore::new().with_files("P_auth", &["1.png"]));

    assert!(matches!(
        h.engine.resolve("   ").await.unwrap_err(),
        PortraitError::BlankIdentity
    ));
    assert!(matches!(
        h.engine.reconcile("").await.unwrap_err(),
        PortraitError::BlankIdentity
    ));
    assert!(matches!(
        h.engine.cleanup(" ", None).await.unwrap_err(),
        PortraitError::BlankIdentity
    ));
    assert!(matches!(
        h.engine.create_placeholder("\t").await.unwrap_err(),
        PortraitError::BlankIdentity
    ));

    assert_eq!(h.blobs.upload_count(), 0);
    assert_eq!(h.blobs.paths(), vec!["P_auth/1.png".to_string()]);
    assert!(h.records.writes().is_empty());
    assert!(h.prober.probed().is_empty());
}

#[tokio::test]
async fn record_read_failure_does_not_stop_resolution() {
    let records = person_p().failing_reads(HolderKind::Account);
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png"]);
    let h = harness(records, blobs);

    let res = h.engine.resolve("P_auth").await.unwrap();
    assert_eq!(res.source, ImageSource::StorageScan);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_points_every_holder_at_the_resolved_url() {
    let blobs = MockBlobStore::new().with_files("P_auth", &["2000.png"]);
    let h = harness(person_p(), blobs);

    let rec = h.engine.reconcile("P_rec").await.unwrap();

    let expected = h.blobs.public_url("P_auth/2000.png");
    assert_eq!(rec.image_url, expected);
    assert_eq!(rec.holders.len(), 2);
    assert!(rec.holders.iter().all(|o| o.status == HolderStatus::Updated));
    assert_eq!(h.records.image_url("acct-p").as_deref(), Some(expected.as_str()));
    assert_eq!(h.records.image_url("pub-p").as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn reconcile_twice_is_idempotent() {
    let blobs = MockBlobStore::new().with_files("P_auth", &["2000.png"]);
    let h = harness(person_p(), blobs);

    let first = h.engine.reconcile("P_auth").await.unwrap();
    let writes_after_first = h.records.writes().len();
    let second = h.engine.reconcile("P_auth").await.unwrap();

    assert_eq!(first.image_url, second.image_url);
    assert_eq!(second.source, ImageSource::ExistingRecord);
    assert!(second.holders.iter().all(|o| o.status == HolderStatus::Unchanged));
    assert_eq!(h.records.writes().len(), writes_after_first);
}

#[tokio::test]
async fn reconcile_after_placeholder_reuses_it() {
    let h = harness(person_p(), MockBlobStore::new());

    let first = h.engine.reconcile("P_auth").await.unwrap();
    let second = h.engine.reconcile("P_rec").await.unwrap();

    assert_eq!(first.source, ImageSource::Placeholder);
    assert_eq!(second.source, ImageSource::ExistingRecord);
    assert_eq!(first.image_url, second.image_url);
    assert_eq!(h.blobs.upload_count(), 1);
}

#[tokio::test]
async fn reconcile_twice_without_holders_returns_the_same_placeholder_url() {
    let records = MockRecordStore::new().person("P_rec", Some("P_auth"), Some("Pat"));
    let h = harness(records, MockBlobStore::new());

    let first = h.engine.reconcile("P_auth").await.unwrap();
    let second = h.engine.reconcile("P_auth").await.unwrap();

    assert_eq!(first.source, ImageSource::Placeholder);
    assert!(first.holders.is_empty());
    assert_eq!(first.image_url, second.image_url);
    assert_eq!(h.blobs.upload_count(), 1);
}

#[tokio::test]
async fn reconcile_twice_for_unknown_identity_is_idempotent() {
    let h = harness(MockRecordStore::new(), MockBlobStore::new());

    let first = h.engine.reconcile("stranger").await.unwrap();
    let second = h.engine.reconcile("stranger").await.unwrap();

    assert_eq!(first.image_url, h.blobs.public_url("stranger/profile.svg"));
    assert_eq!(first.image_url, second.image_url);
}

#[tokio::test]
async fn one_failed_holder_write_is_isolated() {
    let records = person_p().failing_write("acct-p");
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png"]);
    let h = harness(records, blobs);

    let rec = h.engine.reconcile("P_auth").await.unwrap();

    assert_eq!(rec.image_url, h.blobs.public_url("P_auth/profile.png"));
    assert!(rec.is_partial_failure());
    let status = |row: &str| {
        rec.holders
            .iter()
            .find(|o| o.row_id.as_deref() == Some(row))
            .map(|o| o.status)
    };
    assert_eq!(status("acct-p"), Some(HolderStatus::Failed));
    assert_eq!(status("pub-p"), Some(HolderStatus::Updated));
}

// ---------------------------------------------------------------------------
// Placeholder override
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_placeholder_overrides_a_live_asset() {
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png"]);
    let h = harness(person_p(), blobs);

    let result = h.engine.create_placeholder("P_rec").await.unwrap();

    assert_eq!(result.image_url, h.blobs.public_url("P_auth/profile.svg"));
    assert!(h.blobs.contains("P_auth/profile.svg"));
    assert_eq!(h.records.image_url("acct-p"), Some(result.image_url.clone()));
    assert_eq!(h.records.image_url("pub-p"), Some(result.image_url));
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_deletes_exactly_the_timestamp_files() {
    let blobs = MockBlobStore::new().with_files(
        "P_auth",
        &["profile.svg", "1000.png", "2000.png", "3000.jpg"],
    );
    let h = harness(person_p(), blobs);

    let report = h.engine.cleanup("P_auth", None).await.unwrap();

    assert_eq!(report.deleted_count, 3);
    assert!(report.failed.is_empty());
    assert_eq!(h.blobs.paths(), vec!["P_auth/profile.svg".to_string()]);
}

#[tokio::test]
async fn cleanup_never_deletes_the_object_in_use() {
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png", "2000.png"]);
    let h = harness_with(person_p(), blobs, settings(), |p, b| {
        p.dead(&b.public_url("P_auth/profile.png"))
    });

    let nothing: Vec<String> = Vec::new();
    let report = h.engine.cleanup("P_auth", Some(nothing.as_slice())).await.unwrap();

    assert_eq!(report.deleted_count, 1);
    assert_eq!(h.blobs.paths(), vec!["P_auth/2000.png".to_string()]);
}

#[tokio::test]
async fn cleanup_honours_an_explicit_keep_list() {
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png", "1.png", "2.png"]);
    let h = harness(person_p(), blobs);

    let keep = vec!["1.png".to_string()];
    let report = h.engine.cleanup("P_auth", Some(keep.as_slice())).await.unwrap();

    assert_eq!(report.deleted_count, 1);
    assert_eq!(
        h.blobs.paths(),
        vec!["P_auth/1.png".to_string(), "P_auth/profile.png".to_string()]
    );
}

#[tokio::test]
async fn cleanup_is_skipped_when_no_holder_was_updated() {
    let records = person_p().failing_write("acct-p").failing_write("pub-p");
    let blobs = MockBlobStore::new().with_files("P_auth", &["profile.png", "1.png", "2.png"]);
    let h = harness(records, blobs);

    let report = h.engine.cleanup("P_auth", None).await.unwrap();

    assert_eq!(report.deleted_count, 0);
    assert_eq!(h.blobs.paths().len(), 3);
}

#[tokio::test]
async fn cleanup_covers_both_owner_keys() {
    let blobs = MockBlobStore::new()
        .with_files("P_auth", &["profile.png", "1.png"])
        .with_files("P_rec", &["profile.jpg", "7.png", "8.png"]);
    let h = harness(person_p(), blobs);

    let report = h.engine.cleanup("P_rec", None).await.unwrap();

    assert_eq!(report.deleted_count, 3);
    assert_eq!(
        h.blobs.paths(),
        vec!["P_auth/profile.png".to_string(), "P_rec/profile.jpg".to_string()]
    );
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_cleanup_processes_everyone_independently() {
    let now = Utc::now();
    let records = MockRecordStore::new()
        .person("A_rec", Some("A_auth"), Some("Ann"))
        .holder(HolderKind::Account, "acct-a", "A_rec", None, now)
        .person("B_rec", None, Some("Bo"))
        .holder(HolderKind::Account, "acct-b", "B_rec", None, now)
        .failing_write("acct-b")
        .person("C_rec", Some("C_auth"), None);
    let blobs = MockBlobStore::new()
        .with_files("A_auth", &["profile.png", "1.png", "2.png"])
        .with_files("C_rec", &["5.png", "6.png"]);
    let h = harness(records, blobs);

    let report = h.engine.batch_cleanup().await.unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    // A: 1.png + 2.png; C: 5.png (6.png is in use); B: nothing stored.
    assert_eq!(report.deleted_object_count, 3);
    assert!(h.blobs.contains("C_rec/6.png"));
    assert!(h.blobs.contains("B_rec/profile.svg"));
}

#[tokio::test]
async fn batch_counts_hard_failures_without_aborting() {
    let records = MockRecordStore::new()
        .person("A_rec", None, None)
        .person("B_rec", None, None);
    let h = harness(records, MockBlobStore::new().failing_uploads());

    let report = h.engine.batch_cleanup().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 2);
}

#[tokio::test]
async fn batch_fails_fast_when_people_cannot_be_listed() {
    let h = harness(MockRecordStore::new().failing_listing(), MockBlobStore::new());

    let err = h.engine.batch_cleanup().await.unwrap_err();
    assert!(matches!(err, PortraitError::Enumeration(_)));
}
