// In-memory collaborators for tests.
//
// - MockRecordStore (RecordStore): people + holder rows, with injectable failures
// - MockBlobStore   (BlobStore)  : path → bytes map behind a fake public base URL
// - MockProber      (LinkProber) : explicit per-URL answers, optionally backed
//   by a MockBlobStore so objects that exist are live

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::liveness::{DeadReason, Liveness};
use crate::traits::{BlobStore, LinkProber, RecordStore};
use crate::types::{
    BlobObject, HolderKind, HolderLocation, HolderRow, IdentityLink, PersonIdentity,
};

// ---------------------------------------------------------------------------
// MockRecordStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MockPerson {
    record_identity: String,
    auth_identity: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Clone)]
struct MockHolder {
    owner: String,
    row: HolderRow,
}

#[derive(Default)]
pub struct MockRecordStore {
    people: Vec<MockPerson>,
    holders: Mutex<Vec<MockHolder>>,
    failing_reads: HashSet<HolderKind>,
    failing_writes: HashSet<String>,
    failing_lookups: bool,
    failing_listing: bool,
    writes: Mutex<Vec<(HolderLocation, String)>>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn person(mut self, record_identity: &str, auth_identity: Option<&str>, name: Option<&str>) -> Self {
        self.people.push(MockPerson {
            record_identity: record_identity.to_string(),
            auth_identity: auth_identity.map(String::from),
            name: name.map(String::from),
        });
        self
    }

    pub fn holder(
        self,
        kind: HolderKind,
        row_id: &str,
        owner: &str,
        image_url: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        self.lock_holders().push(MockHolder {
            owner: owner.to_string(),
            row: HolderRow {
                location: HolderLocation {
                    kind,
                    row_id: row_id.to_string(),
                },
                image_url: image_url.map(String::from),
                updated_at: Some(updated_at),
            },
        });
        self
    }

    pub fn failing_reads(mut self, kind: HolderKind) -> Self {
        self.failing_reads.insert(kind);
        self
    }

    pub fn failing_write(mut self, row_id: &str) -> Self {
        self.failing_writes.insert(row_id.to_string());
        self
    }

    pub fn failing_lookups(mut self) -> Self {
        self.failing_lookups = true;
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    /// Every successful write, in the order it landed.
    pub fn writes(&self) -> Vec<(HolderLocation, String)> {
        self.writes.lock().unwrap().clone()
    }

    /// Current URL of a holder row.
    pub fn image_url(&self, row_id: &str) -> Option<String> {
        self.lock_holders()
            .iter()
            .find(|h| h.row.location.row_id == row_id)
            .and_then(|h| h.row.image_url.clone())
    }

    fn lock_holders(&self) -> std::sync::MutexGuard<'_, Vec<MockHolder>> {
        self.holders.lock().unwrap()
    }

    fn link(p: &MockPerson) -> IdentityLink {
        IdentityLink {
            record_identity: p.record_identity.clone(),
            auth_identity: p.auth_identity.clone(),
        }
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn lookup_by_auth(&self, auth_identity: &str) -> Result<Option<IdentityLink>> {
        if self.failing_lookups {
            bail!("MockRecordStore: lookup failure injected");
        }
        Ok(self
            .people
            .iter()
            .find(|p| p.auth_identity.as_deref() == Some(auth_identity))
            .map(Self::link))
    }

    async fn lookup_by_record(&self, record_identity: &str) -> Result<Option<IdentityLink>> {
        if self.failing_lookups {
            bail!("MockRecordStore: lookup failure injected");
        }
        Ok(self
            .people
            .iter()
            .find(|p| p.record_identity == record_identity)
            .map(Self::link))
    }

    async fn list_people(&self) -> Result<Vec<IdentityLink>> {
        if self.failing_listing {
            bail!("MockRecordStore: listing failure injected");
        }
        Ok(self.people.iter().map(Self::link).collect())
    }

    async fn display_name(&self, person: &PersonIdentity) -> Result<Option<String>> {
        let ids = person.identities();
        Ok(self
            .people
            .iter()
            .find(|p| {
                ids.contains(&p.record_identity)
                    || p.auth_identity.as_ref().is_some_and(|a| ids.contains(a))
            })
            .and_then(|p| p.name.clone()))
    }

    async fn holders(&self, kind: HolderKind, identities: &[String]) -> Result<Vec<HolderRow>> {
        if self.failing_reads.contains(&kind) {
            bail!("MockRecordStore: {kind} read failure injected");
        }
        let mut rows: Vec<HolderRow> = self
            .lock_holders()
            .iter()
            .filter(|h| h.row.location.kind == kind && identities.contains(&h.owner))
            .map(|h| h.row.clone())
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn write_image_url(&self, location: &HolderLocation, url: &str) -> Result<()> {
        if self.failing_writes.contains(&location.row_id) {
            bail!("MockRecordStore: write failure injected for {}", location.row_id);
        }
        {
            let mut holders = self.lock_holders();
            let holder = holders
                .iter_mut()
                .find(|h| h.row.location == *location)
                .ok_or_else(|| anyhow!("MockRecordStore: no row {}", location.row_id))?;
            holder.row.image_url = Some(url.to_string());
            holder.row.updated_at = Some(Utc::now());
        }
        self.writes
            .lock()
            .unwrap()
            .push((location.clone(), url.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockBlobStore
// ---------------------------------------------------------------------------

pub const MOCK_PUBLIC_BASE: &str = "https://blobs.test/storage/v1/object/public/avatars";

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MockBlobStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_uploads: bool,
    failing_lists: HashSet<String>,
    failing_deletes: HashSet<String>,
    uploads: Mutex<u32>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed empty objects under `owner`.
    pub fn with_files(self, owner: &str, filenames: &[&str]) -> Self {
        {
            let mut objects = self.objects.lock().unwrap();
            for name in filenames {
                objects.insert(
                    format!("{owner}/{name}"),
                    StoredObject {
                        bytes: Vec::new(),
                        content_type: guess_content_type(name).to_string(),
                        updated_at: Utc::now(),
                    },
                );
            }
        }
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.failing_uploads = true;
        self
    }

    pub fn failing_list(mut self, owner: &str) -> Self {
        self.failing_lists.insert(owner.to_string());
        self
    }

    pub fn failing_delete(mut self, path: &str) -> Self {
        self.failing_deletes.insert(path.to_string());
        self
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).map(|o| o.bytes.clone())
    }

    pub fn upload_count(&self) -> u32 {
        *self.uploads.lock().unwrap()
    }
}

fn guess_content_type(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "svg" => "image/svg+xml",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn list(&self, owner_key: &str) -> Result<Vec<BlobObject>> {
        if self.failing_lists.contains(owner_key) {
            bail!("MockBlobStore: list failure injected for {owner_key}");
        }
        let prefix = format!("{owner_key}/");
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(path, obj)| {
                let filename = path.strip_prefix(&prefix)?;
                if filename.contains('/') {
                    return None;
                }
                Some(BlobObject {
                    owner_key: owner_key.to_string(),
                    filename: filename.to_string(),
                    content_type: Some(obj.content_type.clone()),
                    size: Some(obj.bytes.len() as u64),
                    updated_at: Some(obj.updated_at),
                })
            })
            .collect())
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        if self.failing_uploads {
            bail!("MockBlobStore: upload failure injected for {path}");
        }
        self.objects.lock().unwrap().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                updated_at: Utc::now(),
            },
        );
        *self.uploads.lock().unwrap() += 1;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if self.failing_deletes.contains(path) {
            bail!("MockBlobStore: delete failure injected for {path}");
        }
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{MOCK_PUBLIC_BASE}/{path}")
    }

    fn locate(&self, url: &str) -> Option<(String, String)> {
        let rest = url.strip_prefix(MOCK_PUBLIC_BASE)?.strip_prefix('/')?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        let (owner, filename) = rest.split_once('/')?;
        if owner.is_empty() || filename.is_empty() || filename.contains('/') {
            return None;
        }
        Some((owner.to_string(), filename.to_string()))
    }
}

// ---------------------------------------------------------------------------
// MockProber
// ---------------------------------------------------------------------------

/// URLs with no explicit answer are live only if they name an object that
/// exists in the backing store; otherwise they are dead with a 404.
#[derive(Default)]
pub struct MockProber {
    answers: HashMap<String, (Liveness, Option<Duration>)>,
    store: Option<Arc<MockBlobStore>>,
    probed: Mutex<Vec<String>>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backed_by(store: Arc<MockBlobStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn live(mut self, url: &str) -> Self {
        self.answers.insert(url.to_string(), (Liveness::Live, None));
        self
    }

    pub fn live_after(mut self, url: &str, delay: Duration) -> Self {
        self.answers
            .insert(url.to_string(), (Liveness::Live, Some(delay)));
        self
    }

    pub fn dead(mut self, url: &str) -> Self {
        self.answers.insert(
            url.to_string(),
            (Liveness::Dead(DeadReason::Status { code: 404 }), None),
        );
        self
    }

    /// URLs probed so far, in the order probes started.
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkProber for MockProber {
    async fn probe(&self, url: &str) -> Liveness {
        self.probed.lock().unwrap().push(url.to_string());

        if let Some((liveness, delay)) = self.answers.get(url) {
            if let Some(delay) = delay {
                tokio::time::sleep(*delay).await;
            }
            return liveness.clone();
        }

        let exists = self
            .store
            .as_ref()
            .and_then(|s| s.locate(url).map(|(owner, file)| s.contains(&format!("{owner}/{file}"))))
            .unwrap_or(false);

        if exists {
            Liveness::Live
        } else {
            Liveness::Dead(DeadReason::Status { code: 404 })
        }
    }
}
