use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PortraitError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// One row of the identity mapping: a person's record key and, when the
/// person has signed up, their auth key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLink {
    pub record_identity: String,
    pub auth_identity: Option<String>,
}

/// Both halves of a person's identity as far as they could be discovered,
/// plus the raw input they were discovered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonIdentity {
    pub raw: String,
    pub auth_identity: Option<String>,
    pub record_identity: Option<String>,
}

impl PersonIdentity {
    /// An identity nobody could link; every later step uses the raw input.
    pub fn unresolved(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            auth_identity: None,
            record_identity: None,
        }
    }

    pub fn from_link(raw: &str, link: IdentityLink) -> Self {
        Self {
            raw: raw.to_string(),
            auth_identity: link.auth_identity.filter(|a| !a.is_empty()),
            record_identity: Some(link.record_identity),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.auth_identity.is_some() || self.record_identity.is_some()
    }

    /// Every identity string known for this person, auth first, deduplicated.
    /// Falls back to the raw input when nothing resolved.
    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(2);
        for id in [&self.auth_identity, &self.record_identity]
            .into_iter()
            .flatten()
        {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.is_empty() {
            ids.push(self.raw.clone());
        }
        ids
    }

    /// Storage directories to probe. Historical uploads used either half.
    pub fn owner_keys(&self) -> Vec<String> {
        self.identities()
    }

    /// Where new uploads go: the auth key when known.
    pub fn primary_owner_key(&self) -> &str {
        self.auth_identity
            .as_deref()
            .or(self.record_identity.as_deref())
            .unwrap_or(&self.raw)
    }

    /// Stable per-person seed for anything derived deterministically.
    pub fn seed(&self) -> &str {
        self.record_identity
            .as_deref()
            .or(self.auth_identity.as_deref())
            .unwrap_or(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// Reference holders
// ---------------------------------------------------------------------------

/// Record types that carry a profile image URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderKind {
    Account,
    PublicProfile,
}

impl HolderKind {
    pub const ALL: [HolderKind; 2] = [HolderKind::Account, HolderKind::PublicProfile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::PublicProfile => "public_profile",
        }
    }
}

impl fmt::Display for HolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one holder row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HolderLocation {
    pub kind: HolderKind,
    pub row_id: String,
}

/// An asset reference as stored in a holder row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderRow {
    pub location: HolderLocation,
    pub image_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl HolderRow {
    /// The stored URL, if it is non-blank.
    pub fn candidate(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Blobs
// ---------------------------------------------------------------------------

/// An object in the avatar bucket, addressed as `owner_key/filename`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobObject {
    pub owner_key: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BlobObject {
    pub fn new(owner_key: &str, filename: &str) -> Self {
        Self {
            owner_key: owner_key.to_string(),
            filename: filename.to_string(),
            content_type: None,
            size: None,
            updated_at: None,
        }
    }

    pub fn path(&self) -> String {
        object_path(&self.owner_key, &self.filename)
    }
}

pub fn object_path(owner_key: &str, filename: &str) -> String {
    format!("{owner_key}/{filename}")
}

// ---------------------------------------------------------------------------
// Resolution results
// ---------------------------------------------------------------------------

/// Where a resolved URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    ExistingRecord,
    StorageScan,
    Placeholder,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExistingRecord => write!(f, "existing_record"),
            Self::StorageScan => write!(f, "storage_scan"),
            Self::Placeholder => write!(f, "placeholder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedImage {
    pub url: String,
    pub source: ImageSource,
}

/// Outcome of one stage of the resolution state machine.
#[derive(Debug)]
pub enum Stage<T> {
    Found(T),
    NotFound,
    Failed(PortraitError),
}

/// Return value of `resolve`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub image_url: String,
    pub source: ImageSource,
    pub auth_identity: Option<String>,
    pub record_identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderStatus {
    /// The row now holds the resolved URL.
    Updated,
    /// The row already held the resolved URL; nothing was written.
    Unchanged,
    Failed,
}

impl HolderStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, HolderStatus::Failed)
    }
}

/// Per-holder result of propagation. `row_id` is `None` when the holder
/// type could not even be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderOutcome {
    pub kind: HolderKind,
    pub row_id: Option<String>,
    pub status: HolderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Return value of `reconcile`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub image_url: String,
    pub source: ImageSource,
    pub auth_identity: Option<String>,
    pub record_identity: Option<String>,
    pub holders: Vec<HolderOutcome>,
}

impl Reconciliation {
    pub fn failed_holders(&self) -> usize {
        self.holders
            .iter()
            .filter(|h| !h.status.is_success())
            .count()
    }

    pub fn is_partial_failure(&self) -> bool {
        self.failed_holders() > 0
    }

    /// True when it is safe to delete objects other than the resolved one:
    /// no holder exists, or at least one now points at the resolved URL.
    pub fn propagated(&self) -> bool {
        self.holders.is_empty() || self.holders.iter().any(|h| h.status.is_success())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceholderResult {
    pub image_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_count: u64,
    /// Paths that could not be deleted this run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

/// Aggregate report of a population-wide cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub deleted_object_count: u64,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} succeeded={} failed={} deleted_objects={}",
            self.processed, self.succeeded, self.failed, self.deleted_object_count,
        )
    }
}
