// Trait seams for the engine's three collaborators.
//
// RecordStore: identity mapping plus every reference-holder table.
// BlobStore  : the avatar bucket (list / upload / delete / public URLs).
// LinkProber : metadata-only fetch used for liveness.
//
// Production impls: PgRecordStore, storage_client::StorageClient,
// HttpLinkProber. In-memory mocks live in `testing`.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::liveness::Liveness;
use crate::types::{BlobObject, HolderKind, HolderLocation, HolderRow, IdentityLink, PersonIdentity};

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find the mapping row whose auth half equals `auth_identity`.
    async fn lookup_by_auth(&self, auth_identity: &str) -> Result<Option<IdentityLink>>;

    /// Find the mapping row whose record half equals `record_identity`.
    async fn lookup_by_record(&self, record_identity: &str) -> Result<Option<IdentityLink>>;

    /// Every person known to the system.
    async fn list_people(&self) -> Result<Vec<IdentityLink>>;

    /// First name, else display name, for placeholder initials.
    async fn display_name(&self, person: &PersonIdentity) -> Result<Option<String>>;

    /// Rows of one holder type owned by any of `identities`,
    /// most recently updated first. A person with no row yields an empty vec.
    async fn holders(&self, kind: HolderKind, identities: &[String]) -> Result<Vec<HolderRow>>;

    /// Overwrite the image URL of a single holder row.
    async fn write_image_url(&self, location: &HolderLocation, url: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Objects directly under `owner_key`.
    async fn list(&self, owner_key: &str) -> Result<Vec<BlobObject>>;

    /// Upload with overwrite semantics keyed by exact path.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Delete one object. Deleting a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    fn public_url(&self, path: &str) -> String;

    /// Map a public URL of this store back to `(owner_key, filename)`.
    fn locate(&self, url: &str) -> Option<(String, String)>;
}

#[async_trait]
impl BlobStore for storage_client::StorageClient {
    async fn list(&self, owner_key: &str) -> Result<Vec<BlobObject>> {
        let listed = storage_client::StorageClient::list(self, owner_key).await?;
        Ok(listed
            .into_iter()
            .filter(|o| !o.is_folder())
            .map(|o| BlobObject {
                owner_key: owner_key.to_string(),
                content_type: o.content_type().map(String::from),
                size: o.size(),
                updated_at: o.updated_at.or(o.created_at),
                filename: o.name,
            })
            .collect())
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        Ok(storage_client::StorageClient::upload(self, path, bytes, content_type).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        Ok(storage_client::StorageClient::delete(self, path).await?)
    }

    fn public_url(&self, path: &str) -> String {
        storage_client::StorageClient::public_url(self, path)
    }

    fn locate(&self, url: &str) -> Option<(String, String)> {
        storage_client::StorageClient::locate(self, url)
    }
}

// ---------------------------------------------------------------------------
// LinkProber
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LinkProber: Send + Sync {
    /// Metadata-only fetch of `url`. Never errors; failures classify as dead.
    async fn probe(&self, url: &str) -> Liveness;
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Run a collaborator call under `limit`. An elapsed timer becomes an error
/// naming `what`, so callers handle it like any other I/O failure.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("{what} timed out after {}ms", limit.as_millis())),
    }
}
