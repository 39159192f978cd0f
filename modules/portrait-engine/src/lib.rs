//! Profile image resolution and reconciliation across two identity
//! namespaces and a public blob bucket.
//!
//! Given any identity for a person, [`PortraitEngine`] finds one live image
//! URL (records first, then storage, then a synthesized placeholder), writes
//! it back to every record that holds one, and collects superseded blobs.
//!
//! Collaborators sit behind the traits in [`traits`]: Postgres via
//! [`PgRecordStore`], the bucket via `storage_client::StorageClient`, and
//! liveness via [`HttpLinkProber`].

pub mod batch;
pub mod blobs;
pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
pub mod identity;
pub mod liveness;
pub mod placeholder;
pub mod reconciler;
pub mod records;
pub mod store;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{EngineSettings, PortraitConfig};
pub use engine::PortraitEngine;
pub use error::{PortraitError, Result};
pub use liveness::{DeadReason, HttpLinkProber, Liveness};
pub use store::PgRecordStore;
pub use traits::{BlobStore, LinkProber, RecordStore};
pub use types::{
    BatchReport, BlobObject, CleanupReport, HolderKind, HolderLocation, HolderOutcome, HolderRow,
    HolderStatus, IdentityLink, ImageSource, PersonIdentity, PlaceholderResult, Reconciliation,
    Resolution, ResolvedImage,
};
