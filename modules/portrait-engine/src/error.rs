use crate::types::HolderKind;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, PortraitError>;

/// Everything that can go wrong while resolving or repairing a person's image.
///
/// Callers of the single-person entry points only ever see
/// [`PortraitError::BlankIdentity`] (input rejected before any I/O) or
/// [`PortraitError::ResolutionFailed`]. The other variants are recovered
/// locally and show up in logs and per-holder reports.
#[derive(Debug, thiserror::Error)]
pub enum PortraitError {
    #[error("Identity must not be blank")]
    BlankIdentity,

    #[error("Identity not linked in either namespace: {0}")]
    IdentityUnresolved(String),

    #[error("Failed to read {holder} records: {message}")]
    RecordRead { holder: HolderKind, message: String },

    #[error("Failed to write {holder} record {row_id}: {message}")]
    RecordWrite {
        holder: HolderKind,
        row_id: String,
        message: String,
    },

    #[error("Failed to list storage under {owner_key}: {message}")]
    StorageList { owner_key: String, message: String },

    #[error("Failed to upload {path}: {message}")]
    StorageUpload { path: String, message: String },

    #[error("Failed to delete {path}: {message}")]
    StorageDelete { path: String, message: String },

    #[error("Failed to enumerate people: {0}")]
    Enumeration(String),

    #[error("Liveness check timed out: {0}")]
    LivenessTimeout(String),

    #[error("No image could be resolved or created for {identity}: {reason}")]
    ResolutionFailed { identity: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PortraitError {
    /// Transient I/O failures that a later run can be expected to fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PortraitError::RecordRead { .. }
                | PortraitError::RecordWrite { .. }
                | PortraitError::StorageList { .. }
                | PortraitError::StorageUpload { .. }
                | PortraitError::StorageDelete { .. }
                | PortraitError::Enumeration(_)
                | PortraitError::Database(_)
        )
    }
}
