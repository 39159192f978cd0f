use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out talking to storage: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    /// Transport failures and 5xx/429 responses are worth retrying; 4xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Network(_) | StorageError::Timeout(_) => true,
            StorageError::Api { status, .. } => *status >= 500 || *status == 429,
            StorageError::Parse(_) | StorageError::InvalidPath(_) => false,
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(err.to_string())
        } else {
            StorageError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Parse(err.to_string())
    }
}
