use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /object/list/{bucket}`.
#[derive(Debug, Serialize)]
pub(crate) struct ListRequest<'a> {
    pub prefix: &'a str,
    pub limit: u32,
    pub offset: u32,
    #[serde(rename = "sortBy")]
    pub sort_by: SortBy,
}

#[derive(Debug, Serialize)]
pub(crate) struct SortBy {
    pub column: &'static str,
    pub order: &'static str,
}

/// One entry from a directory listing. Sub-folders come back with no `id`
/// and no `metadata`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<ObjectMetadata>,
}

impl ListedObject {
    pub fn is_folder(&self) -> bool {
        self.id.is_none() && self.metadata.is_none()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.mimetype.as_deref())
    }

    pub fn size(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.size)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectMetadata {
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
