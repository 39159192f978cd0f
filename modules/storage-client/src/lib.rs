pub mod error;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{ListedObject, ObjectMetadata};

use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

use types::{ErrorBody, ListRequest, SortBy};

/// Page size for directory listings. The API caps a single page at 1000.
const LIST_PAGE_SIZE: u32 = 1000;

/// Client for a single bucket of the object storage REST API.
///
/// Objects are addressed as `owner/filename`. Uploads always upsert, so
/// writing the same path twice replaces the object instead of failing.
#[derive(Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    base_url: Url,
    service_key: String,
    bucket: String,
}

impl StorageClient {
    pub fn new(
        base_url: &str,
        service_key: &str,
        bucket: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| StorageError::InvalidPath(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidPath(base_url.to_string()));
        }
        // Path joins below rely on a trailing-slash-free base.
        let trimmed = base_url.path().trim_end_matches('/').to_string();
        base_url.set_path(&trimmed);

        Ok(Self {
            client,
            base_url,
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List every object directly under `prefix` (one directory level).
    pub async fn list(&self, prefix: &str) -> Result<Vec<ListedObject>> {
        let url = self.endpoint(&["object", "list", &self.bucket], &[]);
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let body = ListRequest {
                prefix,
                limit: LIST_PAGE_SIZE,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            };

            let resp = self
                .authed(self.client.post(url.clone()))
                .json(&body)
                .send()
                .await?;
            let resp = check_status(resp).await?;
            let page: Vec<ListedObject> = serde_json::from_str(&resp.text().await?)?;
            let fetched = page.len() as u32;
            all.extend(page);

            if fetched < LIST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        tracing::debug!(bucket = %self.bucket, prefix, count = all.len(), "Listed objects");
        Ok(all)
    }

    /// Upload bytes to `path`, replacing whatever is there.
    pub async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let segments = split_path(path)?;
        let url = self.endpoint(&["object", &self.bucket], &segments);

        let resp = self
            .authed(self.client.post(url))
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .body(bytes)
            .send()
            .await?;
        check_status(resp).await?;

        tracing::info!(bucket = %self.bucket, path, content_type, "Uploaded object");
        Ok(())
    }

    /// Delete the object at `path`. An object that is already gone is not an error.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let segments = split_path(path)?;
        let url = self.endpoint(&["object", &self.bucket], &segments);

        let resp = self.authed(self.client.delete(url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            tracing::debug!(bucket = %self.bucket, path, "Object already deleted");
            return Ok(());
        }
        check_status(resp).await?;

        tracing::info!(bucket = %self.bucket, path, "Deleted object");
        Ok(())
    }

    /// Public URL for `path`. Pure string construction; no request is made.
    pub fn public_url(&self, path: &str) -> String {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.endpoint(&["object", "public", &self.bucket], &segments)
            .to_string()
    }

    /// Inverse of [`public_url`](Self::public_url): split a public URL of
    /// this bucket into `(owner, filename)`. Query strings are ignored.
    pub fn locate(&self, public_url: &str) -> Option<(String, String)> {
        let url = Url::parse(public_url).ok()?;
        if url.origin() != self.base_url.origin() {
            return None;
        }

        let prefix = self.endpoint(&["object", "public", &self.bucket], &[]);
        let prefix_path = prefix.path().trim_end_matches('/');
        let rest = url.path().strip_prefix(prefix_path)?.strip_prefix('/')?;

        let (owner, filename) = rest.split_once('/')?;
        if owner.is_empty() || filename.is_empty() || filename.contains('/') {
            return None;
        }
        Some((owner.to_string(), filename.to_string()))
    }

    fn endpoint(&self, route: &[&str], object: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(["storage", "v1"]);
            segments.extend(route);
            segments.extend(object);
        }
        url
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2
        || segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or(body);

    Err(StorageError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> StorageClient {
        StorageClient::new(
            "https://abc.storage.test/",
            "service-key",
            "avatars",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn public_url_uses_public_route() {
        let url = client().public_url("user-1/profile.png");
        assert_eq!(
            url,
            "https://abc.storage.test/storage/v1/object/public/avatars/user-1/profile.png"
        );
    }

    #[test]
    fn locate_inverts_public_url_and_ignores_query() {
        let c = client();
        let url = format!("{}?v=1700000000000", c.public_url("user-1/profile.svg"));
        assert_eq!(
            c.locate(&url),
            Some(("user-1".to_string(), "profile.svg".to_string()))
        );
    }

    #[test]
    fn locate_rejects_foreign_urls() {
        let c = client();
        assert_eq!(c.locate("https://cdn.example.com/u/profile.png"), None);
        assert_eq!(
            c.locate("https://abc.storage.test/storage/v1/object/public/other/u/p.png"),
            None
        );
        assert_eq!(
            c.locate("https://abc.storage.test/storage/v1/object/public/avatars/only-owner"),
            None
        );
        assert_eq!(c.locate("not a url"), None);
    }

    #[test]
    fn split_path_rejects_traversal_and_bare_names() {
        assert!(split_path("user-1/profile.png").is_ok());
        assert!(split_path("profile.png").is_err());
        assert!(split_path("user-1/../x.png").is_err());
        assert!(split_path("/profile.png").is_err());
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(StorageError::Network("reset".into()).is_transient());
        assert!(StorageError::Api { status: 503, message: String::new() }.is_transient());
        assert!(StorageError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!StorageError::Api { status: 403, message: String::new() }.is_transient());
    }
}
