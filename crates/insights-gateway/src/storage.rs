//! Object storage for article attachments.

use crate::{summarize_response_body, GatewayError, GatewayResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

/// Bucket-addressed blob storage with public URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `bucket/path`. Returns the stored path.
    ///
    /// An existing object at the same path is a conflict.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<String>;

    /// Public URL of an object.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Upload as the given user (access token) or anonymously.
    fn set_access_token(&self, _access_token: Option<String>) {}
}

/// Hosted storage API (`/storage/v1/object`).
#[derive(Clone)]
pub struct SupabaseStorage {
    http_client: reqwest::Client,
    api_url: Url,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseStorage {
    pub fn new(api_url: Url, anon_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, anon_key)
    }

    pub fn with_client(http_client: reqwest::Client, api_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_url,
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    fn object_url(&self, segments: &[&str]) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}/storage/v1/object/{}", segments.join("/"))
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<String> {
        let url = self.object_url(&[bucket, path]);
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());
        debug!(bucket, path, size = bytes.len(), "Uploading object");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, bucket, body = %summarize_response_body(&body), "Upload failed");
            return Err(GatewayError::from_response(status, &body, &format!("storage/{bucket}")));
        }

        debug!(bucket, path, "Object uploaded");
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.object_url(&["public", bucket, path])
    }

    fn set_access_token(&self, access_token: Option<String>) {
        *self.access_token.write() = access_token;
    }
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process object storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

const MEMORY_STORAGE_BASE: &str = "memory://storage";

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<String> {
        let mut objects = self.objects.lock();
        let key = (bucket.to_string(), path.to_string());
        if objects.contains_key(&key) {
            return Err(GatewayError::Conflict(format!(
                "object {bucket}/{path} already exists"
            )));
        }
        objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{MEMORY_STORAGE_BASE}/{bucket}/{path}")
    }
}
