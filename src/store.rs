// src/store.rs
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use std::{
    collections::HashMap,
    future::Future,
    path::{Component, Path, PathBuf},
};
use tracing::debug;
use url::Url;

/// Read-only access to the bucket that raised the trigger.
pub trait ObjectStore: Send + Sync {
    /// Fetch the full contents of `bucket/key`.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Buckets are directories under `root`; keys are relative paths inside them.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map `bucket/key` onto the filesystem, refusing anything that would
    /// leave the bucket directory.
    pub fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            bail!("invalid bucket name {:?}", bucket);
        }
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("object key {:?} does not name a file inside the bucket", key);
        }
        Ok(self.root.join(bucket).join(rel))
    }
}

impl ObjectStore for LocalStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(bucket, key)?;
        debug!(path = %path.display(), "reading local object");
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}

/// Path-style GETs against `<endpoint>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    endpoint: Url,
}

impl HttpStore {
    pub fn new(client: Client, endpoint: &str) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("invalid store endpoint {:?}", endpoint))?;
        if endpoint.cannot_be_a_base() {
            bail!("store endpoint {} cannot carry a path", endpoint);
        }
        Ok(Self { client, endpoint })
    }

    /// Each key segment is percent-encoded on its own, so `/` keeps its
    /// meaning and everything else is sent literally.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("store endpoint {} cannot carry a path", self.endpoint))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

impl ObjectStore for HttpStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key)?;
        debug!(url = %url, "fetching object");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("GET {}", url))?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("reading body of {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// In-process objects, keyed by `(bucket, key)`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: HashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.objects
            .insert((bucket.to_string(), key.to_string()), data.into());
    }
}

impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("no such object"))
    }
}
