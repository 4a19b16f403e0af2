//! Blob storage for user profiles.
//!
//! [`BlobStore`] is the seam between the session and wherever profiles live.
//! [`AzureBlobStore`] talks to an Azure Storage container through a SAS token
//! and uploads in fixed-size blocks. [`LocalBlobStore`] keeps blobs as files
//! in a directory and [`MemoryBlobStore`] keeps them in a map for tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::check_status;
use crate::profile::Profile;
use crate::{PrecisError, Result};

/// Block size for staged uploads.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Whole-upload attempts before giving up.
pub const UPLOAD_ATTEMPTS: u32 = 3;

const MS_VERSION: &str = "2021-08-06";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob as UTF-8 text.
    async fn download_text(&self, name: &str) -> Result<String>;

    /// Upload a local file under its file name, returning the blob URL.
    ///
    /// Failures are logged and reported as `None`.
    async fn upload_file(&self, local_path: &Path) -> Option<String>;
}

fn file_name(local_path: &Path) -> Result<String> {
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| PrecisError::Storage(format!("no file name in {}", local_path.display())))
}

/// Azure Storage container addressed by endpoint + SAS token.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    client: Client,
    endpoint: String,
    container: String,
    sas: String,
    chunk_size: usize,
    timeout: u64,
}

impl AzureBlobStore {
    pub fn new(client: Client, endpoint: &str, container: &str, sas: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            container: container.to_string(),
            sas: sas.trim_start_matches('?').to_string(),
            chunk_size: CHUNK_SIZE,
            timeout: 60,
        }
    }

    /// Build a store from a storage connection string.
    ///
    /// The string must carry a `SharedAccessSignature`. The endpoint comes from
    /// `BlobEndpoint`, or is derived from `AccountName` and `EndpointSuffix`.
    pub fn from_connection_string(client: Client, connection_string: &str, container: &str) -> Result<Self> {
        let parts: HashMap<&str, &str> = connection_string
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        let sas = parts.get("SharedAccessSignature").ok_or_else(|| {
            PrecisError::ConfigError("connection string has no SharedAccessSignature".to_string())
        })?;

        let endpoint = match (parts.get("BlobEndpoint"), parts.get("AccountName")) {
            (Some(endpoint), _) => endpoint.to_string(),
            (None, Some(account)) => {
                let suffix = parts.get("EndpointSuffix").copied().unwrap_or("core.windows.net");
                let protocol = parts.get("DefaultEndpointsProtocol").copied().unwrap_or("https");
                format!("{protocol}://{account}.blob.{suffix}")
            }
            (None, None) => {
                return Err(PrecisError::ConfigError(
                    "connection string has neither BlobEndpoint nor AccountName".to_string(),
                ));
            }
        };

        Ok(Self::new(client, &endpoint, container, sas))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Public URL of a blob, without the SAS token.
    pub fn blob_url(&self, name: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}/{}", self.endpoint, self.container, name))
            .map_err(|e| PrecisError::InvalidUrl(e.to_string()))
    }

    fn signed_url(&self, name: &str) -> Result<Url> {
        let mut url = self.blob_url(name)?;
        if !self.sas.is_empty() {
            url.set_query(Some(&self.sas));
        }
        Ok(url)
    }

    /// Stage `data` in blocks `000001`, `000002`, ... and commit them.
    pub async fn upload_blocks(&self, name: &str, data: &[u8]) -> Result<Url> {
        let url = self.signed_url(name)?;
        let mut block_ids = Vec::new();

        for (index, chunk) in data.chunks(self.chunk_size).enumerate() {
            let block_id = STANDARD.encode(format!("{:06}", index + 1));
            let response = self
                .client
                .put(url.clone())
                .query(&[("comp", "block"), ("blockid", block_id.as_str())])
                .header("x-ms-version", MS_VERSION)
                .timeout(Duration::from_secs(self.timeout))
                .body(chunk.to_vec())
                .send()
                .await?;
            check_status("blob storage", response)?;
            debug!(blob = name, block = index + 1, "block uploaded");
            block_ids.push(block_id);
        }

        let response = self
            .client
            .put(url)
            .query(&[("comp", "blocklist")])
            .header("x-ms-version", MS_VERSION)
            .header("Content-Type", "application/xml")
            .timeout(Duration::from_secs(self.timeout))
            .body(block_list_xml(&block_ids))
            .send()
            .await?;
        check_status("blob storage", response)?;

        self.blob_url(name)
    }
}

/// Body of a `Put Block List` request committing `block_ids` in order.
pub fn block_list_xml(block_ids: &[String]) -> String {
    let latest: String = block_ids.iter().map(|id| format!("<Latest>{id}</Latest>")).collect();
    format!("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>{latest}</BlockList>")
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn download_text(&self, name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.signed_url(name)?)
            .header("x-ms-version", MS_VERSION)
            .timeout(Duration::from_secs(self.timeout))
            .send()
            .await?;
        Ok(check_status("blob storage", response)?.text().await?)
    }

    async fn upload_file(&self, local_path: &Path) -> Option<String> {
        let prepared = match file_name(local_path) {
            Ok(name) => tokio::fs::read(local_path).await.map(|data| (name, data)).map_err(PrecisError::from),
            Err(e) => Err(e),
        };
        let (name, data) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "cannot read file for upload");
                return None;
            }
        };

        for attempt in 1..=UPLOAD_ATTEMPTS {
            match self.upload_blocks(&name, &data).await {
                Ok(url) => {
                    info!(blob = %name, "file uploaded");
                    return Some(url.to_string());
                }
                Err(e) => warn!(blob = %name, attempt, error = %e, "upload attempt failed"),
            }
        }

        warn!(blob = %name, "failed to upload file after maximum retries");
        None
    }
}

/// In-process blob store.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, text: &str) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(name.to_string(), text.to_string());
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.blobs.lock().ok().and_then(|blobs| blobs.get(name).cloned())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download_text(&self, name: &str) -> Result<String> {
        self.get(name).ok_or_else(|| PrecisError::Storage(format!("no blob named {name}")))
    }

    async fn upload_file(&self, local_path: &Path) -> Option<String> {
        let name = file_name(local_path).ok()?;
        let text = tokio::fs::read_to_string(local_path).await.ok()?;
        self.insert(&name, &text);
        Some(format!("memory:///{name}"))
    }
}

/// Blobs as files in a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download_text(&self, name: &str) -> Result<String> {
        if !matches!(Path::new(name).components().collect::<Vec<_>>()[..], [Component::Normal(_)]) {
            return Err(PrecisError::Storage(format!("'{name}' is not a plain file name")));
        }
        let path = self.dir.join(name);
        if !path.exists() {
            return Err(PrecisError::FileNotFound(path));
        }
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    async fn upload_file(&self, local_path: &Path) -> Option<String> {
        let copy = async {
            let target = self.dir.join(file_name(local_path)?);
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::copy(local_path, &target).await?;
            Ok::<_, PrecisError>(target)
        };
        match copy.await {
            Ok(target) => Some(format!("file://{}", target.display())),
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "could not store file");
                None
            }
        }
    }
}

/// Loads and saves one user's [`Profile`] through a [`BlobStore`].
#[derive(Clone)]
pub struct ProfileStore {
    store: Arc<dyn BlobStore>,
    user: String,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn BlobStore>, user: impl Into<String>) -> Self {
        Self { store, user: user.into() }
    }

    pub fn blob_name(&self) -> String {
        format!("{}.json", self.user)
    }

    pub async fn load(&self) -> Result<Profile> {
        let text = self.store.download_text(&self.blob_name()).await?;
        Profile::from_json(&text)
    }

    /// Write the profile to a scratch file, upload it, and drop the file.
    pub async fn save(&self, profile: &Profile) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(self.blob_name());
        tokio::fs::write(&path, profile.to_json()?).await?;

        self.store
            .upload_file(&path)
            .await
            .ok_or_else(|| PrecisError::Storage(format!("could not upload {}", self.blob_name())))
    }
}
