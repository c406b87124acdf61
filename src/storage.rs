//! Object storage for generated documents.
//!
//! Three backends share the [`ObjectStorage`] trait:
//! - [`LocalStorage`] - files under the public output directory, served by actix-files
//! - [`SupabaseStorage`] - a Supabase Storage bucket over its REST API
//! - [`InlineStorage`] - no persistence; the "URL" is a base64 data URL

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("storage rejected '{key}' with status {status}: {body}")]
    Rejected {
        key: String,
        status: u16,
        body: String,
    },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key` and return the URL it can be downloaded from.
    async fn upload_file(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete_file(&self, key: &str) -> Result<(), StorageError>;
}

/// `given` when set, otherwise guessed from the key's extension.
pub fn resolve_content_type(key: &str, given: &str) -> String {
    if given.trim().is_empty() {
        mime_guess::from_path(key)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    } else {
        given.to_string()
    }
}

/// Keys are relative `/`-separated paths without `.`/`..` segments.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Files written below `root` and published under `public_base`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload_file(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let path = self.root.join(key);
        let data = data.to_vec();

        // Written to a temp file first so a reader never sees a partial document.
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let mut temp_file = NamedTempFile::new_in(dir)?;
            temp_file.write_all(&data)?;
            temp_file.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        log::debug!("Stored {} under {}", key, self.root.display());
        Ok(self.public_url(key))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub bucket_name: String,
}

pub struct SupabaseStorage {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn base_url(&self) -> &str {
        self.config.supabase_url.trim_end_matches('/')
    }

    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url(),
            self.config.bucket_name,
            key
        )
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url(),
            self.config.bucket_name,
            key
        )
    }

    async fn check(key: &str, response: reqwest::Response) -> Result<(), StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        log::error!("Supabase storage rejected {}: {} {}", key, status, body);
        Err(StorageError::Rejected {
            key: key.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload_file(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.config.supabase_anon_key)
            .header("apikey", &self.config.supabase_anon_key)
            .header(
                reqwest::header::CONTENT_TYPE,
                resolve_content_type(key, content_type),
            )
            .header("x-upsert", "true")
            .body(data.to_vec())
            .send()
            .await?;
        Self::check(key, response).await?;

        log::debug!("Uploaded {} to bucket {}", key, self.config.bucket_name);
        Ok(self.public_url(key))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.config.supabase_anon_key)
            .header("apikey", &self.config.supabase_anon_key)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(key, response).await
    }
}

/// Returns documents inline as `data:` URLs; nothing is kept server-side.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineStorage;

#[async_trait]
impl ObjectStorage for InlineStorage {
    async fn upload_file(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!(
            "data:{};base64,{}",
            resolve_content_type(key, content_type),
            STANDARD.encode(data)
        ))
    }

    async fn delete_file(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
