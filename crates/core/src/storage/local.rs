use super::{validate_key, ObjectStorage};
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use url::Url;

/// Filesystem storage for self-hosting. Public URLs point at the server's
/// `/files` route when a base URL is configured, otherwise at `file://`.
pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn resolve_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.resolve_path(key)?;
        fs::create_dir_all(&self.base_path).await?;
        fs::write(&path, data).await?;
        self.public_url(key)
    }

    fn public_url(&self, key: &str) -> Result<String, StorageError> {
        let path = self.resolve_path(key)?;
        Ok(match &self.public_base_url {
            Some(base) => {
                let mut url = Url::parse(base)?;
                url.path_segments_mut()
                    .map_err(|()| StorageError::InvalidKey(format!("{base} cannot be a base")))?
                    .pop_if_empty()
                    .push(key);
                url.to_string()
            }
            None => format!("file://{}", path.display()),
        })
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove(&self, keys: &[String]) -> Result<usize, StorageError> {
        let mut removed = 0;
        for key in keys {
            let path = self.resolve_path(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(removed)
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
