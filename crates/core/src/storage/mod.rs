pub mod local;
pub mod supabase;

pub use local::LocalStorage;
pub use supabase::SupabaseStorage;

use crate::error::StorageError;
use async_trait::async_trait;

/// Object storage for the original uploaded files.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Writes `data` under `key`, replacing any existing object, and returns
    /// the object's public URL.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str)
        -> Result<String, StorageError>;

    fn public_url(&self, key: &str) -> Result<String, StorageError>;

    /// Keys of every stored object.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Removes the given keys and returns how many were removed.
    async fn remove(&self, keys: &[String]) -> Result<usize, StorageError>;

    fn provider_name(&self) -> &'static str;
}

/// Keys are flat file names; anything that could escape the bucket is refused.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key == "."
        || key == ".."
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
