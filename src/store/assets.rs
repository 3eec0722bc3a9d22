// Image hosting seam: raw bytes in, public URL out

use async_trait::async_trait;
use log::info;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Empty upload")]
    Empty,
}

#[async_trait]
pub trait AssetHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, AssetError>;
}

/// Content-addressed in-memory host. Identical uploads share one URL.
pub struct MemoryAssetHost {
    base_url: String,
    assets: TokioMutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetHost {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            assets: TokioMutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        let digest = url.rsplit('/').next()?;
        self.assets.lock().await.get(digest).cloned()
    }
}

impl Default for MemoryAssetHost {
    fn default() -> Self {
        Self::new("memory://assets")
    }
}

#[async_trait]
impl AssetHost for MemoryAssetHost {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, AssetError> {
        if bytes.is_empty() {
            return Err(AssetError::Empty);
        }
        let digest = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len();
        self.assets.lock().await.insert(digest.clone(), bytes);
        info!("Hosted image {} ({} bytes)", digest, size);
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_is_content_addressed() {
        let host = MemoryAssetHost::default();
        let first = host.upload(b"png bytes".to_vec()).await.unwrap();
        let second = host.upload(b"png bytes".to_vec()).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("memory://assets/"));
        assert_eq!(host.get(&first).await, Some(b"png bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let host = MemoryAssetHost::default();
        assert!(matches!(host.upload(Vec::new()).await, Err(AssetError::Empty)));
    }
}
