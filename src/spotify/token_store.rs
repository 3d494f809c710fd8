use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{TokenStoreConfig, TokenStoreProvider};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds after which the access token is stale.
    pub expires_at: i64,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<SpotifyToken>>;
    async fn set(&self, user_id: &str, token: SpotifyToken) -> Result<()>;
    async fn delete(&self, user_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    data: Mutex<HashMap<String, SpotifyToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<SpotifyToken>> {
        Ok(self.data.lock().get(user_id).cloned())
    }

    async fn set(&self, user_id: &str, token: SpotifyToken) -> Result<()> {
        self.data.lock().insert(user_id.to_string(), token);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        self.data.lock().remove(user_id);
        Ok(())
    }
}

/// JSON-file-backed store. Writes go to a temp file and rename into
/// place so a crash never leaves a half-written token file.
pub struct FileTokenStore {
    path: PathBuf,
    cache: AsyncMutex<Option<HashMap<String, SpotifyToken>>>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: AsyncMutex::new(None),
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, SpotifyToken>> {
        let mut cache = self.cache.lock().await;
        if let Some(data) = cache.as_ref() {
            return Ok(data.clone());
        }

        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => return Err(error.into()),
        };
        *cache = Some(data.clone());
        Ok(data)
    }

    async fn write_all(&self, data: HashMap<String, SpotifyToken>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serde_json::to_string_pretty(&data)?).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        *self.cache.lock().await = Some(data);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<SpotifyToken>> {
        Ok(self.read_all().await?.remove(user_id))
    }

    async fn set(&self, user_id: &str, token: SpotifyToken) -> Result<()> {
        let mut all = self.read_all().await?;
        all.insert(user_id.to_string(), token);
        self.write_all(all).await
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let mut all = self.read_all().await?;
        all.remove(user_id);
        self.write_all(all).await
    }
}

pub fn create_token_store(config: &TokenStoreConfig) -> Arc<dyn TokenStore> {
    match config.provider {
        TokenStoreProvider::Memory => Arc::new(MemoryTokenStore::new()),
        TokenStoreProvider::File => Arc::new(FileTokenStore::new(config.file.clone())),
    }
}
