//! Raw model responses keyed by chunk index, so a rerun does not pay for an
//! LLM call twice.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn has(&self, chunk_index: usize) -> bool;

    async fn get(&self, chunk_index: usize) -> Result<Option<String>>;

    async fn put(&self, chunk_index: usize, response: &str) -> Result<()>;

    /// Forget every cached response
    async fn clear(&self) -> Result<()>;
}

/// One `chunk_<n>.txt` file per cached response
#[derive(Debug, Clone)]
pub struct FileResponseCache {
    dir: PathBuf,
}

impl FileResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, chunk_index: usize) -> PathBuf {
        self.dir.join(format!("chunk_{}.txt", chunk_index))
    }
}

#[async_trait]
impl ResponseCache for FileResponseCache {
    async fn has(&self, chunk_index: usize) -> bool {
        tokio::fs::metadata(self.path(chunk_index)).await.is_ok()
    }

    async fn get(&self, chunk_index: usize) -> Result<Option<String>> {
        let path = self.path(chunk_index);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Cache hit: {}", path.display());
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, chunk_index: usize, response: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path(chunk_index), response).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process cache for tests and embedders that keep no files
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    responses: Mutex<HashMap<usize, String>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn has(&self, chunk_index: usize) -> bool {
        self.responses
            .lock()
            .map(|r| r.contains_key(&chunk_index))
            .unwrap_or(false)
    }

    async fn get(&self, chunk_index: usize) -> Result<Option<String>> {
        let responses = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))?;
        Ok(responses.get(&chunk_index).cloned())
    }

    async fn put(&self, chunk_index: usize, response: &str) -> Result<()> {
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))?;
        responses.insert(chunk_index, response.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.responses
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = FileResponseCache::new(dir.path().join("raw"));

        assert!(!cache.has(3).await);
        assert_eq!(cache.get(3).await.unwrap(), None);

        cache.put(3, "[{\"outline\": \"Intro\"}]").await.unwrap();
        assert!(cache.has(3).await);
        assert_eq!(cache.get(3).await.unwrap().as_deref(), Some("[{\"outline\": \"Intro\"}]"));
        assert!(dir.path().join("raw").join("chunk_3.txt").exists());

        cache.clear().await.unwrap();
        assert!(!cache.has(3).await);
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_cache_overwrites() {
        let cache = MemoryResponseCache::new();
        cache.put(0, "first").await.unwrap();
        cache.put(0, "second").await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(0).await.unwrap().as_deref(), Some("second"));
        assert!(!cache.has(1).await);

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
    }
}
