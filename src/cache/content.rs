//! Documents keyed by normalized locator
//!
//! Keys are `locator::content_key` digests, so the same file shared under
//! two identifiers is stored once here.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::ResolverConfig;
use crate::document::ValidatedDocument;
use crate::error::Result;

use super::{CacheStats, DiskPathStore, PathCache};

const TIER: &str = "content";

/// `<cacheDir>/Documents/by-content/<key>.pdf`
pub struct ContentCache {
    store: DiskPathStore,
}

impl ContentCache {
    pub async fn open(config: &ResolverConfig) -> Result<Self> {
        let store = DiskPathStore::open(
            TIER,
            config.content_dir(),
            "pdf",
            config.storage.document_cache_max_entries,
        )
        .await?;
        Ok(Self { store })
    }

    /// Stored bytes for `key`; `None` if absent or unreadable
    pub async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.store.get(key).await?;
        match tokio::fs::read(&path).await {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!(tier = TIER, key = key, error = %e, "Indexed entry unreadable");
                None
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.stats().await
    }
}

#[async_trait]
impl PathCache for ContentCache {
    fn tier(&self) -> &'static str {
        TIER
    }

    async fn get(&self, key: &str) -> Option<PathBuf> {
        self.store.get(key).await
    }

    async fn put(&self, key: &str, doc: &ValidatedDocument) -> Result<ValidatedDocument> {
        let path = self.store.put_file(key, doc.path()).await?;
        Ok(doc.relocated(path))
    }

    async fn remove(&self, key: &str) {
        self.store.remove(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    async fn len(&self) -> usize {
        self.store.len().await
    }
}
