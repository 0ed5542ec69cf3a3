//! Documents keyed by stable identifier

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::ResolverConfig;
use crate::document::ValidatedDocument;
use crate::error::Result;

use super::{CacheStats, DiskPathStore, PathCache};

const TIER: &str = "identity";

/// `<cacheDir>/Documents/by-id/<encoded id>.pdf`
pub struct IdentityCache {
    store: DiskPathStore,
}

impl IdentityCache {
    pub async fn open(config: &ResolverConfig) -> Result<Self> {
        let store = DiskPathStore::open(
            TIER,
            config.identity_dir(),
            "pdf",
            config.storage.document_cache_max_entries,
        )
        .await?;
        Ok(Self { store })
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.stats().await
    }
}

#[async_trait]
impl PathCache for IdentityCache {
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
