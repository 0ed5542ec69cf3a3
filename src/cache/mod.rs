//! Cache tiers
//!
//! Two document keyspaces over the same disk store (by identifier and by
//! content key), plus the memory + disk thumbnail cache. Stores never
//! validate; `PathCache::put` only accepts a `ValidatedDocument`.

mod content;
mod disk;
mod identity;
mod memory;
mod thumbnail;

pub use content::ContentCache;
pub use disk::DiskPathStore;
pub use identity::IdentityCache;
pub use memory::MemoryPathCache;
pub use thumbnail::{ThumbnailCacheStats, ThumbnailStore, TieredThumbnailCache};

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::document::ValidatedDocument;
use crate::error::{ResolveError, Result};

/// Key → local document path
#[async_trait]
pub trait PathCache: Send + Sync {
    /// Name used in log events and stats
    fn tier(&self) -> &'static str;

    /// Stored path for `key`, without checking the file still exists
    async fn get(&self, key: &str) -> Option<PathBuf>;

    /// Store a copy of `doc` and return the stored location
    async fn put(&self, key: &str, doc: &ValidatedDocument) -> Result<ValidatedDocument>;

    async fn remove(&self, key: &str);

    async fn clear(&self) -> Result<()>;

    async fn len(&self) -> usize;
}

/// Counters for one cache tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Structured event for a cache write that was dropped
pub(crate) fn report_write_failure(tier: &str, key: &str, error: &ResolveError) {
    tracing::warn!(
        tier = tier,
        key = key,
        error = %error,
        "Cache write failed, continuing without it"
    );
}
