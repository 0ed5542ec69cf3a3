//! Two-tier thumbnail cache
//!
//! A bounded in-memory LRU in front of a disk tier. Reads fall through memory
//! to disk and promote disk hits. Writes always land in memory; the disk
//! write is best effort and a failure is only logged and counted.

use std::io::Cursor;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{ResolverConfig, ThumbnailFormat};
use crate::document::Thumbnail;
use crate::error::Result;

use super::{report_write_failure, CacheStats, DiskPathStore};

const DISK_TIER: &str = "thumbnail_disk";

/// Thumbnail lookup and storage by document identifier
#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Thumbnail>;

    /// Never fails; tiers that cannot store the thumbnail are skipped
    async fn put(&self, id: &str, thumbnail: Thumbnail);

    /// Drop the memory tier only
    fn purge_memory(&self);

    /// Drop both tiers
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ThumbnailCacheStats {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub memory_bytes: usize,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub disk_write_failures: u64,
    pub disk: CacheStats,
}

pub struct TieredThumbnailCache {
    memory: Mutex<LruCache<String, Thumbnail>>,
    capacity: usize,
    disk: DiskPathStore,
    format: ThumbnailFormat,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    disk_write_failures: AtomicU64,
}

impl TieredThumbnailCache {
    /// Open with the memory capacity and disk layout from `config`
    pub async fn open(config: &ResolverConfig) -> Result<Self> {
        let disk = DiskPathStore::open(
            DISK_TIER,
            config.thumbnail_dir(),
            config.thumbnails.format.extension(),
            config.thumbnails.disk_max_entries,
        )
        .await?;
        Ok(Self::with_disk(
            disk,
            config.thumbnails.memory_capacity,
            config.thumbnails.format,
        ))
    }

    pub fn with_disk(disk: DiskPathStore, memory_capacity: usize, format: ThumbnailFormat) -> Self {
        let capacity = NonZeroUsize::new(memory_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            disk,
            format,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            disk_write_failures: AtomicU64::new(0),
        }
    }

    async fn read_disk(&self, id: &str) -> Option<Thumbnail> {
        let path = self.disk.get(id).await?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(tier = DISK_TIER, key = id, error = %e, "Dropping unreadable thumbnail");
                self.disk.remove(id).await;
                return None;
            }
        };

        let dimensions = image::ImageReader::with_format(Cursor::new(&data), self.format.image_format())
            .into_dimensions();
        match dimensions {
            Ok((width, height)) => Some(Thumbnail::new(data, width, height, self.format)),
            Err(e) => {
                tracing::debug!(tier = DISK_TIER, key = id, error = %e, "Dropping undecodable thumbnail");
                self.disk.remove(id).await;
                None
            }
        }
    }

    pub async fn stats(&self) -> ThumbnailCacheStats {
        let (memory_entries, memory_bytes) = {
            let memory = self.memory.lock();
            let bytes = memory.iter().map(|(_, t)| t.byte_len()).sum();
            (memory.len(), bytes)
        };
        ThumbnailCacheStats {
            memory_entries,
            memory_capacity: self.capacity,
            memory_bytes,
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            disk_write_failures: self.disk_write_failures.load(Ordering::Relaxed),
            disk: self.disk.stats().await,
        }
    }
}

#[async_trait]
impl ThumbnailStore for TieredThumbnailCache {
    async fn get(&self, id: &str) -> Option<Thumbnail> {
        let cached = self.memory.lock().get(id).cloned();
        if let Some(hit) = cached {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(hit);
        }

        match self.read_disk(id).await {
            Some(thumbnail) => {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.lock().put(id.to_string(), thumbnail.clone());
                Some(thumbnail)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn put(&self, id: &str, thumbnail: Thumbnail) {
        let data = thumbnail.data.clone();
        self.memory.lock().put(id.to_string(), thumbnail);

        if let Err(e) = self.disk.put_bytes(id, &data).await {
            self.disk_write_failures.fetch_add(1, Ordering::Relaxed);
            report_write_failure(DISK_TIER, id, &e);
        }
    }

    fn purge_memory(&self) {
        let mut memory = self.memory.lock();
        let dropped = memory.len();
        memory.clear();
        tracing::info!(entries = dropped, "Purged thumbnail memory tier");
    }

    async fn clear(&self) -> Result<()> {
        self.memory.lock().clear();
        self.disk.clear().await
    }
}
