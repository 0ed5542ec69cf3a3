//! Disk-backed keyed file store
//!
//! Each entry is one file, `<dir>/<percent-encoded key>.<ext>`. Keys whose
//! encoding would not fit in a file name are stored under `+<sha256 of key>`
//! instead; `+` never survives percent-encoding, so the two forms cannot
//! collide. Writes go to a hidden temp file first and are renamed into place,
//! so concurrent writers of the same key produce last-writer-wins, never a
//! torn file.
//!
//! The in-memory index is rebuilt from the directory on open (oldest mtime
//! first), which keeps entries across restarts and gives the optional
//! count-bounded LRU eviction a sensible starting order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ResolveError, Result};

use super::CacheStats;

const TEMP_SUFFIX: &str = ".tmp";
/// Longest percent-encoded stem kept verbatim; leaves room for the extension
/// under the usual 255-byte file name limit
const MAX_STEM_LEN: usize = 200;

/// Keyed file store with an optional entry-count bound.
///
/// The index is keyed by file stem, so entries written under hashed stems
/// are found again after a reopen.
pub struct DiskPathStore {
    tier: &'static str,
    dir: PathBuf,
    extension: String,
    max_entries: Option<usize>,
    index: Mutex<LruCache<String, PathBuf>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    evictions: AtomicU64,
}

impl DiskPathStore {
    /// Open (creating if needed) the store rooted at `dir`
    pub async fn open(
        tier: &'static str,
        dir: impl Into<PathBuf>,
        extension: &str,
        max_entries: Option<usize>,
    ) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            tier,
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            max_entries: max_entries.filter(|n| *n > 0),
            index: Mutex::new(LruCache::unbounded()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        };
        store.load_index().await?;
        Ok(store)
    }

    async fn load_index(&self) -> Result<()> {
        let mut found: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                // interrupted write from an earlier run
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }

            let Some(stem) = self.stem_from_file_name(name) else {
                continue;
            };
            let stem = stem.to_string();
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, stem, path));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        let count = found.len();
        {
            let mut index = self.index.lock().await;
            for (_, stem, path) in found {
                index.put(stem, path);
            }
        }
        self.enforce_capacity().await;

        tracing::debug!(tier = self.tier, dir = %self.dir.display(), entries = count, "Opened disk cache tier");
        Ok(())
    }

    pub fn tier(&self) -> &'static str {
        self.tier
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of the file for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem_for(key), self.extension))
    }

    fn stem_from_file_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let stem = name.strip_suffix(&format!(".{}", self.extension))?;
        (!stem.is_empty()).then_some(stem)
    }

    /// Indexed path for `key`. The file itself is not checked.
    pub async fn get(&self, key: &str) -> Option<PathBuf> {
        let found = self.index.lock().await.get(&stem_for(key)).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Copy `source` into the store under `key`
    pub async fn put_file(&self, key: &str, source: &Path) -> Result<PathBuf> {
        let result = self.write_entry(key, WriteSource::File(source)).await;
        self.record_write(&result);
        result
    }

    /// Write `data` into the store under `key`
    pub async fn put_bytes(&self, key: &str, data: &[u8]) -> Result<PathBuf> {
        let result = self.write_entry(key, WriteSource::Bytes(data)).await;
        self.record_write(&result);
        result
    }

    async fn write_entry(&self, key: &str, source: WriteSource<'_>) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(ResolveError::Storage(format!("{}: empty cache key", self.tier)));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let temp = self.dir.join(format!(".{}{}", Uuid::new_v4(), TEMP_SUFFIX));
        let written = match source {
            WriteSource::File(path) => tokio::fs::copy(path, &temp).await.map(|_| ()),
            WriteSource::Bytes(data) => tokio::fs::write(&temp, data).await,
        };

        let target = self.path_for(key);
        let renamed = match written {
            Ok(()) => tokio::fs::rename(&temp, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = renamed {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ResolveError::Storage(format!(
                "{}: failed to write {}: {}",
                self.tier,
                target.display(),
                e
            )));
        }

        self.index.lock().await.put(stem_for(key), target.clone());
        self.enforce_capacity().await;
        Ok(target)
    }

    fn record_write(&self, result: &Result<PathBuf>) {
        match result {
            Ok(_) => self.writes.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.write_failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    async fn enforce_capacity(&self) {
        let Some(max) = self.max_entries else {
            return;
        };

        let evicted: Vec<(String, PathBuf)> = {
            let mut index = self.index.lock().await;
            let mut evicted = Vec::new();
            while index.len() > max {
                match index.pop_lru() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
            evicted
        };

        for (stem, path) in evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            remove_quietly(&path).await;
            tracing::debug!(tier = self.tier, entry = %stem, "Evicted least recently used entry");
        }
    }

    /// Drop `key` from the index and delete its file
    pub async fn remove(&self, key: &str) {
        let removed = self.index.lock().await.pop(&stem_for(key));
        if let Some(path) = removed {
            remove_quietly(&path).await;
        }
    }

    /// Delete every entry
    pub async fn clear(&self) -> Result<()> {
        let paths: Vec<PathBuf> = {
            let mut index = self.index.lock().await;
            let paths = index.iter().map(|(_, p)| p.clone()).collect();
            index.clear();
            paths
        };
        for path in paths {
            remove_quietly(&path).await;
        }

        // Files written by other processes or left unindexed
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() {
                remove_quietly(&path).await;
            }
        }

        tracing::info!(tier = self.tier, "Cleared cache tier");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// File stem for `key`: percent-encoded, or hashed when that is too long
fn stem_for(key: &str) -> String {
    let encoded = urlencoding::encode(key);
    if encoded.len() <= MAX_STEM_LEN {
        return encoded.into_owned();
    }
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("+{}", hex::encode(hasher.finalize()))
}

enum WriteSource<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete cache file");
        }
    }
}
