//! Process-local `PathCache`
//!
//! Records paths without copying files. Suited to hosts that manage their own
//! storage, and to tests that inject a cache.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::document::ValidatedDocument;
use crate::error::Result;

use super::PathCache;

pub struct MemoryPathCache {
    tier: &'static str,
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl MemoryPathCache {
    pub fn new(tier: &'static str) -> Self {
        Self {
            tier,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PathCache for MemoryPathCache {
    fn tier(&self) -> &'static str {
        self.tier
    }

    async fn get(&self, key: &str) -> Option<PathBuf> {
        self.entries.read().get(key).cloned()
    }

    async fn put(&self, key: &str, doc: &ValidatedDocument) -> Result<ValidatedDocument> {
        self.entries
            .write()
            .insert(key.to_string(), doc.path().to_path_buf());
        Ok(doc.clone())
    }

    async fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.read().len()
    }
}
