//! Listing service boundary
//!
//! The listing collaborator owns document metadata. The resolver only asks it
//! one question: is there another locator for this document?

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

/// Secondary metadata lookup against the listing service
#[async_trait]
pub trait ListingService: Send + Sync {
    /// A fallback locator for the document, if the listing knows one
    async fn alternate_locator(&self, document_id: &str) -> Result<Option<String>>;
}

/// In-memory listing, for hosts that already hold the metadata
#[derive(Default)]
pub struct StaticListing {
    locators: RwLock<HashMap<String, String>>,
}

impl StaticListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: impl Into<String>, locator: impl Into<String>) {
        self.locators.write().insert(document_id.into(), locator.into());
    }
}

#[async_trait]
impl ListingService for StaticListing {
    async fn alternate_locator(&self, document_id: &str) -> Result<Option<String>> {
        Ok(self.locators.read().get(document_id).cloned())
    }
}
