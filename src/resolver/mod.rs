//! Resolution orchestrator
//!
//! Turns a `DocumentRef` into a locally readable, validated document by
//! walking an ordered fallback chain. The first source that yields a file
//! passing validation wins:
//!
//! ```text
//! identity cache ─► content cache ─► literal path ─► local scan
//!        ─► remote (primary locator) ─► remote (alternate locator)
//!        ─► placeholder + soft error
//! ```
//!
//! Concurrent requests for the same identifier share one run of the chain.
//! Successful remote fetches are written to both document caches; failed
//! cache writes are logged and otherwise ignored.

mod completion;
mod retry;
mod scan;
mod singleflight;

pub use completion::CompletionSink;
pub use retry::RetryPolicy;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Url;
use tokio::task::JoinHandle;

use crate::cache::{
    report_write_failure, ContentCache, IdentityCache, PathCache, ThumbnailStore,
    TieredThumbnailCache,
};
use crate::config::ResolverConfig;
use crate::document::{
    Artifact, DocumentRef, ListingService, LocalDocument, Resolution, ResolutionSource, Thumbnail,
    ThumbnailResolution, ValidatedDocument,
};
use crate::error::{ResolveError, Result};
use crate::fetch::{sweep_temp_dir, BlobFetcher, HttpFetcher};
use crate::locator;
use crate::pdf::{placeholder_record, placeholder_thumbnail, DocumentValidator, ThumbnailRenderer};

use singleflight::SingleFlight;

/// Assembles a `Resolver`, opening default collaborators for anything not
/// injected
pub struct ResolverBuilder {
    config: ResolverConfig,
    identity: Option<Arc<dyn PathCache>>,
    content: Option<Arc<dyn PathCache>>,
    thumbnails: Option<Arc<dyn ThumbnailStore>>,
    fetcher: Option<Arc<dyn BlobFetcher>>,
    listing: Option<Arc<dyn ListingService>>,
    retry: Option<RetryPolicy>,
    scan_roots: Vec<PathBuf>,
}

impl ResolverBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            identity: None,
            content: None,
            thumbnails: None,
            fetcher: None,
            listing: None,
            retry: None,
            scan_roots: Vec::new(),
        }
    }

    pub fn identity_cache(mut self, cache: Arc<dyn PathCache>) -> Self {
        self.identity = Some(cache);
        self
    }

    pub fn content_cache(mut self, cache: Arc<dyn PathCache>) -> Self {
        self.content = Some(cache);
        self
    }

    pub fn thumbnail_store(mut self, store: Arc<dyn ThumbnailStore>) -> Self {
        self.thumbnails = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn BlobFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn listing(mut self, listing: Arc<dyn ListingService>) -> Self {
        self.listing = Some(listing);
        self
    }

    /// Overrides the policy derived from the fetch config
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Extra directory for the local identifier scan (the data dir is
    /// always scanned)
    pub fn scan_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scan_roots.push(root.into());
        self
    }

    pub async fn build(self) -> Result<Resolver> {
        let config = self.config;

        let identity: Arc<dyn PathCache> = match self.identity {
            Some(cache) => cache,
            None => Arc::new(IdentityCache::open(&config).await?),
        };
        let content: Arc<dyn PathCache> = match self.content {
            Some(cache) => cache,
            None => Arc::new(ContentCache::open(&config).await?),
        };
        let thumbnails: Arc<dyn ThumbnailStore> = match self.thumbnails {
            Some(store) => store,
            None => Arc::new(TieredThumbnailCache::open(&config).await?),
        };
        let fetcher: Arc<dyn BlobFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&config)?),
        };

        sweep_temp_dir(&config.temp_dir()).await;

        let mut scan_roots = vec![config.storage.data_dir.clone()];
        scan_roots.extend(self.scan_roots);

        let inner = ResolverInner {
            identity,
            content,
            thumbnails,
            fetcher,
            listing: self.listing,
            validator: DocumentValidator::new(),
            renderer: ThumbnailRenderer::new(&config.thumbnails),
            retry: self.retry.unwrap_or_else(|| RetryPolicy::from_config(&config.fetch)),
            placeholder: placeholder_thumbnail(&config.thumbnails)?,
            scan_roots,
            documents: SingleFlight::new(),
            thumbnail_flights: SingleFlight::new(),
            config,
        };

        tracing::info!(
            cache_dir = %inner.config.storage.cache_dir.display(),
            data_dir = %inner.config.storage.data_dir.display(),
            fetch_attempts = inner.retry.max_attempts(),
            "Document resolver ready"
        );

        Ok(Resolver {
            inner: Arc::new(inner),
        })
    }
}

struct ResolverInner {
    config: ResolverConfig,
    identity: Arc<dyn PathCache>,
    content: Arc<dyn PathCache>,
    thumbnails: Arc<dyn ThumbnailStore>,
    fetcher: Arc<dyn BlobFetcher>,
    listing: Option<Arc<dyn ListingService>>,
    validator: DocumentValidator,
    renderer: ThumbnailRenderer,
    retry: RetryPolicy,
    placeholder: Thumbnail,
    scan_roots: Vec<PathBuf>,
    documents: SingleFlight<LocalDocument>,
    thumbnail_flights: SingleFlight<Thumbnail>,
}

/// Cheap to clone; clones share caches and in-flight requests
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl Resolver {
    pub fn builder(config: ResolverConfig) -> ResolverBuilder {
        ResolverBuilder::new(config)
    }

    /// Resolver with the default disk caches and HTTP fetcher
    pub async fn new(config: ResolverConfig) -> Result<Self> {
        ResolverBuilder::new(config).build().await
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Resolve for display. Never fails: exhaustion yields a placeholder
    /// record carrying the cause as a soft error.
    pub async fn resolve(&self, doc: &DocumentRef) -> Resolution {
        match self.resolve_strict(doc).await {
            Ok(local) => Resolution {
                artifact: Artifact::Local(local),
                soft_error: None,
            },
            Err(e) => Resolution {
                artifact: Artifact::Placeholder(placeholder_record(doc, &e)),
                soft_error: Some(e),
            },
        }
    }

    /// Resolve, returning the failure of the last source tried as a hard error
    pub async fn resolve_strict(&self, doc: &DocumentRef) -> Result<LocalDocument> {
        if doc.id.is_empty() {
            return self.inner.run_chain(doc).await;
        }

        let inner = self.inner.clone();
        let owned = doc.clone();
        self.inner
            .documents
            .run(&doc.id, async move { inner.run_chain(&owned).await })
            .await
    }

    /// First-page preview for display. Never fails: any error yields the
    /// placeholder tile with the cause as a soft error.
    pub async fn thumbnail(&self, doc: &DocumentRef) -> ThumbnailResolution {
        match self.thumbnail_strict(doc).await {
            Ok(thumbnail) => ThumbnailResolution {
                thumbnail,
                is_placeholder: false,
                soft_error: None,
            },
            Err(e) => {
                tracing::warn!(
                    document_id = %doc.id,
                    kind = e.kind(),
                    error = %e,
                    "Thumbnail unavailable, using placeholder"
                );
                ThumbnailResolution {
                    thumbnail: self.inner.placeholder.clone(),
                    is_placeholder: true,
                    soft_error: Some(e),
                }
            }
        }
    }

    /// Cached thumbnail, or resolve + render + cache
    pub async fn thumbnail_strict(&self, doc: &DocumentRef) -> Result<Thumbnail> {
        if !doc.id.is_empty() {
            if let Some(hit) = self.inner.thumbnails.get(&doc.id).await {
                return Ok(hit);
            }
        }

        let this = self.clone();
        let owned = doc.clone();
        let work = async move {
            let local = this.resolve_strict(&owned).await?;
            let thumbnail = this.inner.renderer.render(&local.validated()).await?;
            this.inner.thumbnails.put(&owned.id, thumbnail.clone()).await;
            tracing::debug!(
                document_id = %owned.id,
                width = thumbnail.width,
                height = thumbnail.height,
                bytes = thumbnail.byte_len(),
                "Rendered thumbnail"
            );
            Ok(thumbnail)
        };

        if doc.id.is_empty() {
            work.await
        } else {
            self.inner.thumbnail_flights.run(&doc.id, work).await
        }
    }

    /// Resolve in the background and report to `sink` if it is still alive
    pub fn resolve_detached<S>(&self, doc: DocumentRef, sink: &Arc<S>) -> JoinHandle<()>
    where
        S: CompletionSink + ?Sized + 'static,
    {
        let sink = Arc::downgrade(sink);
        let this = self.clone();
        tokio::spawn(async move {
            let resolution = this.resolve(&doc).await;
            match sink.upgrade() {
                Some(sink) => sink.on_document(&doc.id, resolution),
                None => {
                    tracing::debug!(document_id = %doc.id, "Completion sink gone, dropping result")
                }
            }
        })
    }

    /// Produce a thumbnail in the background and report to `sink` if it is
    /// still alive
    pub fn thumbnail_detached<S>(&self, doc: DocumentRef, sink: &Arc<S>) -> JoinHandle<()>
    where
        S: CompletionSink + ?Sized + 'static,
    {
        let sink = Arc::downgrade(sink);
        let this = self.clone();
        tokio::spawn(async move {
            let thumbnail = this.thumbnail(&doc).await;
            match sink.upgrade() {
                Some(sink) => sink.on_thumbnail(&doc.id, thumbnail),
                None => {
                    tracing::debug!(document_id = %doc.id, "Completion sink gone, dropping thumbnail")
                }
            }
        })
    }

    /// Empty every cache tier. All tiers are attempted; the first error is
    /// returned.
    pub async fn clear_cache(&self) -> Result<()> {
        let identity = self.inner.identity.clear().await;
        let content = self.inner.content.clear().await;
        let thumbnails = self.inner.thumbnails.clear().await;
        tracing::info!("Cleared document and thumbnail caches");
        identity.and(content).and(thumbnails)
    }

    /// Drop in-memory thumbnails; disk tiers are untouched
    pub fn on_memory_pressure(&self) {
        self.inner.thumbnails.purge_memory();
    }
}

impl ResolverInner {
    async fn run_chain(&self, doc: &DocumentRef) -> Result<LocalDocument> {
        let id = doc.id.as_str();

        if let Some(found) = self.from_identity(id).await {
            return Ok(self.resolved(found));
        }

        let primary = locator::normalize(&doc.locator);
        if let Ok(url) = &primary {
            if let Some(found) = self.from_content(id, url).await {
                return Ok(self.resolved(found));
            }
        }

        if let Some(found) = self.from_literal_path(id, &doc.locator).await {
            return Ok(self.resolved(found));
        }

        if let Some(found) = self.from_scan(id).await {
            return Ok(self.resolved(found));
        }

        let mut remote_error = None;
        let mut locator_error = None;
        match &primary {
            Ok(url) => match self.fetch_and_store(id, url, ResolutionSource::Remote).await {
                Ok(found) => return Ok(self.resolved(found)),
                Err(e) => {
                    tracing::info!(document_id = id, kind = e.kind(), error = %e, "Primary locator failed");
                    remote_error = Some(e);
                }
            },
            Err(e) => locator_error = Some(e.clone()),
        }

        if let Some(alternate) = self.alternate_locator(doc).await {
            match locator::normalize(&alternate) {
                Ok(url) if primary.as_ref().ok() == Some(&url) => {
                    tracing::debug!(document_id = id, "Alternate locator matches primary, skipping");
                }
                Ok(url) => match self
                    .fetch_and_store(id, &url, ResolutionSource::AlternateRemote)
                    .await
                {
                    Ok(found) => return Ok(self.resolved(found)),
                    Err(e) => remote_error = Some(e),
                },
                Err(e) => {
                    locator_error.get_or_insert(e);
                }
            }
        }

        let error = remote_error.unwrap_or_else(|| {
            ResolveError::NotFound(match locator_error {
                Some(cause) => format!("{} ({})", id, cause),
                None => id.to_string(),
            })
        });
        tracing::warn!(
            document_id = id,
            kind = error.kind(),
            error = %error,
            "Every source exhausted"
        );
        Err(error)
    }

    fn resolved(&self, found: LocalDocument) -> LocalDocument {
        tracing::info!(
            document_id = %found.document_id,
            source = ?found.source,
            page_count = found.page_count,
            path = %found.path.display(),
            "Document resolved"
        );
        found
    }

    async fn from_identity(&self, id: &str) -> Option<LocalDocument> {
        if id.is_empty() {
            return None;
        }
        let path = self.identity.get(id).await?;
        match self.validate_entry(&path).await {
            Ok(validated) => Some(LocalDocument::new(
                id,
                &validated,
                ResolutionSource::IdentityCache,
            )),
            Err(e) => {
                tracing::debug!(document_id = id, error = %e, "Dropping stale identity entry");
                self.identity.remove(id).await;
                None
            }
        }
    }

    async fn from_content(&self, id: &str, url: &Url) -> Option<LocalDocument> {
        let key = locator::content_key(url);
        let path = self.content.get(&key).await?;
        let validated = match self.validate_entry(&path).await {
            Ok(validated) => validated,
            Err(e) => {
                tracing::debug!(document_id = id, key = %key, error = %e, "Dropping stale content entry");
                self.content.remove(&key).await;
                return None;
            }
        };

        let materialized = if self.config.resolution.backfill_identity {
            self.store(self.identity.as_ref(), id, &validated).await
        } else {
            None
        };
        Some(LocalDocument::new(
            id,
            materialized.as_ref().unwrap_or(&validated),
            ResolutionSource::ContentCache,
        ))
    }

    async fn from_literal_path(&self, id: &str, locator: &str) -> Option<LocalDocument> {
        let path = locator::literal_path(locator)?;
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return None;
        }

        // host file: never deleted, whatever the outcome
        let validated = self.validator.check(&path).await.ok()?;
        self.store(self.identity.as_ref(), id, &validated).await;
        Some(LocalDocument::new(id, &validated, ResolutionSource::LiteralPath))
    }

    async fn from_scan(&self, id: &str) -> Option<LocalDocument> {
        let candidates =
            scan::find_candidates(&self.scan_roots, id, self.config.resolution.scan_max_depth).await;

        for candidate in candidates {
            // cache tiers are never scan results
            if candidate.starts_with(&self.config.storage.cache_dir) {
                continue;
            }
            if let Ok(validated) = self.validator.check(&candidate).await {
                self.store(self.identity.as_ref(), id, &validated).await;
                return Some(LocalDocument::new(id, &validated, ResolutionSource::LocalScan));
            }
        }
        None
    }

    /// Validate a cache entry. Only files inside the cache area are deleted
    /// on failure; caches that record host paths leave those alone.
    async fn validate_entry(&self, path: &Path) -> Result<ValidatedDocument> {
        if path.starts_with(&self.config.storage.cache_dir) {
            self.validator.validate(path).await
        } else {
            self.validator.check(path).await
        }
    }

    async fn fetch_and_store(
        &self,
        id: &str,
        url: &Url,
        source: ResolutionSource,
    ) -> Result<LocalDocument> {
        let blob = self.retry.run(|| self.fetcher.fetch(url)).await?;
        let validated = self.validator.validate(&blob.path).await?;

        let by_id = self.store(self.identity.as_ref(), id, &validated).await;
        let key = locator::content_key(url);
        let by_content = self.store(self.content.as_ref(), &key, &validated).await;

        let temp_still_referenced = [&by_id, &by_content]
            .iter()
            .any(|stored| stored.as_ref().is_some_and(|s| s.path() == validated.path()));
        let kept = by_id.or(by_content);

        if kept.is_some() && !temp_still_referenced {
            if let Err(e) = tokio::fs::remove_file(&blob.path).await {
                tracing::debug!(path = %blob.path.display(), error = %e, "Failed to remove fetched temp file");
            }
        }

        Ok(LocalDocument::new(
            id,
            kept.as_ref().unwrap_or(&validated),
            source,
        ))
    }

    async fn alternate_locator(&self, doc: &DocumentRef) -> Option<String> {
        if let Some(alternate) = doc.alternate_locator.as_ref() {
            if !alternate.trim().is_empty() {
                return Some(alternate.clone());
            }
        }

        let listing = self.listing.as_ref()?;
        match listing.alternate_locator(&doc.id).await {
            Ok(found) => found.filter(|l| !l.trim().is_empty()),
            Err(e) => {
                tracing::warn!(document_id = %doc.id, error = %e, "Listing lookup failed");
                None
            }
        }
    }

    /// Best-effort cache write
    async fn store(
        &self,
        cache: &dyn PathCache,
        key: &str,
        validated: &ValidatedDocument,
    ) -> Option<ValidatedDocument> {
        if key.is_empty() {
            return None;
        }
        match cache.put(key, validated).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                report_write_failure(cache.tier(), key, &e);
                None
            }
        }
    }
}
