//! Study Notes document resolver
//!
//! Resolves shared PDF notes to validated local files and first-page
//! thumbnails, through identity and content caches, local lookups, remote
//! fetches and placeholders.
//!
//! # Modules
//!
//! - `resolver`: Fallback-chain orchestrator (the entry point for hosts)
//! - `locator`: Locator normalization and content-cache keys
//! - `fetch`: Remote blob retrieval
//! - `pdf`: Validation, thumbnail rendering and placeholders via MuPDF
//! - `cache`: Document path caches and the two-tier thumbnail cache
//! - `document`: Request and result types, listing service boundary
//! - `config`, `error`, `telemetry`: Ambient configuration, errors and logging

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod pdf;
pub mod resolver;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::ResolverConfig;
pub use document::{DocumentRef, LocalDocument, Resolution, Thumbnail, ThumbnailResolution};
pub use error::{ResolveError, Result};
pub use resolver::{CompletionSink, Resolver, ResolverBuilder};
