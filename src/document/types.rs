//! Document reference and resolution result types

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThumbnailFormat;
use crate::error::ResolveError;

/// A shared note as returned by the listing service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    /// Stable opaque identifier
    pub id: String,

    /// Current byte location (possibly signed or expiring)
    pub locator: String,

    pub display_name: String,

    #[serde(default)]
    pub size_bytes: u64,

    /// Subject metadata, opaque to this crate
    #[serde(default)]
    pub subject_meta: serde_json::Value,

    /// Secondary URL field, tried when the primary locator fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_locator: Option<String>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            locator: locator.into(),
            size_bytes: 0,
            subject_meta: serde_json::Value::Null,
            alternate_locator: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_alternate_locator(mut self, locator: impl Into<String>) -> Self {
        self.alternate_locator = Some(locator.into());
        self
    }
}

/// A local file that passed document validation.
///
/// Only the validator constructs these, so holding one proves the file was
/// openable with at least one page when it was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDocument {
    path: PathBuf,
    page_count: usize,
}

impl ValidatedDocument {
    pub(crate) fn new(path: PathBuf, page_count: usize) -> Self {
        Self { path, page_count }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Same document, relocated by a cache write
    pub(crate) fn relocated(&self, path: PathBuf) -> Self {
        Self {
            path,
            page_count: self.page_count,
        }
    }
}

/// Which step of the fallback chain produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    IdentityCache,
    ContentCache,
    LiteralPath,
    LocalScan,
    Remote,
    AlternateRemote,
}

/// A resolved, locally readable document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    pub document_id: String,
    pub path: PathBuf,
    pub page_count: usize,
    pub source: ResolutionSource,
}

impl LocalDocument {
    pub(crate) fn new(document_id: &str, doc: &ValidatedDocument, source: ResolutionSource) -> Self {
        Self {
            document_id: document_id.to_string(),
            path: doc.path().to_path_buf(),
            page_count: doc.page_count(),
            source,
        }
    }

    pub(crate) fn validated(&self) -> ValidatedDocument {
        ValidatedDocument::new(self.path.clone(), self.page_count)
    }
}

/// Stand-in shown when every source is exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRecord {
    pub document_id: String,
    pub display_name: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Artifact {
    Local(LocalDocument),
    Placeholder(PlaceholderRecord),
}

/// What the UI receives for a document request
#[derive(Debug, Clone)]
pub struct Resolution {
    pub artifact: Artifact,
    /// Set when the artifact is a placeholder
    pub soft_error: Option<ResolveError>,
}

impl Resolution {
    pub fn local(&self) -> Option<&LocalDocument> {
        match &self.artifact {
            Artifact::Local(doc) => Some(doc),
            Artifact::Placeholder(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.artifact, Artifact::Placeholder(_))
    }
}

/// Encoded preview image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: ThumbnailFormat,
}

impl Thumbnail {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: ThumbnailFormat) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Decode back into pixels
    pub fn decode(&self) -> image::ImageResult<image::DynamicImage> {
        image::load_from_memory_with_format(&self.data, self.format.image_format())
    }
}

/// What the UI receives for a thumbnail request
#[derive(Debug, Clone)]
pub struct ThumbnailResolution {
    pub thumbnail: Thumbnail,
    pub is_placeholder: bool,
    pub soft_error: Option<ResolveError>,
}
