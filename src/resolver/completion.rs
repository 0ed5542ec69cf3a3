//! Completion callbacks for detached requests

use crate::document::{Resolution, ThumbnailResolution};

/// Receives results of detached requests.
///
/// The resolver only holds a weak reference; a sink dropped before the work
/// finishes simply receives nothing.
pub trait CompletionSink: Send + Sync {
    fn on_document(&self, _document_id: &str, _resolution: Resolution) {}

    fn on_thumbnail(&self, _document_id: &str, _thumbnail: ThumbnailResolution) {}
}
