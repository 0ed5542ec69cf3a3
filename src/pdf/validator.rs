//! Document validation
//!
//! The single gate in front of every cache tier: a file is either proven to
//! be an openable PDF with at least one page, or it is rejected. Files this
//! crate owns (fetched temp files, cache entries) go through `validate` and
//! are deleted on rejection; files found on the host's disk go through
//! `check`, which never touches them.

use std::path::Path;

use mupdf::Document;

use crate::document::ValidatedDocument;
use crate::error::{ResolveError, Result, ValidationFailure};

/// Where to look for the `%PDF-` header
const HEADER_WINDOW: usize = 1024;
/// Where to look for the `%%EOF` trailer marker
const TRAILER_WINDOW: usize = 1024;

/// Validates local files as paged PDF documents using MuPDF
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentValidator;

impl DocumentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a file this crate owns, deleting it on failure.
    ///
    /// Parsing runs on the blocking pool; there is no timeout.
    pub async fn validate(&self, path: &Path) -> Result<ValidatedDocument> {
        let result = self.check(path).await;
        if result.is_err() {
            discard(path).await;
        }
        result
    }

    /// Validate without modifying the file, whatever the outcome
    pub async fn check(&self, path: &Path) -> Result<ValidatedDocument> {
        let owned = path.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || inspect(&owned))
            .await
            .unwrap_or_else(|e| Err(ValidationFailure::Unparsable(format!("Task join error: {}", e))));

        match outcome {
            Ok(page_count) => {
                tracing::debug!(path = %path.display(), page_count, "Document validated");
                Ok(ValidatedDocument::new(path.to_path_buf(), page_count))
            }
            Err(failure) => {
                tracing::info!(
                    path = %path.display(),
                    reason = %failure,
                    "Rejected invalid document"
                );
                Err(ResolveError::validation(path, failure))
            }
        }
    }
}

/// Blocking inspection: structure check, then a full MuPDF open
fn inspect(path: &Path) -> std::result::Result<usize, ValidationFailure> {
    let data = std::fs::read(path).map_err(|e| ValidationFailure::Unreadable(e.to_string()))?;
    check_structure(&data)?;

    let doc = Document::from_bytes(&data, "application/pdf")
        .map_err(|e| ValidationFailure::Unparsable(e.to_string()))?;
    let page_count = doc
        .page_count()
        .map_err(|e| ValidationFailure::Unparsable(e.to_string()))?;

    if page_count < 1 {
        return Err(ValidationFailure::ZeroPages);
    }
    Ok(page_count as usize)
}

/// Cheap byte-level checks MuPDF's repair mode would otherwise paper over
fn check_structure(data: &[u8]) -> std::result::Result<(), ValidationFailure> {
    if data.is_empty() {
        return Err(ValidationFailure::Truncated);
    }

    let head = &data[..data.len().min(HEADER_WINDOW)];
    if !contains(head, b"%PDF-") {
        return Err(ValidationFailure::NotADocument);
    }

    let tail = &data[data.len().saturating_sub(TRAILER_WINDOW)..];
    if !contains(tail, b"%%EOF") {
        return Err(ValidationFailure::Truncated);
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Remove a rejected file. Already-missing files are fine.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete invalid document");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{letter_pdf, write_file};
    use tempfile::TempDir;

    async fn validate_bytes(
        data: &[u8],
    ) -> (Result<ValidatedDocument>, std::path::PathBuf, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "doc.pdf", data);
        let result = DocumentValidator::new().validate(&path).await;
        assert_eq!(path.exists(), result.is_ok());
        (result, path, dir)
    }

    #[tokio::test]
    async fn test_accepts_three_page_pdf() {
        let (result, path, _dir) = validate_bytes(&letter_pdf(3)).await;
        let doc = result.unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_zero_byte_file_is_deleted() {
        let (result, path, _dir) = validate_bytes(b"").await;
        assert!(matches!(
            result,
            Err(ResolveError::Validation { failure: ValidationFailure::Truncated, .. })
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_truncated_file_is_deleted() {
        let full = letter_pdf(3);
        let (result, path, _dir) = validate_bytes(&full[..full.len() / 2]).await;
        assert!(matches!(
            result,
            Err(ResolveError::Validation { failure: ValidationFailure::Truncated, .. })
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_html_error_page_is_rejected() {
        let html = b"<!DOCTYPE html><html><body><h1>403 Forbidden</h1></body></html>";
        let (result, path, _dir) = validate_bytes(html).await;
        assert!(matches!(
            result,
            Err(ResolveError::Validation { failure: ValidationFailure::NotADocument, .. })
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_zero_page_pdf_is_rejected() {
        let (result, path, _dir) = validate_bytes(&letter_pdf(0)).await;
        assert!(matches!(result, Err(ResolveError::Validation { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_check_leaves_rejected_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "thesis.docx", b"PK\x03\x04 word document");

        let result = DocumentValidator::new().check(&path).await;
        assert!(matches!(
            result,
            Err(ResolveError::Validation { failure: ValidationFailure::NotADocument, .. })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04 word document");

        let ok = write_file(dir.path(), "notes.pdf", &letter_pdf(2));
        assert_eq!(DocumentValidator::new().check(&ok).await.unwrap().page_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_reports_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.pdf");
        let result = DocumentValidator::new().validate(&path).await;
        assert!(matches!(
            result,
            Err(ResolveError::Validation { failure: ValidationFailure::Unreadable(_), .. })
        ));
    }

    #[test]
    fn test_structure_check() {
        assert_eq!(check_structure(b"%PDF-1.7\n...\n%%EOF\n"), Ok(()));
        assert_eq!(check_structure(b"PK\x03\x04"), Err(ValidationFailure::NotADocument));
        assert_eq!(check_structure(b"%PDF-1.7\n1 0 obj"), Err(ValidationFailure::Truncated));
    }
}
