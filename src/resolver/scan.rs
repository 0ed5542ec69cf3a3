//! Local scan for files named after a document identifier

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// PDF files under `roots` whose name contains `id`, shallowest first.
///
/// Descends at most `max_depth` directory levels below each root. Hidden
/// entries are skipped and unreadable directories are ignored.
pub(crate) async fn find_candidates(roots: &[PathBuf], id: &str, max_depth: usize) -> Vec<PathBuf> {
    if id.trim().is_empty() {
        return Vec::new();
    }

    let mut found = Vec::new();
    for root in roots {
        scan_root(root, id, max_depth, &mut found).await;
    }
    found
}

async fn scan_root(root: &Path, id: &str, max_depth: usize, found: &mut Vec<PathBuf>) {
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if depth > 0 {
                    tracing::debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                }
                continue;
            }
        };

        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => subdirs.push(entry.path()),
                Ok(kind) if kind.is_file() && name.contains(id) && is_pdf_name(name) => {
                    files.push(entry.path())
                }
                _ => {}
            }
        }

        files.sort();
        found.extend(files);
        if depth < max_depth {
            subdirs.sort();
            queue.extend(subdirs.into_iter().map(|d| (d, depth + 1)));
        }
    }
}

fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
