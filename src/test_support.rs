//! Shared fixtures for unit tests

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::ResolverConfig;

/// Build a well-formed PDF with `pages` pages of the given size.
///
/// Every page draws a 20pt black square 10pt from the bottom-left corner.
/// `pages == 0` yields a structurally valid document with an empty page tree.
pub fn pdf_bytes(pages: usize, width: f32, height: f32) -> Vec<u8> {
    let content_id = 3 + pages;
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + i)).collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages),
    ];
    for _ in 0..pages {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Contents {} 0 R /Resources << >> >>",
            width, height, content_id
        ));
    }
    let stream = "0 0 0 rg 10 10 20 20 re f";
    objects.push(format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        stream.len(),
        stream
    ));

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

/// Letter-sized PDF with `pages` pages
pub fn letter_pdf(pages: usize) -> Vec<u8> {
    pdf_bytes(pages, 612.0, 792.0)
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, data).unwrap();
    path
}

/// Config rooted in a temp dir, with cache and data areas side by side
pub fn test_config(root: &TempDir) -> ResolverConfig {
    let mut config =
        ResolverConfig::with_dirs(root.path().join("cache"), root.path().join("data"));
    config.fetch.timeout_secs = 5;
    config.fetch.retry_delay_ms = 0;
    config
}

/// Serve an axum router on an ephemeral local port
pub async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Files directly inside `dir`, or nothing if it does not exist
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default()
}
