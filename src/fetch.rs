//! Remote fetch
//!
//! A plain timed HTTP GET that streams the body into a temp file. The fetcher
//! never retries and never touches a cache tier; both are the resolver's job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::error::{NetworkFailure, ResolveError, Result};

const PARTIAL_SUFFIX: &str = ".part";

/// Bytes downloaded to a temporary location
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub path: PathBuf,
    pub bytes: u64,
    pub content_type: Option<String>,
}

/// Retrieves remote bytes into a local temp file
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedBlob>;
}

/// reqwest-backed fetcher
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let timeout = config.fetch_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.fetch.user_agent.clone())
            .build()
            .map_err(|e| ResolveError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            temp_dir: config.temp_dir(),
            timeout,
        })
    }

    fn network_error(&self, url: &Url, err: reqwest::Error) -> ResolveError {
        let failure = if err.is_timeout() {
            NetworkFailure::Timeout(self.timeout.as_secs())
        } else if let Some(status) = err.status() {
            NetworkFailure::Status(status.as_u16())
        } else {
            NetworkFailure::Transport(err.to_string())
        };
        ResolveError::Network {
            url: url.to_string(),
            failure,
        }
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<FetchedBlob> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Network {
                url: url.to_string(),
                failure: NetworkFailure::Status(status.as_u16()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.network_error(url, e))?
        {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(FetchedBlob {
            path: dest.to_path_buf(),
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl BlobFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedBlob> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ResolveError::Network {
                url: url.to_string(),
                failure: NetworkFailure::Transport(format!("unsupported scheme {}", url.scheme())),
            });
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let dest = self.temp_dir.join(format!("{}{}", Uuid::new_v4(), PARTIAL_SUFFIX));

        let result = match tokio::time::timeout(self.timeout, self.download(url, &dest)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Network {
                url: url.to_string(),
                failure: NetworkFailure::Timeout(self.timeout.as_secs()),
            }),
        };

        match result {
            Ok(blob) => {
                tracing::debug!(
                    url = %url,
                    bytes = blob.bytes,
                    content_type = ?blob.content_type,
                    "Fetched remote document"
                );
                Ok(blob)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&dest).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %dest.display(), error = %remove_err, "Failed to remove partial download");
                    }
                }
                tracing::debug!(url = %url, error = %e, "Fetch failed");
                Err(e)
            }
        }
    }
}

/// Delete downloads left in `dir` by an earlier run. Returns how many went.
///
/// Covers blobs handed out directly because no cache tier accepted a copy.
pub(crate) async fn sweep_temp_dir(dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_partial = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));
        if !is_partial {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to remove stale download")
            }
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "Swept stale downloads");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{letter_pdf, list_files, serve, test_config};
    use axum::{http::StatusCode, routing::get, Router};
    use tempfile::TempDir;

    async fn fixture_server() -> std::net::SocketAddr {
        let router = Router::new()
            .route(
                "/notes/calc.pdf",
                get(|| async { ([("content-type", "application/pdf")], letter_pdf(3)) }),
            )
            .route("/missing.pdf", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/slow.pdf",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    letter_pdf(1)
                }),
            );
        serve(router).await
    }

    #[tokio::test]
    async fn test_fetch_writes_temp_file() {
        let root = TempDir::new().unwrap();
        let config = test_config(&root);
        let addr = fixture_server().await;
        let fetcher = HttpFetcher::new(&config).unwrap();

        let url = Url::parse(&format!("http://{}/notes/calc.pdf", addr)).unwrap();
        let blob = fetcher.fetch(&url).await.unwrap();

        assert_eq!(blob.bytes, letter_pdf(3).len() as u64);
        assert_eq!(blob.content_type.as_deref(), Some("application/pdf"));
        assert!(blob.path.starts_with(config.temp_dir()));
        assert_eq!(std::fs::read(&blob.path).unwrap(), letter_pdf(3));
    }

    #[tokio::test]
    async fn test_non_success_status_discards_temp_file() {
        let root = TempDir::new().unwrap();
        let config = test_config(&root);
        let addr = fixture_server().await;
        let fetcher = HttpFetcher::new(&config).unwrap();

        let url = Url::parse(&format!("http://{}/missing.pdf", addr)).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(
            err,
            ResolveError::Network { failure: NetworkFailure::Status(404), .. }
        ));
        assert!(list_files(&config.temp_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_timeout() {
        let root = TempDir::new().unwrap();
        let mut config = test_config(&root);
        config.fetch.timeout_secs = 1;
        let addr = fixture_server().await;
        let fetcher = HttpFetcher::new(&config).unwrap();

        let url = Url::parse(&format!("http://{}/slow.pdf", addr)).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(
            err,
            ResolveError::Network { failure: NetworkFailure::Timeout(1), .. }
        ));
        assert!(list_files(&config.temp_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let root = TempDir::new().unwrap();
        let config = test_config(&root);
        let fetcher = HttpFetcher::new(&config).unwrap();

        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/a.pdf", addr)).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Network { failure: NetworkFailure::Transport(_), .. }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_partial_downloads() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("tmp");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.part"), b"x").unwrap();
        std::fs::write(dir.join("b.part"), b"y").unwrap();
        std::fs::write(dir.join("keep.txt"), b"z").unwrap();

        assert_eq!(sweep_temp_dir(&dir).await, 2);
        assert_eq!(list_files(&dir), vec![dir.join("keep.txt")]);
        assert_eq!(sweep_temp_dir(&root.path().join("missing")).await, 0);
    }

    #[tokio::test]
    async fn test_rejects_file_urls() {
        let root = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new(&test_config(&root)).unwrap();
        let url = Url::parse("file:///etc/hosts").unwrap();
        assert!(fetcher.fetch(&url).await.is_err());
    }
}
