//! Configuration management for the resolver
//!
//! Values come from `STUDYNOTES_*` environment variables (a `.env` file is
//! honoured) and fall back to the defaults below.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Upper bound on fetch attempts per locator
pub const MAX_FETCH_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub thumbnails: ThumbnailConfig,
    pub resolution: ResolutionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Purgeable cache area (thumbnails, document caches, temp files)
    pub cache_dir: PathBuf,
    /// Durable per-application storage area
    pub data_dir: PathBuf,
    /// LRU bound for each document cache keyspace (None = unbounded)
    pub document_cache_max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    /// Canvas height in logical pixels
    pub height: u32,
    /// Output device pixel density
    pub pixel_density: f32,
    pub format: ThumbnailFormat,
    pub memory_capacity: usize,
    pub disk_max_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    /// Copy content-cache hits into the identity cache
    pub backfill_identity: bool,
    /// Directory depth for the local identifier scan
    pub scan_max_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    Jpeg,
    Png,
}

impl ThumbnailFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "jpg",
            ThumbnailFormat::Png => "png",
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            ThumbnailFormat::Jpeg => image::ImageFormat::Jpeg,
            ThumbnailFormat::Png => image::ImageFormat::Png,
        }
    }
}

impl FromStr for ThumbnailFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ThumbnailFormat::Jpeg),
            "png" => Ok(ThumbnailFormat::Png),
            other => Err(format!("unknown thumbnail format {}", other)),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            storage: StorageConfig {
                cache_dir: PathBuf::from("./cache"),
                data_dir: PathBuf::from("./data"),
                document_cache_max_entries: None,
            },
            fetch: FetchConfig {
                timeout_secs: 30,
                user_agent: format!("studynotes-resolver/{}", env!("CARGO_PKG_VERSION")),
                max_attempts: 1,
                retry_delay_ms: 500,
            },
            thumbnails: ThumbnailConfig {
                height: 800,
                pixel_density: 1.0,
                format: ThumbnailFormat::Jpeg,
                memory_capacity: 100,
                disk_max_entries: None,
            },
            resolution: ResolutionConfig {
                backfill_identity: true,
                scan_max_depth: 3,
            },
        }
    }
}

impl ResolverConfig {
    /// Load from the environment. Unset variables keep their defaults; the
    /// first set but unparsable variable is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let (config, mut errors) = Self::load_env();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors.remove(0))
        }
    }

    /// Load from the environment. Each unparsable variable is reported and
    /// falls back to its own default; valid ones still apply.
    pub fn from_env_or_default() -> Self {
        let (config, errors) = Self::load_env();
        for e in errors {
            tracing::warn!("Ignoring config value: {}, using default", e);
        }
        config
    }

    fn load_env() -> (Self, Vec<ConfigError>) {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let mut reader = EnvReader::default();
        let config = ResolverConfig {
            storage: StorageConfig {
                cache_dir: env::var("STUDYNOTES_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.cache_dir),
                data_dir: env::var("STUDYNOTES_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
                document_cache_max_entries: reader.parse_optional("STUDYNOTES_DOCUMENT_CACHE_MAX_ENTRIES"),
            },
            fetch: FetchConfig {
                timeout_secs: reader.parse_or("STUDYNOTES_FETCH_TIMEOUT_SECS", defaults.fetch.timeout_secs),
                user_agent: env::var("STUDYNOTES_USER_AGENT").unwrap_or(defaults.fetch.user_agent),
                max_attempts: reader
                    .parse_or("STUDYNOTES_FETCH_ATTEMPTS", defaults.fetch.max_attempts)
                    .clamp(1, MAX_FETCH_ATTEMPTS),
                retry_delay_ms: reader.parse_or(
                    "STUDYNOTES_FETCH_RETRY_DELAY_MS",
                    defaults.fetch.retry_delay_ms,
                ),
            },
            thumbnails: ThumbnailConfig {
                height: reader.parse_or("STUDYNOTES_THUMBNAIL_HEIGHT", defaults.thumbnails.height),
                pixel_density: reader.parse_or(
                    "STUDYNOTES_PIXEL_DENSITY",
                    defaults.thumbnails.pixel_density,
                ),
                format: reader.parse_or("STUDYNOTES_THUMBNAIL_FORMAT", defaults.thumbnails.format),
                memory_capacity: reader.parse_or(
                    "STUDYNOTES_THUMBNAIL_MEMORY_CAPACITY",
                    defaults.thumbnails.memory_capacity,
                ),
                disk_max_entries: reader.parse_optional("STUDYNOTES_THUMBNAIL_DISK_MAX_ENTRIES"),
            },
            resolution: ResolutionConfig {
                backfill_identity: reader.parse_or(
                    "STUDYNOTES_BACKFILL_IDENTITY",
                    defaults.resolution.backfill_identity,
                ),
                scan_max_depth: reader.parse_or(
                    "STUDYNOTES_SCAN_MAX_DEPTH",
                    defaults.resolution.scan_max_depth,
                ),
            },
        };
        (config, reader.errors)
    }

    /// Defaults rooted at the given cache and data directories
    pub fn with_dirs(cache_dir: impl AsRef<Path>, data_dir: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.storage.cache_dir = cache_dir.as_ref().to_path_buf();
        config.storage.data_dir = data_dir.as_ref().to_path_buf();
        config
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.storage.cache_dir.join("Thumbnails")
    }

    pub fn identity_dir(&self) -> PathBuf {
        self.storage.cache_dir.join("Documents").join("by-id")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.storage.cache_dir.join("Documents").join("by-content")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.storage.cache_dir.join("tmp")
    }
}

/// Reads typed variables, collecting a `ConfigError` per bad value
#[derive(Default)]
struct EnvReader {
    errors: Vec<ConfigError>,
}

impl EnvReader {
    fn parse_or<T: FromStr>(&mut self, name: &'static str, default: T) -> T {
        match env::var(name) {
            Ok(value) => match value.trim().parse() {
                Ok(parsed) => parsed,
                Err(_) => {
                    self.errors.push(ConfigError::InvalidValue { name, value });
                    default
                }
            },
            Err(_) => default,
        }
    }

    fn parse_optional<T: FromStr>(&mut self, name: &'static str) -> Option<T> {
        match env::var(name) {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => match value.trim().parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    self.errors.push(ConfigError::InvalidValue { name, value });
                    None
                }
            },
            Err(_) => None,
        }
    }
}
