//! Error types for the cache manager.
//!
//! Cache operations return `CacheResult<T>`; the binary converts to
//! `color_eyre::Result` at the edges.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors the cache manager can surface
#[derive(Error, Debug)]
pub enum CacheError {
  // Storage errors
  #[error("Cache database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("Malformed snapshot headers: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("Failed to create cache directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Store {0} does not exist")]
  UnknownStore(String),

  #[error("Cache lock poisoned")]
  LockPoisoned,

  #[error("Invalid timestamp in cache database: {0}")]
  Timestamp(String),

  // Request errors
  #[error("Invalid asset URL {url}: {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("Network request for {url} failed: {reason}")]
  Network { url: String, reason: String },

  #[error("Failed to create HTTP client: {0}")]
  HttpClient(#[source] reqwest::Error),

  #[error("{url} responded with status {status}")]
  BadStatus { url: String, status: u16 },

  // Lifecycle errors
  #[error("Install of {version} failed on {url}: {source}")]
  Install {
    version: String,
    url: String,
    #[source]
    source: Box<CacheError>,
  },

  #[error("Cannot activate {0}: it has not been installed")]
  NotInstalled(String),
}

impl CacheError {
  /// Wrap a failure on a single core asset as a failure of the whole install.
  pub fn install(version: &str, url: &str, source: CacheError) -> Self {
    CacheError::Install {
      version: version.to_string(),
      url: url.to_string(),
      source: Box::new(source),
    }
  }

  /// Whether this error came from the network rather than the store.
  pub fn is_network(&self) -> bool {
    matches!(self, CacheError::Network { .. } | CacheError::BadStatus { .. })
  }
}
