//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

use super::key::{AssetKey, AssetRequest};
use crate::error::CacheResult;

/// Immutable copy of a network response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub status: u16,
  /// Header pairs in the order the server sent them
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Snapshot {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers,
      body: body.into(),
    }
  }

  /// 2xx responses are the only ones worth keeping.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Summary of one named store.
#[derive(Debug, Clone)]
pub struct StoreInfo {
  pub name: String,
  pub entries: usize,
  pub created_at: DateTime<Utc>,
  /// Set once a full install committed into this store
  pub installed_at: Option<DateTime<Utc>>,
}

/// Trait for cache storage backends.
///
/// Single operations are atomic; nothing is atomic across calls except
/// `install_store`.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it does not exist.
  fn open_store(&self, store: &str) -> CacheResult<()>;

  /// Names of all existing stores.
  fn store_names(&self) -> CacheResult<Vec<String>>;

  /// Details of a store, or None if it does not exist.
  fn store_info(&self, store: &str) -> CacheResult<Option<StoreInfo>>;

  /// Delete a store and all of its entries. Returns false if it did not exist.
  fn delete_store(&self, store: &str) -> CacheResult<bool>;

  /// Look up a snapshot.
  fn get(&self, store: &str, key: &AssetKey) -> CacheResult<Option<Snapshot>>;

  /// Insert or replace a snapshot.
  fn put(&self, store: &str, key: &AssetKey, snapshot: &Snapshot) -> CacheResult<()>;

  /// Write every entry and mark the store installed, or nothing at all.
  fn install_store(&self, store: &str, entries: &[(AssetKey, Snapshot)]) -> CacheResult<()>;

  /// Keys currently held by a store.
  fn keys(&self, store: &str) -> CacheResult<Vec<AssetKey>>;

  /// Name of the store currently serving requests.
  fn active_store(&self) -> CacheResult<Option<String>>;

  /// Make the named store the one serving requests.
  fn set_active_store(&self, store: &str) -> CacheResult<()>;
}

/// Trait for the network side: fetch a request and snapshot the response.
///
/// Non-2xx responses are still `Ok`; only transport failures are errors.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &AssetRequest) -> impl Future<Output = CacheResult<Snapshot>> + Send;
}
