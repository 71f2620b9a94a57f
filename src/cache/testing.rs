//! Test doubles shared by the cache tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

use super::key::{AssetKey, AssetRequest};
use super::manager::CacheManager;
use super::storage::SqliteStorage;
use super::traits::{CacheStorage, Fetcher, Snapshot, StoreInfo};
use crate::error::{CacheError, CacheResult};
use crate::manifest::{ExternalAllowlist, Manifest};

pub fn scope() -> Url {
  Url::parse("https://tools.example.test/").unwrap()
}

/// Three core assets and one allowlisted CDN prefix.
pub fn manifest(version: &str) -> Manifest {
  Manifest::new(
    version,
    ["/", "/index.html", "/app.js"],
    ExternalAllowlist::new(["https://cdn.example.test/lib/"]),
  )
}

/// A 200 text response whose body names what it is.
pub fn text(body: &str) -> Snapshot {
  Snapshot::new(
    200,
    vec![("content-type".to_string(), "text/plain".to_string())],
    format!("body of {}", body),
  )
}

/// Fresh manager over in-memory SQLite; nothing installed yet.
pub fn manager(version: &str) -> (CacheManager<SqliteStorage, MockFetcher>, Arc<MockFetcher>) {
  let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
  let fetcher = Arc::new(MockFetcher::new());
  let manager = CacheManager::new(storage, fetcher.clone(), manifest(version), scope()).unwrap();
  (manager, fetcher)
}

/// Manager for "v1" with the core assets installed and activated.
pub async fn active_manager() -> (CacheManager<SqliteStorage, MockFetcher>, Arc<MockFetcher>) {
  let (manager, fetcher) = manager("v1");
  fetcher.serve_core_assets(&manager.manifest().core_assets);
  manager.on_install().await.unwrap();
  manager.on_activate().await.unwrap();
  (manager, fetcher)
}

/// Scripted network: per-URL responses or failures, with call counts.
#[derive(Default)]
pub struct MockFetcher {
  routes: Mutex<HashMap<String, Option<Snapshot>>>,
  calls: Mutex<HashMap<String, usize>>,
  gate: Mutex<Option<Arc<Notify>>>,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, snapshot: Snapshot) {
    self.routes.lock().unwrap().insert(url.to_string(), Some(snapshot));
  }

  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(url.to_string(), None);
  }

  /// Serve `text(asset)` for every core asset under the test scope.
  pub fn serve_core_assets(&self, assets: &[String]) {
    for asset in assets {
      let url = scope().join(asset).unwrap();
      self.respond(url.as_str(), text(asset));
    }
  }

  /// Hold every subsequent fetch until the returned notify fires.
  pub fn hold(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    *self.gate.lock().unwrap() = Some(gate.clone());
    gate
  }

  pub fn calls(&self, url: &str) -> usize {
    self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
  }
}

impl Fetcher for MockFetcher {
  async fn fetch(&self, request: &AssetRequest) -> CacheResult<Snapshot> {
    let url = request.url.to_string();
    *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

    let gate = self.gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }

    let route = self.routes.lock().unwrap().get(&url).cloned();
    match route {
      Some(Some(snapshot)) => Ok(snapshot),
      Some(None) => Err(CacheError::Network {
        url,
        reason: "connection refused".to_string(),
      }),
      None => Err(CacheError::Network {
        url,
        reason: "no route".to_string(),
      }),
    }
  }
}

/// SQLite storage with switchable write and delete failures.
pub struct FlakyStorage {
  inner: SqliteStorage,
  fail_writes: AtomicBool,
  fail_deletes: Mutex<HashSet<String>>,
}

impl FlakyStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      fail_writes: AtomicBool::new(false),
      fail_deletes: Mutex::new(HashSet::new()),
    }
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  pub fn fail_delete(&self, store: &str) {
    self.fail_deletes.lock().unwrap().insert(store.to_string());
  }

  pub fn allow_delete(&self, store: &str) {
    self.fail_deletes.lock().unwrap().remove(store);
  }

  fn quota_exceeded() -> CacheError {
    CacheError::Database(rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
      Some("database or disk is full".to_string()),
    ))
  }
}

impl CacheStorage for FlakyStorage {
  fn open_store(&self, store: &str) -> CacheResult<()> {
    self.inner.open_store(store)
  }

  fn store_names(&self) -> CacheResult<Vec<String>> {
    self.inner.store_names()
  }

  fn store_info(&self, store: &str) -> CacheResult<Option<StoreInfo>> {
    self.inner.store_info(store)
  }

  fn delete_store(&self, store: &str) -> CacheResult<bool> {
    if self.fail_deletes.lock().unwrap().contains(store) {
      return Err(CacheError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
      )));
    }
    self.inner.delete_store(store)
  }

  fn get(&self, store: &str, key: &AssetKey) -> CacheResult<Option<Snapshot>> {
    self.inner.get(store, key)
  }

  fn put(&self, store: &str, key: &AssetKey, snapshot: &Snapshot) -> CacheResult<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(Self::quota_exceeded());
    }
    self.inner.put(store, key, snapshot)
  }

  fn install_store(&self, store: &str, entries: &[(AssetKey, Snapshot)]) -> CacheResult<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(Self::quota_exceeded());
    }
    self.inner.install_store(store, entries)
  }

  fn keys(&self, store: &str) -> CacheResult<Vec<AssetKey>> {
    self.inner.keys(store)
  }

  fn active_store(&self) -> CacheResult<Option<String>> {
    self.inner.active_store()
  }

  fn set_active_store(&self, store: &str) -> CacheResult<()> {
    self.inner.set_active_store(store)
  }
}
