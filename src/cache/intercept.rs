//! Request interceptor: stale-while-revalidate over the active store.

use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::key::{AssetKey, AssetRequest};
use super::manager::CacheManager;
use super::traits::{CacheStorage, Fetcher, Snapshot};
use crate::error::CacheResult;

/// How an intercepted request was answered.
#[derive(Debug)]
pub enum Intercepted {
  /// Not handled; the host sends the request to the network itself
  PassThrough,
  /// Answered from the store while a background fetch refreshes the entry.
  /// Dropping the handle does not cancel the refresh.
  FromStore {
    snapshot: Snapshot,
    revalidation: JoinHandle<()>,
  },
  /// Nothing stored; answered by the network
  FromNetwork(Snapshot),
}

impl Intercepted {
  pub fn snapshot(&self) -> Option<&Snapshot> {
    match self {
      Intercepted::PassThrough => None,
      Intercepted::FromStore { snapshot, .. } => Some(snapshot),
      Intercepted::FromNetwork(snapshot) => Some(snapshot),
    }
  }

  pub fn source(&self) -> &'static str {
    match self {
      Intercepted::PassThrough => "pass-through",
      Intercepted::FromStore { .. } => "store",
      Intercepted::FromNetwork(_) => "network",
    }
  }
}

impl<S: CacheStorage + 'static, F: Fetcher + 'static> CacheManager<S, F> {
  /// Answer a request.
  ///
  /// Non-GET requests, and any request while no store is active, pass
  /// through. A stored snapshot is returned at once and refreshed in the
  /// background; otherwise the network answers and its response is stored
  /// if eligible. A network failure with nothing stored is returned as is.
  pub(super) async fn intercept(&self, request: AssetRequest) -> CacheResult<Intercepted> {
    if !request.is_get() {
      debug!(method = %request.method, url = %request.url, "not intercepting");
      return Ok(Intercepted::PassThrough);
    }

    let store = match self.storage.active_store() {
      Ok(Some(store)) => store,
      Ok(None) => return Ok(Intercepted::PassThrough),
      Err(e) => {
        warn!(error = %e, "could not resolve active store");
        return Ok(Intercepted::PassThrough);
      }
    };

    let key = request.key();
    let cached = self.storage.get(&store, &key).unwrap_or_else(|e| {
      warn!(key = %key, error = %e, "store read failed, treating as miss");
      None
    });

    if let Some(snapshot) = cached {
      debug!(key = %key, "serving from store");
      let manager = self.clone();
      let revalidation = tokio::spawn(async move {
        manager.revalidate(store, request, key).await;
      });
      return Ok(Intercepted::FromStore {
        snapshot,
        revalidation,
      });
    }

    match self.fetcher.fetch(&request).await {
      Ok(snapshot) => {
        self.persist(&store, &key, &request.url, &snapshot);
        Ok(Intercepted::FromNetwork(snapshot))
      }
      Err(e) => {
        debug!(key = %key, error = %e, "network failed with nothing stored");
        Err(e)
      }
    }
  }

  async fn revalidate(&self, store: String, request: AssetRequest, key: AssetKey) {
    match self.fetcher.fetch(&request).await {
      Ok(snapshot) => self.persist(&store, &key, &request.url, &snapshot),
      Err(e) => debug!(key = %key, error = %e, "revalidation failed, keeping stored entry"),
    }
  }
}

impl<S: CacheStorage, F: Fetcher> CacheManager<S, F> {
  /// Same origin as the scope, or on the external allowlist.
  pub fn is_cacheable_origin(&self, url: &Url) -> bool {
    url.origin() == self.scope.origin() || self.manifest.allowlist.matches(url)
  }

  /// Store a network response if it is a success from an eligible origin.
  /// Write failures are counted and logged, never returned.
  fn persist(&self, store: &str, key: &AssetKey, url: &Url, snapshot: &Snapshot) {
    if !snapshot.is_success() {
      debug!(key = %key, status = snapshot.status, "not storing unsuccessful response");
      return;
    }
    if !self.is_cacheable_origin(url) {
      debug!(key = %key, "not storing cross-origin response");
      return;
    }

    if let Err(e) = self.storage.put(store, key, snapshot) {
      self.write_failures.fetch_add(1, Ordering::Relaxed);
      warn!(key = %key, store = %store, error = %e, "failed to store snapshot");
    }
  }
}
