//! Precache installer: all core assets or nothing.

use futures::future::try_join_all;
use tracing::{debug, info};

use super::key::AssetRequest;
use super::manager::CacheManager;
use super::traits::{CacheStorage, Fetcher};
use crate::error::{CacheError, CacheResult};

impl<S: CacheStorage, F: Fetcher> CacheManager<S, F> {
  /// Fetch every core asset, then commit them to this version's store in a
  /// single transaction. Returns the number of assets written.
  ///
  /// Any transport failure or non-2xx response aborts before a single entry
  /// is written. Running it again for the same version overwrites the same
  /// keys with the same snapshots.
  pub(super) async fn install(&self) -> CacheResult<usize> {
    let store = self.version().store_name();
    let urls = self.manifest.core_urls(&self.scope)?;

    self.storage.open_store(store)?;

    let fetches = urls.into_iter().map(|url| async move {
      let request = AssetRequest::get(url);
      let snapshot = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| CacheError::install(store, request.url.as_str(), e))?;

      if !snapshot.is_success() {
        let status = CacheError::BadStatus {
          url: request.url.to_string(),
          status: snapshot.status,
        };
        return Err(CacheError::install(store, request.url.as_str(), status));
      }

      debug!(url = %request.url, status = snapshot.status, "fetched core asset");
      Ok::<_, CacheError>((request.key(), snapshot))
    });

    let entries = try_join_all(fetches).await?;
    self.storage.install_store(store, &entries)?;

    info!(version = %store, assets = entries.len(), "precached core assets");
    Ok(entries.len())
  }
}
