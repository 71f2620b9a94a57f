//! Cache manager: the lifecycle surface the host drives.
//!
//! The host calls `on_install` once when a new version is deployed,
//! `on_activate` once install has succeeded, and `on_intercept` for every
//! request. Install and activate are serialized by a lifecycle lock; requests
//! are never blocked by it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use url::Url;

use super::collect::CollectReport;
use super::intercept::Intercepted;
use super::key::AssetRequest;
use super::traits::{CacheStorage, Fetcher};
use crate::error::{CacheError, CacheResult};
use crate::manifest::{CacheVersion, Manifest};

/// Where this manager's version is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Created, not yet installed
  Parsed,
  Installing,
  /// Core assets committed, waiting for activation
  Installed,
  Activating,
  /// Old stores collected, this version serves requests
  Activated,
  /// Install failed; this version never takes over
  Redundant,
}

/// Versioned stale-while-revalidate cache over a storage backend and a
/// network fetcher.
pub struct CacheManager<S: CacheStorage, F: Fetcher> {
  pub(super) storage: Arc<S>,
  pub(super) fetcher: Arc<F>,
  pub(super) manifest: Arc<Manifest>,
  /// Scope the core assets resolve against; also defines same-origin
  pub(super) scope: Url,
  phase: Arc<Mutex<Phase>>,
  lifecycle: Arc<tokio::sync::Mutex<()>>,
  pub(super) write_failures: Arc<AtomicU64>,
}

impl<S: CacheStorage, F: Fetcher> CacheManager<S, F> {
  /// Create a manager for the manifest's version.
  ///
  /// If the storage already names this version as active (a previous process
  /// activated it), the manager starts out `Activated`.
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, manifest: Manifest, scope: Url) -> CacheResult<Self> {
    let phase = if storage.active_store()?.as_deref() == Some(manifest.version.store_name()) {
      Phase::Activated
    } else {
      Phase::Parsed
    };

    Ok(Self {
      storage,
      fetcher,
      manifest: Arc::new(manifest),
      scope,
      phase: Arc::new(Mutex::new(phase)),
      lifecycle: Arc::new(tokio::sync::Mutex::new(())),
      write_failures: Arc::new(AtomicU64::new(0)),
    })
  }

  pub fn version(&self) -> &CacheVersion {
    &self.manifest.version
  }

  pub fn manifest(&self) -> &Manifest {
    &self.manifest
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn phase(&self) -> Phase {
    self.phase.lock().map(|p| *p).unwrap_or(Phase::Redundant)
  }

  fn set_phase(&self, phase: Phase) {
    if let Ok(mut current) = self.phase.lock() {
      *current = phase;
    }
  }

  /// Number of snapshots that could not be persisted since startup.
  pub fn write_failures(&self) -> u64 {
    self.write_failures.load(Ordering::Relaxed)
  }

  /// Populate this version's store with the core assets.
  ///
  /// On failure nothing is written, the version is marked redundant and the
  /// previously active store (if any) keeps serving. Re-installing the
  /// version that is already active refreshes its entries and leaves it
  /// `Activated` either way.
  pub async fn on_install(&self) -> CacheResult<usize> {
    let _lifecycle = self.lifecycle.lock().await;
    let serving = self.storage.active_store()?.as_deref() == Some(self.version().store_name());
    if !serving {
      self.set_phase(Phase::Installing);
    }

    match self.install().await {
      Ok(count) => {
        if !serving {
          self.set_phase(Phase::Installed);
        }
        Ok(count)
      }
      Err(e) => {
        warn!(version = %self.version(), error = %e, "install failed");
        if !serving {
          self.set_phase(Phase::Redundant);
        }
        Err(e)
      }
    }
  }

  /// Delete every other store, then make this version the active one.
  ///
  /// Refuses a version whose install never completed. Individual deletion
  /// failures are reported, not fatal.
  pub async fn on_activate(&self) -> CacheResult<CollectReport> {
    let _lifecycle = self.lifecycle.lock().await;
    let store = self.version().store_name();

    let installed = self
      .storage
      .store_info(store)?
      .is_some_and(|info| info.installed_at.is_some());
    if !installed {
      return Err(CacheError::NotInstalled(store.to_string()));
    }

    self.set_phase(Phase::Activating);
    let report = match self.collect_garbage() {
      Ok(report) => report,
      Err(e) => {
        self.set_phase(Phase::Installed);
        return Err(e);
      }
    };

    // Only advertise the new version once the sweep is done
    if let Err(e) = self.storage.set_active_store(store) {
      self.set_phase(Phase::Installed);
      return Err(e);
    }
    self.set_phase(Phase::Activated);

    info!(
      version = %self.version(),
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "activated"
    );
    Ok(report)
  }

  /// Answer one request.
  pub async fn on_intercept(&self, request: AssetRequest) -> CacheResult<Intercepted>
  where
    S: 'static,
    F: 'static,
  {
    self.intercept(request).await
  }
}

impl<S: CacheStorage, F: Fetcher> Clone for CacheManager<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      manifest: Arc::clone(&self.manifest),
      scope: self.scope.clone(),
      phase: Arc::clone(&self.phase),
      lifecycle: Arc::clone(&self.lifecycle),
      write_failures: Arc::clone(&self.write_failures),
    }
  }
}
