//! Store garbage collection on activation.

use tracing::{info, warn};

use super::manager::CacheManager;
use super::traits::{CacheStorage, Fetcher};
use crate::error::CacheResult;

/// Outcome of one sweep over the existing stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
  /// Stores that were removed
  pub deleted: Vec<String>,
  /// Stores that could not be removed, with the reason; retried next activation
  pub failed: Vec<(String, String)>,
}

impl CollectReport {
  /// True when no old store survived the sweep.
  pub fn is_complete(&self) -> bool {
    self.failed.is_empty()
  }
}

impl<S: CacheStorage, F: Fetcher> CacheManager<S, F> {
  /// Delete every store whose name is not the current version.
  ///
  /// Failing to list the stores is an error; failing to delete one of them
  /// is recorded and the sweep moves on.
  pub(super) fn collect_garbage(&self) -> CacheResult<CollectReport> {
    let current = self.version().store_name();
    let mut report = CollectReport::default();

    for name in self.storage.store_names()? {
      if name == current {
        continue;
      }
      match self.storage.delete_store(&name) {
        Ok(_) => {
          info!(store = %name, "deleted old store");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(store = %name, error = %e, "failed to delete old store");
          report.failed.push((name, e.to_string()));
        }
      }
    }

    Ok(report)
  }
}
