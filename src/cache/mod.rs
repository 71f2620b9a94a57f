//! Versioned offline cache for the widget collection.
//!
//! This module provides:
//! - Named stores, one per deployed version, persisted in SQLite
//! - All-or-nothing precaching of the core asset set on install
//! - Collection of every older store on activation
//! - Stale-while-revalidate answering of GET requests

mod collect;
mod install;
mod intercept;
mod key;
mod manager;
mod storage;
mod traits;

#[cfg(test)]
mod testing;

pub use intercept::Intercepted;
pub use key::{AssetKey, AssetRequest};
pub use manager::CacheManager;
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, Fetcher, Snapshot};
