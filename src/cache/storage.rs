//! SQLite implementation of the cache storage trait.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::key::AssetKey;
use super::traits::{CacheStorage, Snapshot, StoreInfo};
use crate::error::{CacheError, CacheResult};

/// Key in the meta table naming the store that serves requests.
const ACTIVE_STORE_KEY: &str = "active_store";

/// SQLite-based cache storage. All named stores live in one database.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the database at the given path.
  pub fn open_at(path: &Path) -> CacheResult<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// In-memory database; nothing survives the process.
  #[allow(dead_code)]
  pub fn open_in_memory() -> CacheResult<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> CacheResult<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn lock(&self) -> CacheResult<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| CacheError::LockPoisoned)
  }

  fn run_migrations(&self) -> CacheResult<()> {
    self.lock()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named store (cache generation)
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    installed_at TEXT
);

-- Response snapshots keyed by sha256 of the canonical request
CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, key_hash),
    FOREIGN KEY (store) REFERENCES stores(name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

// Never INSERT OR REPLACE into stores: the replace deletes the row and the
// cascade would take its entries with it.
const ENSURE_STORE: &str = "INSERT OR IGNORE INTO stores (name) VALUES (?)";

const UPSERT_ENTRY: &str = "INSERT OR REPLACE INTO entries
   (store, key_hash, method, url, status, headers, body, stored_at)
   VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))";

fn write_entry(
  conn: &Connection,
  store: &str,
  key: &AssetKey,
  snapshot: &Snapshot,
) -> CacheResult<()> {
  let headers = serde_json::to_string(&snapshot.headers)?;
  conn.execute(
    UPSERT_ENTRY,
    params![
      store,
      key.cache_hash(),
      key.method(),
      key.url(),
      snapshot.status,
      headers,
      snapshot.body
    ],
  )?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_store(&self, store: &str) -> CacheResult<()> {
    self.lock()?.execute(ENSURE_STORE, params![store])?;
    Ok(())
  }

  fn store_names(&self) -> CacheResult<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY created_at, name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn store_info(&self, store: &str) -> CacheResult<Option<StoreInfo>> {
    let conn = self.lock()?;
    let row: Option<(String, Option<String>, i64)> = conn
      .query_row(
        "SELECT s.created_at, s.installed_at,
                (SELECT COUNT(*) FROM entries e WHERE e.store = s.name)
         FROM stores s WHERE s.name = ?",
        params![store],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    let Some((created_at, installed_at, entries)) = row else {
      return Ok(None);
    };

    Ok(Some(StoreInfo {
      name: store.to_string(),
      entries: entries.max(0) as usize,
      created_at: parse_datetime(&created_at)?,
      installed_at: installed_at.as_deref().map(parse_datetime).transpose()?,
    }))
  }

  fn delete_store(&self, store: &str) -> CacheResult<bool> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM entries WHERE store = ?", params![store])?;
    let removed = tx.execute("DELETE FROM stores WHERE name = ?", params![store])?;
    tx.execute(
      "DELETE FROM meta WHERE key = ? AND value = ?",
      params![ACTIVE_STORE_KEY, store],
    )?;

    tx.commit()?;
    Ok(removed > 0)
  }

  fn get(&self, store: &str, key: &AssetKey) -> CacheResult<Option<Snapshot>> {
    let conn = self.lock()?;
    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM entries WHERE store = ? AND key_hash = ?",
        params![store, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;
        Ok(Some(Snapshot {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, key: &AssetKey, snapshot: &Snapshot) -> CacheResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    // A store deleted by collection stays deleted; late writes are dropped
    let exists: bool = tx.query_row(
      "SELECT EXISTS(SELECT 1 FROM stores WHERE name = ?)",
      params![store],
      |row| row.get(0),
    )?;
    if !exists {
      return Err(CacheError::UnknownStore(store.to_string()));
    }

    write_entry(&tx, store, key, snapshot)?;
    tx.commit()?;
    Ok(())
  }

  fn install_store(&self, store: &str, entries: &[(AssetKey, Snapshot)]) -> CacheResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    tx.execute(ENSURE_STORE, params![store])?;
    for (key, snapshot) in entries {
      write_entry(&tx, store, key, snapshot)?;
    }
    tx.execute(
      "UPDATE stores SET installed_at = datetime('now') WHERE name = ?",
      params![store],
    )?;

    // Dropping an uncommitted transaction rolls it back
    tx.commit()?;
    Ok(())
  }

  fn keys(&self, store: &str) -> CacheResult<Vec<AssetKey>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE store = ? ORDER BY url")?;
    let keys = stmt
      .query_map(params![store], |row| {
        Ok(AssetKey::from_parts(row.get(0)?, row.get(1)?))
      })?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
  }

  fn active_store(&self) -> CacheResult<Option<String>> {
    let conn = self.lock()?;
    let name = conn
      .query_row(
        "SELECT value FROM meta WHERE key = ?",
        params![ACTIVE_STORE_KEY],
        |row| row.get(0),
      )
      .optional()?;
    Ok(name)
  }

  fn set_active_store(&self, store: &str) -> CacheResult<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(ENSURE_STORE, params![store])?;
    tx.execute(
      "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
      params![ACTIVE_STORE_KEY, store],
    )?;
    tx.commit()?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> CacheResult<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| CacheError::Timestamp(format!("'{}': {}", s, e)))
}
