//! SQLite implementation of the namespace store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{Entry, Namespace, NamespaceStore};

/// SQLite-backed namespace store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("slidecache").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- One row per cached response; replaced wholesale on every write
CREATE TABLE IF NOT EXISTS entries (
    namespace TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    digest TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (namespace, cache_key)
);
"#;

fn ensure_namespace(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?, ?)",
      params![name, Utc::now().to_rfc3339()],
    )
    .map_err(|e| eyre!("Failed to create namespace {}: {}", name, e))?;
  Ok(())
}

impl NamespaceStore for SqliteStore {
  fn open(&self, name: &str) -> Result<Namespace> {
    let conn = self.lock()?;
    ensure_namespace(&conn, name)?;
    Ok(Namespace::new(name))
  }

  fn get(&self, ns: &Namespace, key: &str) -> Result<Option<Entry>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT status, headers, body, digest, stored_at FROM entries
         WHERE namespace = ? AND cache_key = ?",
        params![ns.name(), key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {} from {}: {}", key, ns.name(), e))?;

    let Some((status, headers, body, digest, stored_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Corrupt headers for {}: {}", key, e))?;

    Ok(Some(Entry {
      key: key.to_string(),
      status,
      headers,
      body,
      digest,
      stored_at: parse_datetime(&stored_at)?,
    }))
  }

  fn put(&self, ns: &Namespace, entry: &Entry) -> Result<()> {
    let mut conn = self.lock()?;
    let headers =
      serde_json::to_string(&entry.headers).map_err(|e| eyre!("Failed to encode headers: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // A namespace cleared while a fetch was in flight is recreated by the write.
    ensure_namespace(&tx, ns.name())?;

    tx.execute(
      "INSERT OR REPLACE INTO entries (namespace, cache_key, status, headers, body, digest, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        ns.name(),
        entry.key,
        entry.status,
        headers,
        entry.body,
        entry.digest,
        entry.stored_at.to_rfc3339()
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", entry.key, ns.name(), e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn list_keys(&self, ns: &Namespace) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT cache_key FROM entries WHERE namespace = ? ORDER BY cache_key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![ns.name()], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", ns.name(), e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }

  fn delete(&self, ns: &Namespace, key: &str) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM entries WHERE namespace = ? AND cache_key = ?",
        params![ns.name(), key],
      )
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", key, ns.name(), e))?;

    Ok(removed > 0)
  }

  fn delete_namespace(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE namespace = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM namespaces WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM namespaces ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace name: {}", e))?;

    Ok(names)
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
