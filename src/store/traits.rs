//! Core trait and types for the namespace store.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Response headers worth persisting alongside a cached body.
pub const STORED_HEADERS: &[&str] = &["content-type", "etag", "last-modified", "cache-control"];

/// Handle to an opened namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
  name: String,
}

impl Namespace {
  pub(crate) fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

/// A whole cached response. Entries are only ever replaced, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  /// Normalized request URL
  pub key: String,
  pub status: u16,
  /// Lowercased header names, restricted to [`STORED_HEADERS`]
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// Hex SHA-256 of `body`
  pub digest: String,
  pub stored_at: DateTime<Utc>,
}

impl Entry {
  pub fn new(
    key: impl Into<String>,
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
  ) -> Self {
    let headers = headers
      .into_iter()
      .map(|(name, value)| (name.to_ascii_lowercase(), value))
      .filter(|(name, _)| STORED_HEADERS.contains(&name.as_str()))
      .collect();

    Self {
      key: key.into(),
      status,
      headers,
      digest: body_digest(&body),
      body,
      stored_at: Utc::now(),
    }
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Hex SHA-256 of a response body.
pub fn body_digest(body: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body);
  hex::encode(hasher.finalize())
}

/// Key-value store partitioned into named namespaces.
///
/// Implementations must be safe to share between concurrently running policies.
/// `put` is last-write-wins.
pub trait NamespaceStore: Send + Sync + 'static {
  /// Open a namespace, creating it if it does not exist.
  fn open(&self, name: &str) -> Result<Namespace>;

  fn get(&self, ns: &Namespace, key: &str) -> Result<Option<Entry>>;

  /// Store an entry under `entry.key`, replacing any previous entry.
  fn put(&self, ns: &Namespace, entry: &Entry) -> Result<()>;

  fn list_keys(&self, ns: &Namespace) -> Result<Vec<String>>;

  /// Remove one entry. Returns whether an entry was removed.
  fn delete(&self, ns: &Namespace, key: &str) -> Result<bool>;

  /// Remove a namespace and all of its entries. Unknown names are a no-op.
  fn delete_namespace(&self, name: &str) -> Result<bool>;

  fn list_namespaces(&self) -> Result<Vec<String>>;
}
