//! Single-flight guard for background revalidation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Keys whose background refresh is currently outstanding.
///
/// Process-local; never persisted.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
  keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Claim `key`. Returns None if a refresh for it is already outstanding.
  ///
  /// The key is released when the returned guard is dropped, whether the
  /// refresh succeeded, failed, or panicked.
  pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
    if !lock(&self.keys).insert(key.to_string()) {
      return None;
    }

    Some(InFlightGuard {
      keys: Arc::clone(&self.keys),
      key: key.to_string(),
    })
  }

  pub fn contains(&self, key: &str) -> bool {
    lock(&self.keys).contains(key)
  }

  pub fn len(&self) -> usize {
    lock(&self.keys).len()
  }

  pub fn is_empty(&self) -> bool {
    lock(&self.keys).is_empty()
  }
}

/// Holds a key in the [`InFlightSet`] until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
  keys: Arc<Mutex<HashSet<String>>>,
  key: String,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    lock(&self.keys).remove(&self.key);
  }
}

// A poisoned set is still consistent.
fn lock(keys: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
  keys.lock().unwrap_or_else(PoisonError::into_inner)
}
