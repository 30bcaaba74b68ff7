//! Serving strategies for intercepted requests.
//!
//! - Cache-First for static shell assets
//! - Stale-While-Revalidate for slide documents, with single-flight background refresh
//! - Network-First with cache fallback for dynamic JSON

mod cache_first;
mod inflight;
mod network_first;
pub mod offline;
mod stale_while_revalidate;

pub use inflight::InFlightSet;

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::network::{Fetcher, HttpResponse};
use crate::store::{CacheRole, Entry, Namespace, NamespaceName, NamespaceStore};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh network response
  Network,
  /// Replayed from a cache namespace
  Cache,
  /// Synthesized offline placeholder
  Offline,
}

/// A response handed back to the requesting client.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: HttpResponse,
  pub source: ResponseSource,
}

impl Served {
  pub fn from_network(response: HttpResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(entry: Entry) -> Self {
    Self {
      response: entry.into(),
      source: ResponseSource::Cache,
    }
  }

  pub fn offline() -> Self {
    Self {
      response: offline::placeholder(),
      source: ResponseSource::Offline,
    }
  }
}

/// Shared state for the three policies.
///
/// Store failures inside a policy are logged and treated like a cache miss
/// (reads) or skipped (writes); they never fail a request on their own.
/// Once retired, no policy writes to the store again.
pub struct Policies<S: NamespaceStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  version: u32,
  inflight: InFlightSet,
  network_timeout: Duration,
  background: Mutex<Vec<JoinHandle<()>>>,
  retired: Arc<AtomicBool>,
}

impl<S: NamespaceStore, F: Fetcher> Policies<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>, version: u32, network_timeout: Duration) -> Self {
    Self {
      store,
      fetcher,
      version,
      inflight: InFlightSet::new(),
      network_timeout,
      background: Mutex::new(Vec::new()),
      retired: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn inflight(&self) -> &InFlightSet {
    &self.inflight
  }

  /// Current-version namespace name for a role.
  pub fn namespace_name(&self, role: CacheRole) -> String {
    NamespaceName::new(role, self.version).to_string()
  }

  /// Open the current namespace for a role. A retired instance opens nothing,
  /// since opening creates the namespace.
  fn namespace(&self, role: CacheRole) -> Option<Namespace> {
    if self.is_retired() {
      return None;
    }

    let name = self.namespace_name(role);
    match self.store.open(&name) {
      Ok(ns) => Some(ns),
      Err(e) => {
        warn!(namespace = %name, error = %e, "failed to open namespace");
        None
      }
    }
  }

  fn lookup(&self, ns: Option<&Namespace>, key: &str) -> Option<Entry> {
    let ns = ns?;
    match self.store.get(ns, key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(namespace = ns.name(), key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn write(&self, ns: Option<&Namespace>, key: &str, response: &HttpResponse) {
    if self.is_retired() {
      debug!(key, "retired, dropping cache write");
      return;
    }
    write_entry(self.store.as_ref(), ns, key, response);
  }

  pub fn is_retired(&self) -> bool {
    self.retired.load(Ordering::SeqCst)
  }

  /// Stop writing to the store and abort outstanding background refreshes.
  ///
  /// A refresh that has already passed its last await point checks the retired
  /// flag before writing.
  pub fn retire(&self) {
    self.retired.store(true, Ordering::SeqCst);

    let pending = {
      let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
      mem::take(&mut *background)
    };
    for handle in &pending {
      handle.abort();
    }
    debug!(aborted = pending.len(), "background refreshes aborted");
  }

  fn track(&self, handle: JoinHandle<()>) {
    let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
    background.retain(|h| !h.is_finished());
    background.push(handle);
  }

  /// Wait until every spawned background refresh has finished.
  pub async fn settle(&self) {
    loop {
      let pending = {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *background)
      };

      if pending.is_empty() {
        return;
      }

      for handle in pending {
        match handle.await {
          Ok(()) => {}
          Err(e) if e.is_cancelled() => debug!("background refresh cancelled"),
          Err(e) => warn!(error = %e, "background refresh task aborted"),
        }
      }
    }
  }
}

fn write_entry<S: NamespaceStore>(
  store: &S,
  ns: Option<&Namespace>,
  key: &str,
  response: &HttpResponse,
) {
  let Some(ns) = ns else {
    return;
  };

  if let Err(e) = store.put(ns, &response.to_entry(key)) {
    warn!(namespace = ns.name(), key, error = %e, "cache write failed");
  }
}
