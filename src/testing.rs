//! Test doubles for the network and the namespace store.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::network::{Fetcher, HttpResponse};
use crate::store::{Entry, Namespace, NamespaceStore};

#[derive(Clone)]
enum Scripted {
  Respond(HttpResponse),
  Fail,
}

#[derive(Default)]
struct Counters {
  calls: HashMap<String, usize>,
  active: HashMap<String, usize>,
  peak: HashMap<String, usize>,
}

/// Scripted network keyed by URL path. Unscripted paths fail like an offline network.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Scripted>>,
  counters: Mutex<Counters>,
  latency: Mutex<Duration>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, path: &str, status: u16, content_type: &str, body: &str) {
    let response = HttpResponse::new(status, content_type, body.as_bytes().to_vec());
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), Scripted::Respond(response));
  }

  pub fn fail(&self, path: &str) {
    self.routes.lock().unwrap().insert(path.to_string(), Scripted::Fail);
  }

  pub fn set_latency(&self, latency: Duration) {
    *self.latency.lock().unwrap() = latency;
  }

  /// Number of fetches started for `path`.
  pub fn calls(&self, path: &str) -> usize {
    self.counters.lock().unwrap().calls.get(path).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.counters.lock().unwrap().calls.values().sum()
  }

  /// Highest number of simultaneously outstanding fetches seen for `path`.
  pub fn peak_concurrency(&self, path: &str) -> usize {
    self.counters.lock().unwrap().peak.get(path).copied().unwrap_or(0)
  }
}

#[async_trait]
impl Fetcher for FakeNetwork {
  async fn fetch(&self, url: &Url) -> Result<HttpResponse> {
    let path = url.path().to_string();

    {
      let mut counters = self.counters.lock().unwrap();
      *counters.calls.entry(path.clone()).or_default() += 1;
      let active = counters.active.entry(path.clone()).or_default();
      *active += 1;
      let active = *active;
      let peak = counters.peak.entry(path.clone()).or_default();
      *peak = (*peak).max(active);
    }

    let latency = *self.latency.lock().unwrap();
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }

    let scripted = self.routes.lock().unwrap().get(&path).cloned();

    if let Some(active) = self.counters.lock().unwrap().active.get_mut(&path) {
      *active -= 1;
    }

    match scripted {
      Some(Scripted::Respond(response)) => Ok(response),
      Some(Scripted::Fail) | None => Err(eyre!("network unreachable: {}", url)),
    }
  }
}

/// Store whose every operation fails, like a full or corrupt disk.
pub struct FailingStore;

impl NamespaceStore for FailingStore {
  fn open(&self, name: &str) -> Result<Namespace> {
    Err(eyre!("storage unavailable: open {}", name))
  }

  fn get(&self, ns: &Namespace, _key: &str) -> Result<Option<Entry>> {
    Err(eyre!("storage unavailable: get from {}", ns.name()))
  }

  fn put(&self, ns: &Namespace, _entry: &Entry) -> Result<()> {
    Err(eyre!("storage unavailable: put into {}", ns.name()))
  }

  fn list_keys(&self, ns: &Namespace) -> Result<Vec<String>> {
    Err(eyre!("storage unavailable: list {}", ns.name()))
  }

  fn delete(&self, ns: &Namespace, _key: &str) -> Result<bool> {
    Err(eyre!("storage unavailable: delete from {}", ns.name()))
  }

  fn delete_namespace(&self, name: &str) -> Result<bool> {
    Err(eyre!("storage unavailable: delete {}", name))
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    Err(eyre!("storage unavailable: list namespaces"))
  }
}
