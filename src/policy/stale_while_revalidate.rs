use color_eyre::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::{write_entry, Policies, Served};
use crate::network::Fetcher;
use crate::router::cache_key;
use crate::store::{CacheRole, NamespaceStore};

impl<S: NamespaceStore, F: Fetcher> Policies<S, F> {
  /// Serve slide documents from the `content` namespace.
  ///
  /// A hit returns immediately and kicks off at most one background refresh per key.
  /// A miss fetches synchronously; if the network is unreachable the offline
  /// placeholder is returned instead of an error.
  pub async fn stale_while_revalidate(&self, url: &Url) -> Result<Served> {
    let key = cache_key(url);
    let ns = self.namespace(CacheRole::Content);

    if let Some(entry) = self.lookup(ns.as_ref(), &key) {
      debug!(key = %key, "serving cached content");
      self.revalidate(url, &key);
      return Ok(Served::from_cache(entry));
    }

    match self.fetcher.fetch(url).await {
      Ok(response) => {
        if response.is_success() {
          self.write(ns.as_ref(), &key, &response);
        }
        Ok(Served::from_network(response))
      }
      Err(e) => {
        warn!(key = %key, error = %e, "content unavailable, serving offline placeholder");
        Ok(Served::offline())
      }
    }
  }

  /// Spawn a background refresh for `key` unless one is already outstanding.
  fn revalidate(&self, url: &Url, key: &str) {
    let Some(guard) = self.inflight.try_acquire(key) else {
      debug!(key, "revalidation already in flight");
      return;
    };

    let store = Arc::clone(&self.store);
    let fetcher = Arc::clone(&self.fetcher);
    let ns_name = self.namespace_name(CacheRole::Content);
    let retired = Arc::clone(&self.retired);
    let url = url.clone();
    let key = key.to_string();

    let handle = tokio::spawn(async move {
      let _guard = guard;

      let response = match fetcher.fetch(&url).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
          debug!(key = %key, status = response.status, "revalidation got non-success status");
          return;
        }
        Err(e) => {
          debug!(key = %key, error = %e, "revalidation failed, keeping stale entry");
          return;
        }
      };

      if retired.load(Ordering::SeqCst) {
        debug!(key = %key, "retired, discarding refreshed content");
        return;
      }

      let ns = match store.open(&ns_name) {
        Ok(ns) => ns,
        Err(e) => {
          warn!(namespace = %ns_name, error = %e, "failed to open namespace");
          return;
        }
      };

      let changed = match store.get(&ns, &key) {
        Ok(Some(previous)) => previous.digest != response.to_entry(&key).digest,
        _ => true,
      };

      write_entry(store.as_ref(), Some(&ns), &key, &response);

      if changed {
        info!(key = %key, "content updated in background");
      } else {
        debug!(key = %key, "content unchanged");
      }
    });

    self.track(handle);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::ResponseSource;
  use crate::store::SqliteStore;
  use crate::testing::{FailingStore, FakeNetwork};
  use std::time::{Duration, Instant};

  const SLIDE: &str = "/html/slide-1-2.html";

  fn url(path: &str) -> Url {
    Url::parse(&format!("http://localhost:8080{}", path)).unwrap()
  }

  type Fixture = (
    Arc<SqliteStore>,
    Arc<FakeNetwork>,
    Arc<Policies<SqliteStore, FakeNetwork>>,
  );

  fn setup() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let net = Arc::new(FakeNetwork::new());
    let policies = Arc::new(Policies::new(
      Arc::clone(&store),
      Arc::clone(&net),
      1,
      Duration::from_secs(1),
    ));
    (store, net, policies)
  }

  fn cached_body(store: &SqliteStore, path: &str) -> Option<Vec<u8>> {
    let ns = store.open("content-v1").unwrap();
    store
      .get(&ns, &cache_key(&url(path)))
      .unwrap()
      .map(|entry| entry.body)
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores() {
    let (store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "<h1>v1</h1>");

    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(cached_body(&store, SLIDE), Some(b"<h1>v1</h1>".to_vec()));
    policies.settle().await;
    assert_eq!(net.calls(SLIDE), 1);
  }

  #[tokio::test]
  async fn test_hit_serves_stale_then_refreshes() {
    let (store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "v1");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    net.respond(SLIDE, 200, "text/html", "v2");
    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, b"v1");

    policies.settle().await;
    assert_eq!(cached_body(&store, SLIDE), Some(b"v2".to_vec()));
    assert_eq!(net.calls(SLIDE), 2);
    assert!(!policies.inflight().contains(&cache_key(&url(SLIDE))));
  }

  #[tokio::test]
  async fn test_hit_does_not_wait_for_network() {
    let (_store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "v1");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    net.set_latency(Duration::from_millis(500));
    let started = Instant::now();
    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    assert_eq!(served.source, ResponseSource::Cache);
    assert!(started.elapsed() < Duration::from_millis(200));
    policies.settle().await;
  }

  #[tokio::test]
  async fn test_concurrent_hits_share_one_revalidation() {
    let (_store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "v1");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    net.set_latency(Duration::from_millis(200));
    let requests: Vec<_> = (0..20)
      .map(|_| {
        let policies = Arc::clone(&policies);
        tokio::spawn(async move { policies.stale_while_revalidate(&url(SLIDE)).await })
      })
      .collect();

    for request in requests {
      let served = request.await.unwrap().unwrap();
      assert_eq!(served.source, ResponseSource::Cache);
    }

    policies.settle().await;
    assert_eq!(net.calls(SLIDE), 2);
    assert_eq!(net.peak_concurrency(SLIDE), 1);
  }

  #[tokio::test]
  async fn test_failed_revalidation_keeps_stale_entry() {
    let (store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "v1");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    net.fail(SLIDE);
    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();
    assert_eq!(served.response.body, b"v1");

    policies.settle().await;
    assert_eq!(cached_body(&store, SLIDE), Some(b"v1".to_vec()));
    assert!(!policies.inflight().contains(&cache_key(&url(SLIDE))));

    // The key is free again, so the next hit schedules a fresh attempt
    net.respond(SLIDE, 200, "text/html", "v3");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();
    policies.settle().await;
    assert_eq!(cached_body(&store, SLIDE), Some(b"v3".to_vec()));
  }

  #[tokio::test]
  async fn test_non_success_revalidation_is_not_stored() {
    let (store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "v1");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    net.respond(SLIDE, 500, "text/plain", "oops");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();
    policies.settle().await;

    assert_eq!(cached_body(&store, SLIDE), Some(b"v1".to_vec()));
  }

  #[tokio::test]
  async fn test_miss_while_offline_serves_placeholder() {
    let (store, net, policies) = setup();
    net.fail(SLIDE);

    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    assert_eq!(served.source, ResponseSource::Offline);
    assert_eq!(served.response.status, 200);
    assert!(served.response.header("content-type").unwrap().starts_with("text/html"));
    assert_eq!(cached_body(&store, SLIDE), None);
  }

  #[tokio::test]
  async fn test_miss_with_non_success_is_returned() {
    let (store, net, policies) = setup();
    net.respond(SLIDE, 404, "text/html", "not found");

    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, 404);
    assert_eq!(cached_body(&store, SLIDE), None);
  }

  #[tokio::test]
  async fn test_store_failure_serves_from_network() {
    let net = Arc::new(FakeNetwork::new());
    net.respond(SLIDE, 200, "text/html", "v1");
    let policies = Policies::new(
      Arc::new(FailingStore),
      Arc::clone(&net),
      1,
      Duration::from_secs(1),
    );

    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.body, b"v1");

    net.fail(SLIDE);
    let served = policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();
    assert_eq!(served.source, ResponseSource::Offline);
  }

  #[tokio::test]
  async fn test_retire_stops_pending_refresh() {
    let (store, net, policies) = setup();
    net.respond(SLIDE, 200, "text/html", "v1");
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    net.respond(SLIDE, 200, "text/html", "v2");
    net.set_latency(Duration::from_millis(200));
    policies.stale_while_revalidate(&url(SLIDE)).await.unwrap();

    store.delete_namespace("content-v1").unwrap();
    policies.retire();
    policies.settle().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(store.list_namespaces().unwrap().is_empty());
    assert!(!policies.inflight().contains(&cache_key(&url(SLIDE))));
  }
}
