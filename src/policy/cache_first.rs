use color_eyre::Result;
use tracing::debug;
use url::Url;

use super::{Policies, Served};
use crate::network::Fetcher;
use crate::router::cache_key;
use crate::store::{CacheRole, Namespace, NamespaceStore};

impl<S: NamespaceStore, F: Fetcher> Policies<S, F> {
  /// Serve from the `role` namespace, going to the network only on a miss.
  ///
  /// A successful (2xx) network response is written through. Any other network
  /// result is returned unchanged, and a transport failure is propagated.
  pub async fn cache_first(&self, role: CacheRole, url: &Url) -> Result<Served> {
    let key = cache_key(url);
    let ns = self.namespace(role);

    if let Some(entry) = self.lookup(ns.as_ref(), &key) {
      debug!(key = %key, "cache-first hit");
      return Ok(Served::from_cache(entry));
    }

    debug!(key = %key, "cache-first miss");
    self.fetch_into(ns.as_ref(), &key, url).await
  }

  /// Fetch `url` and write a 2xx response into the `role` namespace, replacing
  /// any cached entry. Used for explicit refreshes such as preloading.
  pub async fn fetch_and_store(&self, role: CacheRole, url: &Url) -> Result<Served> {
    let ns = self.namespace(role);
    self.fetch_into(ns.as_ref(), &cache_key(url), url).await
  }

  async fn fetch_into(&self, ns: Option<&Namespace>, key: &str, url: &Url) -> Result<Served> {
    let response = self.fetcher.fetch(url).await?;

    if response.is_success() {
      self.write(ns, key, &response);
    }

    Ok(Served::from_network(response))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::ResponseSource;
  use crate::store::SqliteStore;
  use crate::testing::{FailingStore, FakeNetwork};
  use std::sync::Arc;
  use std::time::Duration;

  const BASE: &str = "http://localhost:8080";

  fn url(path: &str) -> Url {
    Url::parse(&format!("{}{}", BASE, path)).unwrap()
  }

  type Fixture = (
    Arc<SqliteStore>,
    Arc<FakeNetwork>,
    Policies<SqliteStore, FakeNetwork>,
  );

  fn setup() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let net = Arc::new(FakeNetwork::new());
    let policies = Policies::new(Arc::clone(&store), Arc::clone(&net), 1, Duration::from_secs(1));
    (store, net, policies)
  }

  #[tokio::test]
  async fn test_repeated_reads_hit_cache_without_network() {
    let (_store, net, policies) = setup();
    net.respond("/css/a.css", 200, "text/css", "body{}");

    let first = policies.cache_first(CacheRole::Static, &url("/css/a.css")).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);

    for _ in 0..5 {
      let again = policies.cache_first(CacheRole::Static, &url("/css/a.css")).await.unwrap();
      assert_eq!(again.source, ResponseSource::Cache);
      assert_eq!(again.response.body, first.response.body);
    }

    assert_eq!(net.calls("/css/a.css"), 1);
  }

  #[tokio::test]
  async fn test_returns_last_successful_put() {
    let (store, net, policies) = setup();
    net.respond("/index.html", 200, "text/html", "v1");
    policies.cache_first(CacheRole::Static, &url("/index.html")).await.unwrap();

    // Network now has newer content, but cache-first keeps serving the stored bytes
    net.respond("/index.html", 200, "text/html", "v2");
    let served = policies.cache_first(CacheRole::Static, &url("/index.html")).await.unwrap();
    assert_eq!(served.response.body, b"v1");

    let ns = store.open("static-v1").unwrap();
    assert_eq!(store.list_keys(&ns).unwrap(), vec![format!("{}/index.html", BASE)]);
  }

  #[tokio::test]
  async fn test_non_success_is_returned_but_not_stored() {
    let (store, net, policies) = setup();
    net.respond("/icons/icon.png", 404, "text/plain", "missing");

    let served = policies.cache_first(CacheRole::Static, &url("/icons/icon.png")).await.unwrap();
    assert_eq!(served.response.status, 404);
    assert_eq!(served.source, ResponseSource::Network);

    let ns = store.open("static-v1").unwrap();
    assert!(store.list_keys(&ns).unwrap().is_empty());

    policies.cache_first(CacheRole::Static, &url("/icons/icon.png")).await.unwrap();
    assert_eq!(net.calls("/icons/icon.png"), 2);
  }

  #[tokio::test]
  async fn test_network_failure_propagates() {
    let (_store, net, policies) = setup();
    net.fail("/css/a.css");

    assert!(policies.cache_first(CacheRole::Static, &url("/css/a.css")).await.is_err());
  }

  #[tokio::test]
  async fn test_store_failure_falls_back_to_network() {
    let net = Arc::new(FakeNetwork::new());
    net.respond("/index.html", 200, "text/html", "index");
    let policies = Policies::new(
      Arc::new(FailingStore),
      Arc::clone(&net),
      1,
      Duration::from_secs(1),
    );

    let served = policies.cache_first(CacheRole::Static, &url("/index.html")).await.unwrap();
    assert_eq!(served.response.body, b"index");
    assert_eq!(served.source, ResponseSource::Network);
  }

  #[tokio::test]
  async fn test_fetch_and_store_replaces_cached_entry() {
    let (_store, net, policies) = setup();
    net.respond("/html/slide-1-1.html", 200, "text/html", "old");
    let target = url("/html/slide-1-1.html");
    policies.cache_first(CacheRole::Content, &target).await.unwrap();

    net.respond("/html/slide-1-1.html", 200, "text/html", "new");
    let served = policies.fetch_and_store(CacheRole::Content, &target).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);

    let cached = policies.cache_first(CacheRole::Content, &target).await.unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.response.body, b"new");
    assert_eq!(net.calls("/html/slide-1-1.html"), 2);
  }
}
