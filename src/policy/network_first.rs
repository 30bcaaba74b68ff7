use color_eyre::eyre::{eyre, Report};
use color_eyre::Result;
use tracing::debug;
use url::Url;

use super::{Policies, Served};
use crate::network::{Fetcher, HttpResponse};
use crate::router::cache_key;
use crate::store::{CacheRole, NamespaceStore};

/// Why the network attempt could not be used directly.
enum NetworkMiss {
  Status(HttpResponse),
  Failed(Report),
}

impl<S: NamespaceStore, F: Fetcher> Policies<S, F> {
  /// Serve dynamic JSON from the network, falling back to the `runtime` namespace.
  ///
  /// The network attempt is bounded by the configured timeout. With no cached
  /// fallback, a non-success response is returned as is and a transport failure
  /// or timeout is propagated.
  pub async fn network_first(&self, url: &Url) -> Result<Served> {
    let key = cache_key(url);
    let ns = self.namespace(CacheRole::Runtime);

    let miss = match tokio::time::timeout(self.network_timeout, self.fetcher.fetch(url)).await {
      Ok(Ok(response)) if response.is_success() => {
        self.write(ns.as_ref(), &key, &response);
        return Ok(Served::from_network(response));
      }
      Ok(Ok(response)) => NetworkMiss::Status(response),
      Ok(Err(e)) => NetworkMiss::Failed(e),
      Err(_) => NetworkMiss::Failed(eyre!(
        "Timed out after {}ms fetching {}",
        self.network_timeout.as_millis(),
        url
      )),
    };

    if let Some(entry) = self.lookup(ns.as_ref(), &key) {
      debug!(key = %key, "network unavailable, serving cached JSON");
      return Ok(Served::from_cache(entry));
    }

    match miss {
      NetworkMiss::Status(response) => Ok(Served::from_network(response)),
      NetworkMiss::Failed(e) => Err(e),
    }
  }
}
