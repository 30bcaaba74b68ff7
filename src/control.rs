//! Out-of-band cache administration messages.
//!
//! Messages arrive as JSON, independent of the request path:
//!
//! ```json
//! {"type": "CLEAR_CACHE"}
//! {"type": "CLEAR_SLIDE_CACHE"}
//! {"type": "CLEAR_NAMESPACE", "data": {"name": "runtime-v1"}}
//! {"type": "PRELOAD_SLIDES", "data": {"slides": [{"htmlPath": "/html/slide-1-1.html"}]}}
//! {"type": "GET_CACHE_STATUS"}
//! ```
//!
//! Only `GET_CACHE_STATUS` produces a reply: `{"type": "CACHE_STATUS", "data": {"<namespace>": <count>}}`.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use url::Url;

use crate::network::Fetcher;
use crate::policy::Policies;
use crate::router::Router;
use crate::store::{CacheRole, Namespace, NamespaceStore};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
  /// Delete every namespace
  ClearCache,
  /// Delete the current content namespace
  ClearSlideCache,
  /// Delete one namespace by name
  ClearNamespace { name: String },
  /// Fetch and store slide documents ahead of time
  PreloadSlides { slides: Vec<PreloadItem> },
  /// Report entry counts per namespace
  GetCacheStatus,
}

impl ControlCommand {
  pub fn parse(message: &str) -> Result<Self> {
    serde_json::from_str(message).map_err(|e| eyre!("Unrecognized control message: {}", e))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadItem {
  #[serde(default)]
  pub id: Option<String>,
  pub html_path: String,
  /// Lower values load first; items without one load last
  #[serde(default)]
  pub priority: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
  CacheStatus(BTreeMap<String, usize>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
  pub loaded: usize,
  pub failed: usize,
  pub skipped: usize,
}

/// Delete one namespace. Unknown names are not an error.
pub fn clear_namespace<S: NamespaceStore>(store: &S, name: &str) -> Result<bool> {
  let removed = store.delete_namespace(name)?;
  info!(namespace = name, removed, "namespace cleared");
  Ok(removed)
}

/// Delete every namespace. Returns how many were removed.
pub fn clear_all<S: NamespaceStore>(store: &S) -> Result<usize> {
  let mut removed = 0;
  for name in store.list_namespaces()? {
    match store.delete_namespace(&name) {
      Ok(true) => removed += 1,
      Ok(false) => {}
      Err(e) => warn!(namespace = %name, error = %e, "failed to clear namespace"),
    }
  }
  info!(removed, "all namespaces cleared");
  Ok(removed)
}

/// Best-effort preload of slide documents into the content namespace.
///
/// Every item is fetched and stored again, so a preload refreshes stale slides.
/// Items run in priority order; one failing item never stops the rest.
pub async fn preload<S: NamespaceStore, F: Fetcher>(
  policies: &Policies<S, F>,
  router: &Router,
  origin: &Url,
  mut items: Vec<PreloadItem>,
) -> PreloadReport {
  items.sort_by_key(|item| item.priority.unwrap_or(u32::MAX));

  let mut report = PreloadReport::default();

  for item in items {
    let label = item.id.as_deref().unwrap_or(&item.html_path);

    let url = match origin.join(&item.html_path) {
      Ok(url) if router.is_same_origin(&url) => url,
      Ok(url) => {
        warn!(item = label, url = %url, "skipping cross-origin preload");
        report.skipped += 1;
        continue;
      }
      Err(e) => {
        warn!(item = label, error = %e, "skipping preload with invalid path");
        report.skipped += 1;
        continue;
      }
    };

    match policies.fetch_and_store(CacheRole::Content, &url).await {
      Ok(served) if served.response.is_success() => report.loaded += 1,
      Ok(served) => {
        warn!(item = label, status = served.response.status, "preload got non-success status");
        report.failed += 1;
      }
      Err(e) => {
        warn!(item = label, error = %e, "preload failed");
        report.failed += 1;
      }
    }
  }

  info!(
    loaded = report.loaded,
    failed = report.failed,
    skipped = report.skipped,
    "preload finished"
  );
  report
}

/// Entry counts for every existing namespace plus the current-version ones.
///
/// Never fails: a namespace that cannot be read reports zero.
pub fn status<S: NamespaceStore>(store: &S, current: &[String]) -> BTreeMap<String, usize> {
  let mut names = match store.list_namespaces() {
    Ok(names) => names,
    Err(e) => {
      warn!(error = %e, "failed to list namespaces");
      Vec::new()
    }
  };

  let existing = names.clone();
  names.extend(current.iter().cloned());

  names
    .into_iter()
    .map(|name| {
      let count = if existing.contains(&name) {
        store
          .list_keys(&Namespace::new(name.as_str()))
          .map(|keys| keys.len())
          .unwrap_or_else(|e| {
            warn!(namespace = %name, error = %e, "failed to count entries");
            0
          })
      } else {
        0
      };
      (name, count)
    })
    .collect()
}
