//! The cache worker: one explicit service object owning routing, policies,
//! lifecycle, and the control channel.

use color_eyre::{eyre::eyre, Result};
use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::control::{self, ControlCommand, ControlReply};
use crate::lifecycle::{ActivationReport, InstallReport, Lifecycle, LifecycleState};
use crate::network::Fetcher;
use crate::policy::{Policies, Served};
use crate::router::{cache_key, Request, Route, Router};
use crate::store::{CacheRole, NamespaceName, NamespaceStore};

/// Concurrent fetches during install warm-up.
const WARM_UP_CONCURRENCY: usize = 4;

/// How an intercepted request was handled.
#[derive(Debug, Clone)]
pub enum Outcome {
  /// Not intercepted; the caller should go to the network itself
  Passthrough,
  Served(Served),
}

pub struct CacheWorker<S: NamespaceStore, F: Fetcher> {
  config: WorkerConfig,
  store: Arc<S>,
  fetcher: Arc<F>,
  router: Router,
  policies: Policies<S, F>,
  lifecycle: Lifecycle,
}

impl<S: NamespaceStore, F: Fetcher> CacheWorker<S, F> {
  pub fn new(config: WorkerConfig, store: Arc<S>, fetcher: Arc<F>) -> Self {
    let router = Router::new(
      &config.origin,
      config.content_pattern.clone(),
      &config.static_assets,
    );
    let policies = Policies::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      config.cache_version,
      config.network_timeout,
    );

    Self {
      config,
      store,
      fetcher,
      router,
      policies,
      lifecycle: Lifecycle::new(),
    }
  }

  pub fn state(&self) -> LifecycleState {
    self.lifecycle.state()
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  /// Names of the current-version namespaces.
  pub fn current_namespaces(&self) -> Vec<String> {
    NamespaceName::current_set(self.config.cache_version)
  }

  pub fn connect_client(&self, id: &str) {
    self.lifecycle.connect_client(id);
  }

  pub fn disconnect_client(&self, id: &str) {
    self.lifecycle.disconnect_client(id);
  }

  /// Create the current namespaces and warm the static namespace.
  ///
  /// Individual asset failures are logged and reported, never fatal.
  pub async fn install(&self) -> Result<InstallReport> {
    self.lifecycle.ensure_installing()?;
    info!(version = self.config.cache_version, "installing");

    for role in [CacheRole::Static, CacheRole::Content] {
      let name = self.policies.namespace_name(role);
      if let Err(e) = self.store.open(&name) {
        warn!(namespace = %name, error = %e, "failed to create namespace");
      }
    }

    let results: Vec<(String, Result<()>)> = stream::iter(self.config.static_assets.iter())
      .map(|path| async move { (path.clone(), self.precache(path).await) })
      .buffer_unordered(WARM_UP_CONCURRENCY)
      .collect()
      .await;

    let mut report = InstallReport::default();
    for (path, result) in results {
      match result {
        Ok(()) => report.cached.push(path),
        Err(e) => {
          warn!(path = %path, error = %e, "static asset not pre-cached");
          report.failed.push(path);
        }
      }
    }
    report.cached.sort();
    report.failed.sort();

    self.lifecycle.mark_installed();
    info!(
      cached = report.cached.len(),
      failed = report.failed.len(),
      "install complete"
    );
    Ok(report)
  }

  async fn precache(&self, path: &str) -> Result<()> {
    let url = self.config.origin.join(path)?;
    let response = self.fetcher.fetch(&url).await?;
    if !response.is_success() {
      return Err(eyre!("HTTP {} for {}", response.status, url));
    }

    let ns = self.store.open(&self.policies.namespace_name(CacheRole::Static))?;
    self.store.put(&ns, &response.to_entry(&cache_key(&url)))
  }

  /// Evict every namespace outside the current version and take over open clients.
  pub fn activate(&self) -> Result<ActivationReport> {
    self.lifecycle.ensure_can_activate()?;

    let current = self.current_namespaces();
    let mut evicted = Vec::new();

    match self.store.list_namespaces() {
      Ok(names) => {
        for name in names.into_iter().filter(|n| !current.contains(n)) {
          match NamespaceName::parse(&name) {
            Some(parsed) => {
              debug!(namespace = %name, version = parsed.version, "evicting old version")
            }
            None => debug!(namespace = %name, "evicting foreign namespace"),
          }
          match self.store.delete_namespace(&name) {
            Ok(_) => evicted.push(name),
            Err(e) => warn!(namespace = %name, error = %e, "failed to evict namespace"),
          }
        }
      }
      Err(e) => warn!(error = %e, "failed to list namespaces, skipping eviction"),
    }

    let claimed_clients = self.lifecycle.activate();
    info!(evicted = ?evicted, claimed_clients, "activated");

    Ok(ActivationReport {
      evicted,
      claimed_clients,
    })
  }

  /// Bring up a restarted process.
  ///
  /// If the current version is already installed in the store, activate without
  /// warm-up; otherwise install and activate.
  pub async fn resume(&self) -> Result<LifecycleState> {
    if self.lifecycle.state() == LifecycleState::Active {
      return Ok(LifecycleState::Active);
    }

    let existing = self.store.list_namespaces().unwrap_or_default();
    let installed = [CacheRole::Static, CacheRole::Content]
      .into_iter()
      .all(|role| existing.contains(&self.policies.namespace_name(role)));

    if installed {
      debug!("current version already installed");
      self.lifecycle.mark_installed();
    } else {
      self.install().await?;
    }

    self.activate()?;
    Ok(self.lifecycle.state())
  }

  /// Stop serving; a newer instance has taken over.
  ///
  /// Outstanding background refreshes are aborted and no later write from this
  /// instance reaches the store, so evicted namespaces stay evicted.
  pub fn supersede(&self) {
    info!(version = self.config.cache_version, "superseded");
    self.lifecycle.supersede();
    self.policies.retire();
  }

  /// Route and serve one request.
  ///
  /// `Err` only carries a network failure that the matched policy propagates.
  pub async fn handle_request(&self, request: &Request) -> Result<Outcome> {
    if let Some(client_id) = &request.client_id {
      self.lifecycle.connect_client(client_id);
    }

    if self.lifecycle.state() != LifecycleState::Active {
      return Ok(Outcome::Passthrough);
    }

    let route = self.router.route(request);
    debug!(url = %request.url, ?route, "routing request");

    let served = match route {
      Route::Passthrough => return Ok(Outcome::Passthrough),
      Route::CacheFirst => {
        self
          .policies
          .cache_first(CacheRole::Static, &request.url)
          .await?
      }
      Route::StaleWhileRevalidate => self.policies.stale_while_revalidate(&request.url).await?,
      Route::NetworkFirst => self.policies.network_first(&request.url).await?,
    };

    Ok(Outcome::Served(served))
  }

  /// Parse and apply a raw control message. Unrecognized messages are logged and ignored.
  pub async fn handle_message(
    &self,
    message: &str,
    reply_to: Option<oneshot::Sender<ControlReply>>,
  ) -> Option<ControlReply> {
    match ControlCommand::parse(message) {
      Ok(command) => self.handle_command(command, reply_to).await,
      Err(e) => {
        warn!(error = %e, "ignoring control message");
        None
      }
    }
  }

  /// Apply a control command. A reply, if any, is also sent to `reply_to`.
  pub async fn handle_command(
    &self,
    command: ControlCommand,
    reply_to: Option<oneshot::Sender<ControlReply>>,
  ) -> Option<ControlReply> {
    debug!(?command, "control command");

    let result: Result<Option<ControlReply>> = match command {
      ControlCommand::ClearCache => control::clear_all(self.store.as_ref()).map(|_| None),
      ControlCommand::ClearSlideCache => {
        let name = self.policies.namespace_name(CacheRole::Content);
        control::clear_namespace(self.store.as_ref(), &name).map(|_| None)
      }
      ControlCommand::ClearNamespace { name } => {
        control::clear_namespace(self.store.as_ref(), &name).map(|_| None)
      }
      ControlCommand::PreloadSlides { slides } => {
        control::preload(&self.policies, &self.router, &self.config.origin, slides).await;
        Ok(None)
      }
      ControlCommand::GetCacheStatus => {
        let counts = control::status(self.store.as_ref(), &self.current_namespaces());
        Ok(Some(ControlReply::CacheStatus(counts)))
      }
    };

    let reply = match result {
      Ok(reply) => reply,
      Err(e) => {
        warn!(error = %e, "control command failed");
        None
      }
    };

    if let (Some(reply), Some(tx)) = (&reply, reply_to) {
      if tx.send(reply.clone()).is_err() {
        debug!("control reply receiver dropped");
      }
    }

    reply
  }

  /// Wait for outstanding background revalidations.
  pub async fn settle(&self) {
    self.policies.settle().await;
  }
}
