//! Installing → Active → Superseded state machine and client takeover.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Warming up the current-version namespaces; requests are not intercepted
  Installing,
  /// Serving requests and owning every open client
  Active,
  /// Replaced by a newer instance; plays no further role in serving
  Superseded,
}

/// Outcome of install-time warm-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  /// Static paths stored during warm-up
  pub cached: Vec<String>,
  /// Static paths that could not be fetched; they are loaded lazily later
  pub failed: Vec<String>,
}

/// Outcome of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Namespaces deleted because they do not belong to the current version
  pub evicted: Vec<String>,
  /// Clients that were open before activation and are now controlled
  pub claimed_clients: usize,
}

#[derive(Debug)]
struct Inner {
  state: LifecycleState,
  installed: bool,
  clients: HashSet<String>,
  controlled: HashSet<String>,
}

/// Lifecycle bookkeeping for one worker instance.
#[derive(Debug)]
pub struct Lifecycle {
  inner: Mutex<Inner>,
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self::new()
  }
}

impl Lifecycle {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: LifecycleState::Installing,
        installed: false,
        clients: HashSet::new(),
        controlled: HashSet::new(),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn state(&self) -> LifecycleState {
    self.lock().state
  }

  /// Fail unless the instance is still installing.
  pub fn ensure_installing(&self) -> Result<()> {
    match self.lock().state {
      LifecycleState::Installing => Ok(()),
      state => Err(eyre!("Cannot install: worker is {:?}", state)),
    }
  }

  /// Record that warm-up has finished, successfully or not.
  pub fn mark_installed(&self) {
    self.lock().installed = true;
  }

  /// Fail unless the instance may activate now.
  pub fn ensure_can_activate(&self) -> Result<()> {
    let inner = self.lock();
    match inner.state {
      LifecycleState::Superseded => Err(eyre!("Cannot activate a superseded worker")),
      LifecycleState::Installing if !inner.installed => {
        Err(eyre!("Cannot activate before installation has completed"))
      }
      _ => Ok(()),
    }
  }

  /// Become Active and take control of every open client.
  /// Returns how many clients were newly claimed.
  pub fn activate(&self) -> usize {
    let mut inner = self.lock();
    inner.state = LifecycleState::Active;

    let unclaimed: Vec<String> = inner
      .clients
      .iter()
      .filter(|id| !inner.controlled.contains(*id))
      .cloned()
      .collect();
    let claimed = unclaimed.len();
    inner.controlled.extend(unclaimed);
    claimed
  }

  /// Hand every client over to the newer instance and forget them.
  pub fn supersede(&self) {
    let mut inner = self.lock();
    inner.state = LifecycleState::Superseded;
    inner.clients.clear();
    inner.controlled.clear();
  }

  /// Register an open client. Clients connecting to an active instance are
  /// controlled immediately; earlier ones wait for activation. A superseded
  /// instance tracks no clients.
  pub fn connect_client(&self, id: &str) {
    let mut inner = self.lock();
    if inner.state == LifecycleState::Superseded {
      return;
    }
    inner.clients.insert(id.to_string());
    if inner.state == LifecycleState::Active {
      inner.controlled.insert(id.to_string());
    }
  }

  pub fn disconnect_client(&self, id: &str) {
    let mut inner = self.lock();
    inner.clients.remove(id);
    inner.controlled.remove(id);
  }

  pub fn is_controlled(&self, id: &str) -> bool {
    self.lock().controlled.contains(id)
  }

  pub fn controlled_clients(&self) -> usize {
    self.lock().controlled.len()
  }
}
