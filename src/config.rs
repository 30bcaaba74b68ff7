use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the cache layer serves (scheme, host and port)
  pub origin: String,
  /// Bumping this supersedes every namespace of the previous version
  pub cache_version: u32,
  /// Exact paths served cache-first and pre-fetched at install
  pub static_assets: Vec<String>,
  /// Regex matched against request paths of versioned slide documents
  pub content_pattern: String,
  /// Upper bound on a network-first fetch before falling back to cache
  pub network_timeout_ms: u64,
  /// Cache database location (default: $XDG_DATA_HOME/slidecache/cache.db)
  pub database: Option<PathBuf>,
  pub log: LogConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      cache_version: 1,
      static_assets: [
        "/",
        "/index.html",
        "/css/app.css",
        "/icons/favicon.ico",
        "/manifest.json",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      content_pattern: r"^/html/slide-\d+-\d+\.html$".to_string(),
      network_timeout_ms: 5000,
      database: None,
      log: LogConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is unset
  pub level: String,
  /// Write daily-rolling log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

/// Validated settings the worker runs with.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub origin: Url,
  pub cache_version: u32,
  pub static_assets: Vec<String>,
  pub content_pattern: Regex,
  pub network_timeout: Duration,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./slidecache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/slidecache/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("slidecache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("slidecache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Database path, falling back to the per-user data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::store::SqliteStore::default_path(),
    }
  }

  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    if origin.cannot_be_a_base() || origin.host().is_none() {
      return Err(eyre!("Origin '{}' must be an absolute http(s) URL", self.origin));
    }

    let content_pattern = Regex::new(&self.content_pattern)
      .map_err(|e| eyre!("Invalid content_pattern '{}': {}", self.content_pattern, e))?;

    if let Some(bad) = self.static_assets.iter().find(|p| !p.starts_with('/')) {
      return Err(eyre!("Static asset path '{}' must start with '/'", bad));
    }

    Ok(WorkerConfig {
      origin,
      cache_version: self.cache_version,
      static_assets: self.static_assets.clone(),
      content_pattern,
      network_timeout: Duration::from_millis(self.network_timeout_ms),
    })
  }
}
