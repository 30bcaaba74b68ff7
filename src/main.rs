use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use slidecache::policy::ResponseSource;
use slidecache::{
  CacheWorker, Config, ControlCommand, Fetcher, HttpFetcher, Method, Outcome, Request, SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "slidecache")]
#[command(about = "Offline cache and request interception for slide decks")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/slidecache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin to serve, overriding the config file
  #[arg(long)]
  origin: Option<String>,

  /// Cache version, overriding the config file
  #[arg(long)]
  cache_version: Option<u32>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Install the current cache version and activate it
  Install,
  /// Route a request through the cache and write the body to stdout
  Get {
    /// Path on the origin (e.g. /html/slide-1-1.html) or an absolute URL
    target: String,
    /// HTTP method; anything but GET passes straight through
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Client the request is issued for
    #[arg(long)]
    client: Option<String>,
  },
  /// Apply a JSON control message, e.g. '{"type":"CLEAR_SLIDE_CACHE"}'
  Control { message: String },
  /// Print entry counts per namespace
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(origin) = args.origin {
    config.origin = origin;
  }
  if let Some(version) = args.cache_version {
    config.cache_version = version;
  }

  let _log_guard = slidecache::logging::init(&config.log)?;

  let worker_config = config.worker_config()?;
  let origin = worker_config.origin.clone();
  let store = Arc::new(SqliteStore::open(&config.database_path()?)?);
  let fetcher = Arc::new(HttpFetcher::new()?);
  let worker = CacheWorker::new(worker_config, store, fetcher);

  match args.command {
    Commands::Install => {
      let install = worker.install().await?;
      let activation = worker.activate()?;

      println!("cached:  {}", install.cached.join(", "));
      if !install.failed.is_empty() {
        println!("failed:  {}", install.failed.join(", "));
      }
      if !activation.evicted.is_empty() {
        println!("evicted: {}", activation.evicted.join(", "));
      }
    }
    Commands::Get {
      target,
      method,
      client,
    } => {
      let method = Method::parse(&method).ok_or_else(|| eyre!("Unsupported method: {}", method))?;
      let url = match Url::parse(&target) {
        Ok(url) => url,
        Err(_) => origin.join(&target)?,
      };

      worker.resume().await?;

      let mut request = Request::get(url.clone());
      request.method = method;
      if let Some(client) = &client {
        request = request.with_client(client.clone());
      }

      let (response, source) = match worker.handle_request(&request).await? {
        Outcome::Served(served) => (served.response, source_label(served.source)),
        Outcome::Passthrough => (worker.fetcher().fetch(&url).await?, "passthrough"),
      };

      eprintln!(
        "{} {} ({}, {})",
        response.status,
        url,
        response.header("content-type").unwrap_or("-"),
        source
      );
      std::io::stdout().write_all(&response.body)?;

      worker.settle().await;
      if let Some(client) = &client {
        worker.disconnect_client(client);
      }
    }
    Commands::Control { message } => {
      worker.resume().await?;
      if let Some(reply) = worker.handle_message(&message, None).await {
        println!("{}", serde_json::to_string_pretty(&reply)?);
      }
    }
    Commands::Status => {
      worker.resume().await?;
      if let Some(reply) = worker.handle_command(ControlCommand::GetCacheStatus, None).await {
        println!("{}", serde_json::to_string_pretty(&reply)?);
      }
    }
  }

  Ok(())
}

fn source_label(source: ResponseSource) -> &'static str {
  match source {
    ResponseSource::Network => "network",
    ResponseSource::Cache => "cache",
    ResponseSource::Offline => "offline",
  }
}
