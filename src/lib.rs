//! Offline cache and request interception layer for slide presentations.
//!
//! Every outgoing request is classified into one of three caching policies:
//! - Cache-First for static shell assets
//! - Stale-While-Revalidate for compiled slide documents
//! - Network-First with cache fallback for dynamic JSON
//!
//! Cached responses live in versioned namespaces (`static-v1`, `content-v1`, ...)
//! that are created at install time and evicted when a newer version activates.
//! A small control channel clears namespaces, preloads slides, and reports status.

pub mod config;
pub mod control;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod policy;
pub mod router;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{Config, WorkerConfig};
pub use control::{ControlCommand, ControlReply};
pub use lifecycle::LifecycleState;
pub use network::{Fetcher, HttpFetcher, HttpResponse};
pub use router::{Method, Request};
pub use store::{NamespaceStore, SqliteStore};
pub use worker::{CacheWorker, Outcome};
