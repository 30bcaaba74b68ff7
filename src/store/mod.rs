//! Persistent cache storage partitioned into versioned namespaces.
//!
//! Each namespace holds one category of resource (`static`, `content`, `runtime`)
//! for one cache version. Writes replace whole entries; nothing is patched in place.

mod naming;
mod sqlite;
mod traits;

pub use naming::{CacheRole, NamespaceName};
pub use sqlite::SqliteStore;
pub use traits::{Entry, Namespace, NamespaceStore};
