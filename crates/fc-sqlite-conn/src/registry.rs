//! Process-wide registry of open databases, keyed by canonical path.
//!
//! `SqliteDatabase::connect` is cheap to call repeatedly with the same path:
//! the first call opens the pools and caches a `Weak` handle; later calls
//! with the same path return the existing `Arc`, so independent parts of an
//! application (or multiple `FetchedController`s) can each call `connect()`
//! without negotiating ownership of the underlying pools.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use crate::Result;
use crate::database::SqliteDatabase;

static REGISTRY: LazyLock<Mutex<HashMap<PathBuf, Weak<SqliteDatabase>>>> =
   LazyLock::new(|| Mutex::new(HashMap::new()));

/// `:memory:` databases are never shared across connects: each one is a
/// distinct, private in-memory database even when the path string matches.
pub(crate) fn is_memory_database(path: &Path) -> bool {
   path.as_os_str() == ":memory:"
}

/// Return the cached database for `path` if one is still alive, otherwise
/// run `open` to create one and cache a weak reference to it.
pub(crate) async fn get_or_open_database<F, Fut>(path: &Path, open: F) -> Result<Arc<SqliteDatabase>>
where
   F: FnOnce() -> Fut,
   Fut: Future<Output = Result<SqliteDatabase>>,
{
   if !is_memory_database(path) {
      let canonical = canonical_key(path);
      if let Some(existing) = lookup(&canonical) {
         return Ok(existing);
      }
   }

   let db = Arc::new(open().await?);

   if !is_memory_database(path) {
      let canonical = canonical_key(path);
      let mut registry = REGISTRY.lock().expect("registry mutex poisoned");
      // Another task may have raced us to open the same path; prefer whichever
      // instance is already cached so callers consistently observe one Arc.
      if let Some(existing) = registry.get(&canonical).and_then(Weak::upgrade) {
         return Ok(existing);
      }
      registry.insert(canonical, Arc::downgrade(&db));
   }

   Ok(db)
}

/// Remove a database's entry from the registry. Called when a database is closed.
pub(crate) async fn uncache_database(path: &Path) -> Result<()> {
   if !is_memory_database(path) {
      let canonical = canonical_key(path);
      REGISTRY
         .lock()
         .expect("registry mutex poisoned")
         .remove(&canonical);
   }
   Ok(())
}

fn lookup(canonical: &Path) -> Option<Arc<SqliteDatabase>> {
   REGISTRY
      .lock()
      .expect("registry mutex poisoned")
      .get(canonical)
      .and_then(Weak::upgrade)
}

fn canonical_key(path: &Path) -> PathBuf {
   // The database file may not exist yet (it's created by the caller before
   // this is consulted again), so fall back to the given path verbatim
   // rather than failing the lookup when canonicalization fails.
   std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
