//! Hook for code that needs a read snapshot pinned before the writer
//! context is released, rather than whenever a later task happens to run.

use std::future::Future;
use std::pin::Pin;

use crate::Result;
use crate::database::SqliteDatabase;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Registered with a [`SqliteDatabase`] via
/// [`SqliteDatabase::register_pending_fetch_sink`]. After every
/// [`SqliteDatabase::write`] closure returns — while the writer guard is
/// still held, so no other writer can run yet — each registered sink gets a
/// chance to pin a read-transaction snapshot of the state the write closure
/// just committed, before the guard is dropped and some other write can
/// land ahead of whatever uses that snapshot.
///
/// Implementations are expected to no-op cheaply when they have nothing
/// pending (most calls to `write` touch tables no sink cares about).
pub trait PendingFetchSink: Send + Sync {
   fn pin_snapshot<'a>(&'a self, db: &'a SqliteDatabase) -> BoxFuture<'a, Result<()>>;
}
