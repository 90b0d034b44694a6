//! `TransactionObserver`: the dirty-flag tracker registered with the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use libsqlite3_sys::sqlite3;
use sqlx::{Row, SqliteConnection};
use tracing::trace;

use crate::change::ChangeOperation;
use crate::hooks::{self, HookToken};
use crate::selection::SelectionInfo;

/// Invoked on the writer context when a transaction that could affect the
/// observer's selection has just committed. Implemented by the fetch
/// scheduler that owns this observer; kept as a trait here so this crate
/// doesn't need to depend on the scheduler's crate.
pub trait CommitSink: Send + Sync {
   fn on_dirty_commit(&self);
}

struct Inner {
   selection_info: SelectionInfo,
   table_columns: HashMap<String, Vec<String>>,
   dirty: AtomicBool,
   invalid: AtomicBool,
   sink: Arc<dyn CommitSink>,
}

/// A cheaply-cloneable handle to an observer's state, passed into the raw
/// SQLite hook context. Every method here may run on an FFI callstack, so
/// none of them are allowed to block or allocate unboundedly.
#[derive(Clone)]
pub struct ObserverHandle {
   inner: Arc<Inner>,
}

impl ObserverHandle {
   pub(crate) fn references_table(&self, table: &str) -> bool {
      self.inner.selection_info.references_table(table)
   }

   pub(crate) fn table_columns(&self, table: &str) -> &[String] {
      self.inner
         .table_columns
         .get(table)
         .map(Vec::as_slice)
         .unwrap_or(&[])
   }

   pub(crate) fn note_change(&self, op: ChangeOperation, table: &str, changed_columns: &[&str]) {
      if self.inner.invalid.load(Ordering::Relaxed) {
         return;
      }
      if self
         .inner
         .selection_info
         .observes(op, table, Some(changed_columns))
      {
         self.inner.dirty.store(true, Ordering::SeqCst);
      }
   }

   pub(crate) fn note_commit(&self) {
      if self.inner.invalid.load(Ordering::Relaxed) {
         return;
      }
      if self.inner.dirty.swap(false, Ordering::SeqCst) {
         trace!("dirty transaction committed, scheduling fetch");
         self.inner.sink.on_dirty_commit();
      }
   }

   pub(crate) fn note_rollback(&self) {
      if self.inner.invalid.load(Ordering::Relaxed) {
         return;
      }
      self.inner.dirty.store(false, Ordering::SeqCst);
   }
}

/// Observes a database's commit/rollback callbacks on behalf of one
/// `FetchedController`, flagging "possibly dirty" per transaction and
/// handing off a fetch to the controller's [`CommitSink`] on commit.
///
/// Single-use with respect to invalidation: once [`TransactionObserver::invalidate`]
/// is called, the instance must be replaced rather than reactivated (this is
/// what request replacement and controller teardown both do).
pub struct TransactionObserver {
   handle: ObserverHandle,
   token: Option<HookToken>,
}

impl TransactionObserver {
   /// Construct a new, not-yet-registered observer.
   pub fn new(
      selection_info: SelectionInfo,
      table_columns: HashMap<String, Vec<String>>,
      sink: Arc<dyn CommitSink>,
   ) -> Self {
      Self {
         handle: ObserverHandle {
            inner: Arc::new(Inner {
               selection_info,
               table_columns,
               dirty: AtomicBool::new(false),
               invalid: AtomicBool::new(false),
               sink,
            }),
         },
         token: None,
      }
   }

   /// Register this observer's hooks on `conn`'s underlying raw connection.
   ///
   /// Safe to call once; registering twice replaces the previous token
   /// without unregistering it, so callers should unregister first.
   pub async fn register(&mut self, conn: &mut SqliteConnection) -> crate::Result<()> {
      let mut locked = conn
         .lock_handle()
         .await
         .map_err(|e| crate::Error::Database(format!("failed to lock connection handle: {e}")))?;
      let db: *mut sqlite3 = locked.as_raw_handle().as_ptr();

      let token = unsafe { hooks::register_hooks(db, self.handle.clone())? };
      self.token = Some(token);
      Ok(())
   }

   /// Atomically mark this observer invalid; subsequent hook callbacks
   /// become no-ops. Does not itself remove the raw SQLite hooks — call
   /// [`TransactionObserver::unregister`] (or drop the observer) for that.
   pub fn invalidate(&self) {
      self.handle.inner.invalid.store(true, Ordering::SeqCst);
   }

   pub fn is_invalid(&self) -> bool {
      self.handle.inner.invalid.load(Ordering::SeqCst)
   }

   /// Remove the raw SQLite hooks this observer registered, if any.
   pub fn unregister(&mut self) {
      if let Some(token) = self.token.take() {
         unsafe { hooks::unregister_hooks(token) };
      }
   }

   pub fn selection_info(&self) -> &SelectionInfo {
      &self.handle.inner.selection_info
   }
}

impl Drop for TransactionObserver {
   fn drop(&mut self) {
      self.invalidate();
      self.unregister();
   }
}

/// Query `PRAGMA table_info` for each table in `tables`, returning an
/// ordered column-name list per table. Used to map preupdate hook column
/// indices back to names before a [`TransactionObserver`] is constructed.
pub async fn fetch_table_columns(
   conn: &mut SqliteConnection,
   tables: impl IntoIterator<Item = &str>,
) -> crate::Result<HashMap<String, Vec<String>>> {
   let mut result = HashMap::new();
   for table in tables {
      let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
         .fetch_all(&mut *conn)
         .await?;
      let mut columns = Vec::with_capacity(rows.len());
      for row in &rows {
         let name: String = row.try_get("name")?;
         columns.push(name);
      }
      result.insert(table.to_string(), columns);
   }
   Ok(result)
}
