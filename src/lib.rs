//! # fetched-results-controller
//!
//! Root facade crate: re-exports the pieces most callers need from
//! [`fc_core`], [`fc_observer`] and [`fc_sqlite_conn`] under one path, so a
//! typical consumer depends on this crate alone.
//!
//! ```ignore
//! use fetched_results_controller::{FetchedController, Request, SqliteDatabase, TokioSerialQueue};
//! ```
//!
//! See each underlying crate's own docs for the full API:
//! - [`fc_sqlite_conn`] — pooled SQLite connections (concurrent readers, one serialized writer).
//! - [`fc_observer`] — commit/rollback observation, filtered by a query's table/column footprint.
//! - [`fc_core`] — the reactive controller, diffing, and notification scheduling built on top of both.

pub use fc_core::{
   BindValue, BoxFuture, ColumnIdentity, ColumnSet, ColumnValue, EditEvent, Error,
   FetchScheduler, FetchedController, Identity, Item, NotificationContext, Projector, Request,
   Result, RowSnapshot, SectionView, SelectionInfo, TokioSerialQueue, TxFuture, apply, diff,
};
pub use fc_observer::ChangeOperation;
pub use fc_sqlite_conn::{PendingFetchSink, SqliteDatabase, SqliteDatabaseConfig};
