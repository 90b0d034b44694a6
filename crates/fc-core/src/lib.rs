//! # fc-core
//!
//! A reactive fetched-results controller for SQLite: run a query, get back a
//! result set; keep it subscribed and it re-fetches after every committed
//! transaction that could plausibly have changed it
//! ([`fc_observer::SelectionInfo`] decides "plausibly"), diffs old against
//! new, and hands the caller a minimal [`EditEvent`] script on a notification
//! context of the caller's choosing.
//!
//! ## Core Types
//!
//! - **[`FetchedController`]**: the public facade — fetch, track, read, invalidate.
//! - **[`Request`]**: the tracked SQL plus its bound parameters and selection footprint.
//! - **[`RowSnapshot`]**: an immutable, hashable snapshot of one fetched row.
//! - **[`Item`]**: a snapshot plus a lazily-computed, memoized projection into the caller's element type.
//! - **[`EditEvent`]**: one entry of a computed diff — insertion, deletion, move, or update.
//! - **[`SectionView`]**: a cheap, read-only index over the controller's current result set.
//! - **[`NotificationContext`]**: the caller-chosen serial executor callbacks are delivered on.
//!
//! ## Architecture
//!
//! [`row`] and [`item`] define the data model; [`differ`] computes edit
//! scripts over it without any database or IO dependency. [`request`] wraps a
//! tracked query. [`scheduler`] bridges [`fc_observer::CommitSink`] (the
//! writer-context commit signal) to a [`NotificationContext`] (the caller's
//! delivery context), preserving commit order even though individual fetches
//! race each other. [`controller`] ties all of it together behind a phased
//! state machine.

mod controller;
mod differ;
mod error;
mod item;
mod request;
mod row;
mod scheduler;
mod section;

pub use controller::{FetchedController, TxFuture};
pub use differ::{EditEvent, apply, diff};
pub use error::Error;
pub use item::{ColumnIdentity, Identity, Item, Projector};
pub use request::{BindValue, Request};
pub use row::{ColumnValue, RowSnapshot};
pub use scheduler::{BoxFuture, FetchScheduler, NotificationContext, TokioSerialQueue};
pub use section::SectionView;

pub use fc_observer::{ColumnSet, SelectionInfo};
pub use fc_sqlite_conn::SqliteDatabase;

pub type Result<T> = std::result::Result<T, Error>;
