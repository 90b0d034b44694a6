//! # fc-observer
//!
//! SQLite transaction observation via native `preupdate_hook`/`commit_hook`/
//! `rollback_hook` callbacks, filtered through a [`SelectionInfo`] describing
//! which tables and columns a query actually reads.
//!
//! ## Core Types
//!
//! - **[`SelectionInfo`]**: static description of a query's table/column footprint
//! - **[`TransactionObserver`]**: the dirty-flag tracker registered with a connection
//! - **[`CommitSink`]**: the callback a [`TransactionObserver`] hands a dirty commit to
//!
//! ## Architecture
//!
//! Unlike a broadcast pub/sub of every row change, this crate tracks a single
//! boolean "possibly dirty" flag per observer, set by `preupdate_hook` when an
//! event matches the observer's `SelectionInfo`, and consumed by `commit_hook`,
//! which hands off to the observer's [`CommitSink`] only when the flag was set.
//! This mirrors exactly how much information a reactive fetch controller
//! needs: not *what* changed, just *whether* a re-fetch is warranted.

mod change;
mod error;
mod hooks;
mod observer;
mod selection;

pub use change::ChangeOperation;
pub use error::Error;
pub use hooks::is_preupdate_hook_enabled;
pub use observer::{CommitSink, TransactionObserver, fetch_table_columns};
pub use selection::{ColumnSet, SelectionInfo};

pub type Result<T> = std::result::Result<T, Error>;
