//! # fc-sqlite-conn
//!
//! A minimal wrapper around sqlx that enforces pragmatic SQLite connection
//! policies: a concurrent read-only pool and a single-connection write pool
//! that serializes writers for free.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: main database type with separate read and write connection pools
//! - **[`SqliteDatabaseConfig`]**: configuration for connection pool settings
//! - **[`WriteGuard`]**: RAII guard ensuring exclusive write access
//! - **[`PendingFetchSink`]**: hook [`SqliteDatabase::write`] calls, still holding the
//!   writer guard, to let a reactive observer pin a read snapshot before the guard drops
//! - **[`Error`]**: error type for database operations
//!
//! ## Architecture
//!
//! - **Connection pooling**: separate read-only pool and write pool with a max of 1 connection
//! - **Lazy WAL mode**: write-ahead logging enabled automatically on first write
//! - **Exclusive writes**: single-connection write pool enforces serialized write access,
//!   which is exactly the "writer context" serial execution domain a reactive controller
//!   built on top of this crate needs: holding a [`WriteGuard`] for a transaction already
//!   blocks every other writer, without a bespoke queue type.
//! - **Concurrent reads**: multiple readers can query simultaneously via the read pool,
//!   each observing a WAL-isolated snapshot of the database as of the moment their read
//!   transaction begins.
//!
//! ## Usage
//!
//! ```no_run
//! use fc_sqlite_conn::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> fc_sqlite_conn::Result<()> {
//!     let db = SqliteDatabase::connect("example.db", None).await?;
//!
//!     // Multiple connects to the same path return the same instance.
//!     let db2 = SqliteDatabase::connect("example.db", None).await?;
//!     assert!(std::sync::Arc::ptr_eq(&db, &db2));
//!
//!     let rows = sqlx::query("SELECT * FROM users")
//!         .fetch_all(db.read_pool()?)
//!         .await?;
//!
//!     let mut writer = db.acquire_writer().await?;
//!     sqlx::query("INSERT INTO users (name) VALUES (?)")
//!         .bind("Alice")
//!         .execute(&mut *writer)
//!         .await?;
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! - Uses sqlx's `SqlitePoolOptions` for all pool configuration
//! - Uses sqlx's `SqliteConnectOptions` for connection flags and configuration
//! - Minimal custom logic - delegates to sqlx wherever possible
//! - Global registry caches new database instances and returns existing ones
//! - WAL mode is enabled lazily only when writes are needed
//! - No schema migration support and no cross-database ATTACH support: both are
//!   out of scope for the reactive controller this crate backs.

mod config;
mod database;
mod error;
mod pending_fetch;
mod registry;
mod write_guard;

pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::Error;
pub use pending_fetch::{BoxFuture, PendingFetchSink};
pub use write_guard::WriteGuard;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
