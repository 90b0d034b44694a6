//! WriteGuard for exclusive write access to the database

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;
use std::ops::{Deref, DerefMut};

/// RAII guard for exclusive write access to a database connection.
///
/// This guard wraps a pool connection and returns it to the pool on drop.
/// Only one `WriteGuard` can exist at a time (enforced by `max_connections = 1`),
/// ensuring serialized write access. This is the "writer context" serial
/// execution domain the reactive core builds on: holding a `WriteGuard` for
/// the duration of a transaction already blocks every other writer.
///
/// The guard derefs to `SqliteConnection` allowing direct use with sqlx queries.
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
}

impl WriteGuard {
   /// Create a new WriteGuard by taking ownership of a pool connection.
   pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
      Self { conn }
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}

// Drop is automatically implemented - PoolConnection returns itself to the pool.
// WriteGuard is automatically Send because PoolConnection<Sqlite> is Send.
