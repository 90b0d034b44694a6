//! Configuration for SQLite database connection pools

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::SqliteDatabase`] connection pools.
///
/// # Examples
///
/// ```
/// use fc_sqlite_conn::SqliteDatabaseConfig;
///
/// let config = SqliteDatabaseConfig::default();
///
/// let config = SqliteDatabaseConfig {
///     max_read_connections: 3,
///     idle_timeout_secs: 60,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteDatabaseConfig {
   /// Maximum number of concurrent read connections.
   ///
   /// This controls the size of the read-only connection pool.
   /// Higher values allow more concurrent read queries but consume more resources.
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for both read and write connections (in seconds).
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,
}

impl Default for SqliteDatabaseConfig {
   fn default() -> Self {
      Self {
         max_read_connections: 6,
         idle_timeout_secs: 30,
      }
   }
}
