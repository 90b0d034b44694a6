//! SQLite database with connection pooling and optional write access

use crate::Result;
use crate::config::SqliteDatabaseConfig;
use crate::error::Error;
use crate::pending_fetch::{BoxFuture, PendingFetchSink};
use crate::registry::{get_or_open_database, is_memory_database, uncache_database};
use crate::write_guard::WriteGuard;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;

/// Analysis limit for PRAGMA optimize on close.
/// SQLite recommends 100-1000 for older versions; 3.46.0+ handles automatically.
/// See: https://www.sqlite.org/lang_analyze.html#recommended_usage_pattern
const OPTIMIZE_ANALYSIS_LIMIT: u32 = 400;

/// SQLite database with connection pooling for concurrent reads and optional exclusive writes.
///
/// Once the database is opened it can be used for read-only operations by calling `read_pool()`.
/// Write operations are available by calling `acquire_writer()` which lazily initializes WAL mode
/// on first use.
///
/// # Example
///
/// ```no_run
/// use fc_sqlite_conn::SqliteDatabase;
///
/// # async fn example() -> Result<(), fc_sqlite_conn::Error> {
/// let db = SqliteDatabase::connect("test.db", None).await?;
///
/// let rows = sqlx::query("SELECT * FROM users")
///     .fetch_all(db.read_pool()?)
///     .await?;
///
/// let mut writer = db.acquire_writer().await?;
/// sqlx::query("INSERT INTO users (name) VALUES (?)")
///     .bind("Alice")
///     .execute(&mut *writer)
///     .await?;
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Pool of read-only connections (defaults to max_connections=6) for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,

   /// Tracks if WAL mode has been initialized (set on first write)
   wal_initialized: AtomicBool,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   /// Path to database file (used for cleanup and registry lookups)
   path: PathBuf,

   /// Sinks registered to pin a read snapshot after a `write()` closure
   /// commits, while the writer guard is still held. Weak so a sink whose
   /// owner (e.g. a controller's observation) has been torn down is
   /// dropped silently rather than kept alive or explicitly unregistered.
   pending_fetch_sinks: Mutex<Vec<Weak<dyn PendingFetchSink>>>,
}

impl SqliteDatabase {
   /// Connect to a SQLite database.
   ///
   /// If the database is already connected, returns the existing connection.
   /// Multiple calls with the same path will return the same database instance.
   ///
   /// The database is created if it doesn't exist. WAL mode is enabled when
   /// `acquire_writer()` is first called.
   ///
   /// # Arguments
   ///
   /// * `path` - Path to the SQLite database file (will be created if missing)
   /// * `custom_config` - Optional custom configuration for connection pools.
   ///   Pass `None` to use defaults (6 max read connections, 30 second idle timeout).
   pub async fn connect(
      path: impl AsRef<Path>,
      custom_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();
      let path = path.as_ref();

      if path.as_os_str().is_empty() {
         return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Database path cannot be empty",
         )));
      }

      let path = path.to_path_buf();

      get_or_open_database(&path, || async {
         let db_exists = path.exists();

         // Why do we need to manually create the database file? We could just let the connection
         // create it if it doesn't exist, using `create_if_missing(true)`, right? Not if our very
         // first query was a read-only query - the read pool connections are read-only and cannot
         // create the file.
         if !db_exists && !is_memory_database(&path) {
            let create_options = SqliteConnectOptions::new()
               .filename(&path)
               .create_if_missing(true)
               .read_only(false);

            let conn = create_options.connect().await?;
            drop(conn);
         }

         let read_options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .optimize_on_close(true, OPTIMIZE_ANALYSIS_LIMIT);

         let read_pool = SqlitePoolOptions::new()
            .max_connections(config.max_read_connections)
            .min_connections(0)
            .idle_timeout(Some(std::time::Duration::from_secs(
               config.idle_timeout_secs,
            )))
            .connect_with(read_options)
            .await?;

         let write_options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(false)
            .optimize_on_close(true, OPTIMIZE_ANALYSIS_LIMIT);

         let write_conn = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .idle_timeout(Some(std::time::Duration::from_secs(
               config.idle_timeout_secs,
            )))
            .connect_with(write_options)
            .await?;

         Ok(Self {
            read_pool,
            write_conn,
            wal_initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            path: path.clone(),
            pending_fetch_sinks: Mutex::new(Vec::new()),
         })
      })
      .await
   }

   /// Get a reference to the connection pool for executing read queries.
   ///
   /// Use this for concurrent read operations. Multiple readers can access
   /// the pool simultaneously; each sees a WAL-isolated snapshot as of the
   /// moment its own read transaction begins.
   pub fn read_pool(&self) -> Result<&Pool<Sqlite>> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }
      Ok(&self.read_pool)
   }

   /// Acquire exclusive write access to the database.
   ///
   /// This method returns a `WriteGuard` that provides exclusive access to
   /// the single write connection. Only one writer can exist at a time,
   /// which is the "writer context" serial execution domain the reactive
   /// controller relies on.
   ///
   /// On the first call, this method will enable WAL mode on the database.
   /// Subsequent calls reuse the same write connection.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }

      let mut conn = self.write_conn.acquire().await?;

      if self
         .wal_initialized
         .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
         .is_ok()
      {
         sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;

         // https://www.sqlite.org/wal.html#performance_considerations
         sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&mut *conn)
            .await?;
      }

      Ok(WriteGuard::new(conn))
   }

   /// Registers a sink to be given a chance to pin a read snapshot after
   /// every [`SqliteDatabase::write`] call, still inside the writer guard's
   /// lifetime. The registry only holds a [`Weak`] reference, so a sink
   /// whose strong owner has been dropped is pruned on the next `write`.
   pub fn register_pending_fetch_sink(&self, sink: Weak<dyn PendingFetchSink>) {
      self.pending_fetch_sinks.lock().unwrap().push(sink);
   }

   /// Runs `f` against the writer connection, then — before releasing the
   /// writer guard — gives every registered [`PendingFetchSink`] a chance to
   /// pin a read-transaction snapshot of the state `f` just committed. This
   /// is the isolation guarantee a reactive observer relies on: because the
   /// write pool has exactly one connection, nothing else can acquire it
   /// (and commit a transaction out from under a pending fetch) until this
   /// function returns and the guard is actually dropped, even though
   /// pinning a snapshot is itself an `.await` point.
   ///
   /// Prefer this over raw [`SqliteDatabase::acquire_writer`] for any write
   /// whose effects a registered controller should be allowed to observe.
   pub async fn write<F, T>(&self, f: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut WriteGuard) -> BoxFuture<'c, Result<T>>,
   {
      let mut guard = self.acquire_writer().await?;
      let result = f(&mut guard).await;
      self.pin_pending_snapshots().await;
      result
   }

   async fn pin_pending_snapshots(&self) {
      let sinks: Vec<Arc<dyn PendingFetchSink>> = {
         let mut guard = self.pending_fetch_sinks.lock().unwrap();
         guard.retain(|sink| sink.strong_count() > 0);
         guard.iter().filter_map(Weak::upgrade).collect()
      };
      for sink in sinks {
         if let Err(err) = sink.pin_snapshot(self).await {
            error!(error = %err, "failed to pin read snapshot for pending fetch");
         }
      }
   }

   /// Close the database and clean up resources.
   ///
   /// This closes all connections in the pool and removes the database from the cache.
   /// After calling close, any operations on this database will return `Error::DatabaseClosed`.
   pub async fn close(self: Arc<Self>) -> Result<()> {
      self.closed.store(true, Ordering::SeqCst);

      if let Err(e) = uncache_database(&self.path).await {
         error!("Failed to remove database from cache: {}", e);
      }

      self.read_pool.close().await;

      if self.wal_initialized.load(Ordering::SeqCst)
         && let Ok(mut conn) = self.write_conn.acquire().await
      {
         let _ = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut *conn)
            .await;
      }

      self.write_conn.close().await;

      Ok(())
   }

   /// Close the database and delete all database files.
   ///
   /// Use with caution! Deletes the main database file, the `-wal` file,
   /// and the `-shm` file.
   pub async fn remove(self: Arc<Self>) -> Result<()> {
      let path = self.path.clone();

      self.close().await?;

      std::fs::remove_file(&path).map_err(Error::Io)?;

      let wal_path = path.with_extension("db-wal");
      if let Err(e) = std::fs::remove_file(&wal_path)
         && e.kind() != std::io::ErrorKind::NotFound
      {
         return Err(Error::Io(e));
      }

      let shm_path = path.with_extension("db-shm");
      if let Err(e) = std::fs::remove_file(&shm_path)
         && e.kind() != std::io::ErrorKind::NotFound
      {
         return Err(Error::Io(e));
      }

      Ok(())
   }

   /// Path this database was opened with.
   pub fn path(&self) -> &Path {
      &self.path
   }
}
