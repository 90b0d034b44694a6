//! Error types for fc-sqlite-conn

use thiserror::Error;

/// Errors that may occur when working with fc-sqlite-conn.
#[derive(Error, Debug)]
pub enum Error {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant.
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Database has been closed and cannot be used.
   #[error("Database has been closed")]
   DatabaseClosed,
}

impl Error {
   /// Machine-readable error code for this error, stable across variant reordering.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Io(_) => "IO_ERROR",
         Error::Sqlx(_) => "SQLX_ERROR",
         Error::DatabaseClosed => "DATABASE_CLOSED",
      }
   }
}
