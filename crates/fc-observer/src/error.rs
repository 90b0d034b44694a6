//! Error types for fc-observer

use thiserror::Error;

/// Errors that may occur when registering or running transaction observation.
#[derive(Error, Debug)]
pub enum Error {
   /// Hook registration failed, typically because the linked SQLite library
   /// was not compiled with `SQLITE_ENABLE_PREUPDATE_HOOK`.
   #[error("failed to register SQLite hooks: {0}")]
   HookRegistration(String),

   /// Error from the sqlx library.
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Error acquiring or using the raw connection handle.
   #[error("database error: {0}")]
   Database(String),
}

impl Error {
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::HookRegistration(_) => "HOOK_REGISTRATION_FAILED",
         Error::Sqlx(_) => "SQLX_ERROR",
         Error::Database(_) => "DATABASE_ERROR",
      }
   }
}
