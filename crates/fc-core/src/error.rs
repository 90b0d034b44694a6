//! Error types for fc-core.

use thiserror::Error;

/// Errors a `FetchedController` may surface through its error callback or
/// return from a direct call.
#[derive(Error, Debug)]
pub enum Error {
   /// A column in a fetched row could not be decoded into a [`crate::row::ColumnValue`].
   #[error("failed to decode column `{0}`: {1}")]
   Decode(String, String),

   /// The SQL request could not be prepared (bad syntax, unknown table/column).
   #[error("failed to prepare request: {0}")]
   Prepare(String),

   /// The request prepared successfully but failed during execution.
   #[error("failed to execute request: {0}")]
   Execution(String),

   /// Projecting a fetched row into the caller's element type failed.
   #[error("failed to map row to element: {0}")]
   Mapping(String),

   /// Error from the connection-management crate.
   #[error(transparent)]
   Conn(#[from] fc_sqlite_conn::Error),

   /// Error from the transaction-observation crate.
   #[error(transparent)]
   Observer(#[from] fc_observer::Error),

   /// Error from the sqlx library.
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// The controller was used after its underlying database was closed.
   #[error("controller is inert: underlying database was closed")]
   Inert,
}

impl Error {
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Decode(..) => "DECODE_ERROR",
         Error::Prepare(_) => "PREPARE_ERROR",
         Error::Execution(_) => "EXECUTION_ERROR",
         Error::Mapping(_) => "MAPPING_ERROR",
         Error::Conn(_) => "CONN_ERROR",
         Error::Observer(_) => "OBSERVER_ERROR",
         Error::Sqlx(_) => "SQLX_ERROR",
         Error::Inert => "CONTROLLER_INERT",
      }
   }
}

/// Conditions that indicate a programming error rather than a runtime
/// failure: an invalid request shape, a misuse of the controller's API
/// contract. These panic rather than returning a `Result`, matching the
/// taxonomy's distinction between "the database said no" and "the caller
/// asked for something incoherent."
pub(crate) fn programmer_error(message: impl std::fmt::Display) -> ! {
   panic!("fc-core programmer error: {message}");
}
