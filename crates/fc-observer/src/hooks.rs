//! SQLite native hook registration for observing changes to the database.
//!
//! This module provides low-level bindings to SQLite's `preupdate_hook`,
//! `commit_hook`, and `rollback_hook` APIs for transaction-aware change
//! tracking.
//!
//! # SQLite Requirements
//!
//! The preupdate hook requires SQLite compiled with `SQLITE_ENABLE_PREUPDATE_HOOK`.
//! Use [`is_preupdate_hook_enabled()`] to check at runtime whether the linked
//! SQLite library supports this feature.

#![allow(unsafe_op_in_unsafe_fn)] // SQLite FFI requires unsafe calls

use std::ffi::{CStr, CString, c_int, c_void};
use std::ptr;

use libsqlite3_sys::{
   SQLITE_BLOB, SQLITE_DELETE, SQLITE_FLOAT, SQLITE_INSERT, SQLITE_INTEGER, SQLITE_NULL,
   SQLITE_TEXT, SQLITE_UPDATE, sqlite3, sqlite3_commit_hook, sqlite3_compileoption_used,
   sqlite3_preupdate_count, sqlite3_preupdate_hook, sqlite3_preupdate_new, sqlite3_preupdate_old,
   sqlite3_rollback_hook, sqlite3_value, sqlite3_value_blob, sqlite3_value_bytes,
   sqlite3_value_double, sqlite3_value_int64, sqlite3_value_text, sqlite3_value_type,
};
use tracing::{debug, trace};

use crate::change::ChangeOperation;
use crate::observer::ObserverHandle;

/// A SQLite value extracted from preupdate hooks.
///
/// Represents the typed value of a column before or after a change operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl SqliteValue {
   /// Extracts a value from a raw sqlite3_value pointer.
   ///
   /// # Safety
   ///
   /// The pointer must be valid and point to a properly initialized sqlite3_value.
   unsafe fn from_raw(value: *mut sqlite3_value) -> Self {
      if value.is_null() {
         return SqliteValue::Null;
      }

      match sqlite3_value_type(value) {
         SQLITE_NULL => SqliteValue::Null,
         SQLITE_INTEGER => SqliteValue::Integer(sqlite3_value_int64(value)),
         SQLITE_FLOAT => SqliteValue::Real(sqlite3_value_double(value)),
         SQLITE_TEXT => {
            let text_ptr = sqlite3_value_text(value);
            if text_ptr.is_null() {
               SqliteValue::Null
            } else {
               let cstr = CStr::from_ptr(text_ptr as *const i8);
               SqliteValue::Text(cstr.to_string_lossy().into_owned())
            }
         }
         SQLITE_BLOB => {
            let blob_ptr = sqlite3_value_blob(value);
            let len = sqlite3_value_bytes(value) as usize;
            if blob_ptr.is_null() || len == 0 {
               SqliteValue::Blob(Vec::new())
            } else {
               let slice = std::slice::from_raw_parts(blob_ptr as *const u8, len);
               SqliteValue::Blob(slice.to_vec())
            }
         }
         _ => SqliteValue::Null,
      }
   }
}

/// Context data passed to SQLite hook callbacks.
///
/// Stored as the `user_data` pointer in SQLite hooks. Reclaimed and dropped
/// by [`unregister_hooks`].
struct HookContext {
   handle: ObserverHandle,
}

/// Checks if the linked SQLite library was compiled with `SQLITE_ENABLE_PREUPDATE_HOOK`.
///
/// This should be checked before attempting to use observation features.
pub fn is_preupdate_hook_enabled() -> bool {
   let opt_name = CString::new("ENABLE_PREUPDATE_HOOK").expect("CString::new failed");
   unsafe { sqlite3_compileoption_used(opt_name.as_ptr()) == 1 }
}

/// Opaque token identifying a registered set of hooks, returned by
/// [`register_hooks`] so the caller can later call [`unregister_hooks`] to
/// remove them and reclaim the heap-allocated [`HookContext`].
#[derive(Clone, Copy)]
pub struct HookToken {
   db: *mut sqlite3,
   context_ptr: *mut c_void,
}

// SAFETY: the token is just an address; SQLite's hook APIs are safe to call
// from any thread that owns exclusive access to `db`, which register/unregister
// require of their callers.
unsafe impl Send for HookToken {}

/// Registers all observation hooks on a raw SQLite connection.
///
/// # Safety
///
/// - `db` must be a valid pointer to an open sqlite3 connection.
/// - Must be called from the same thread that owns the connection, or the
///   connection must be in serialized threading mode.
/// - The returned [`HookToken`] must be passed to [`unregister_hooks`] before
///   `db` is closed, or the heap-allocated context will leak.
///
/// # Errors
///
/// Returns an error if preupdate hooks are not supported by the linked SQLite
/// library.
pub unsafe fn register_hooks(db: *mut sqlite3, handle: ObserverHandle) -> crate::Result<HookToken> {
   if !is_preupdate_hook_enabled() {
      return Err(crate::Error::HookRegistration(
         "SQLite was not compiled with SQLITE_ENABLE_PREUPDATE_HOOK. \
             Ensure you're using a SQLite build with preupdate hook support, \
             or enable the 'bundled' feature on libsqlite3-sys."
            .to_string(),
      ));
   }

   debug!("Registering SQLite observation hooks");

   let context = Box::new(HookContext { handle });
   let context_ptr = Box::into_raw(context) as *mut c_void;

   sqlite3_preupdate_hook(db, Some(preupdate_callback), context_ptr);
   sqlite3_commit_hook(db, Some(commit_callback), context_ptr);
   sqlite3_rollback_hook(db, Some(rollback_callback), context_ptr);

   trace!("SQLite hooks registered successfully");
   Ok(HookToken { db, context_ptr })
}

/// Removes hooks previously installed by [`register_hooks`] and drops the
/// context they carried.
///
/// # Safety
///
/// `token` must have been returned by a prior call to `register_hooks` for
/// the same `db`, and `db` must still be open.
pub unsafe fn unregister_hooks(token: HookToken) {
   sqlite3_preupdate_hook(token.db, None, ptr::null_mut());
   sqlite3_commit_hook(token.db, None, ptr::null_mut());
   sqlite3_rollback_hook(token.db, None, ptr::null_mut());

   drop(Box::from_raw(token.context_ptr as *mut HookContext));
   trace!("SQLite hooks unregistered");
}

/// Preupdate hook callback - observes a single row change before it commits.
///
/// Called by SQLite for INSERT, UPDATE, and DELETE operations.
unsafe extern "C" fn preupdate_callback(
   user_data: *mut c_void,
   db: *mut sqlite3,
   op: c_int,
   _database: *const i8,
   table: *const i8,
   old_rowid: i64,
   new_rowid: i64,
) {
   if user_data.is_null() || table.is_null() {
      return;
   }

   let context = &*(user_data as *const HookContext);
   let table_name = match CStr::from_ptr(table).to_str() {
      Ok(s) => s,
      Err(_) => return,
   };

   if !context.handle.references_table(table_name) {
      return;
   }

   let operation = match op {
      SQLITE_INSERT => ChangeOperation::Insert,
      SQLITE_UPDATE => ChangeOperation::Update,
      SQLITE_DELETE => ChangeOperation::Delete,
      _ => return,
   };

   trace!(table = %table_name, ?operation, old_rowid, new_rowid, "Preupdate hook fired");

   if operation != ChangeOperation::Update {
      context.handle.note_change(operation, table_name, &[]);
      return;
   }

   let column_count = sqlite3_preupdate_count(db);
   if column_count < 0 {
      return;
   }
   let column_count = column_count as usize;

   let mut changed_columns: Vec<&str> = Vec::new();
   let column_names = context.handle.table_columns(table_name);

   for i in 0..column_count {
      let mut old_value: *mut sqlite3_value = ptr::null_mut();
      let mut new_value: *mut sqlite3_value = ptr::null_mut();
      let has_old = sqlite3_preupdate_old(db, i as c_int, &mut old_value) == 0;
      let has_new = sqlite3_preupdate_new(db, i as c_int, &mut new_value) == 0;

      let old = if has_old {
         SqliteValue::from_raw(old_value)
      } else {
         SqliteValue::Null
      };
      let new = if has_new {
         SqliteValue::from_raw(new_value)
      } else {
         SqliteValue::Null
      };

      if old != new
         && let Some(name) = column_names.get(i)
      {
         changed_columns.push(name);
      }
   }

   context
      .handle
      .note_change(operation, table_name, &changed_columns);
}

/// Commit hook callback - hands off a fetch if the transaction was dirty.
///
/// Returning 0 allows the commit to proceed; returning non-zero would
/// instead turn it into a rollback, which we never want here.
unsafe extern "C" fn commit_callback(user_data: *mut c_void) -> c_int {
   if user_data.is_null() {
      return 0;
   }

   let context = &*(user_data as *const HookContext);
   trace!("Commit hook fired");
   context.handle.note_commit();

   0
}

/// Rollback hook callback - discards the dirty flag for the transaction.
unsafe extern "C" fn rollback_callback(user_data: *mut c_void) {
   if user_data.is_null() {
      return;
   }

   let context = &*(user_data as *const HookContext);
   trace!("Rollback hook fired");
   context.handle.note_rollback();
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn sqlite_value_from_null_pointer() {
      let value = unsafe { SqliteValue::from_raw(ptr::null_mut()) };
      assert_eq!(value, SqliteValue::Null);
   }
}
