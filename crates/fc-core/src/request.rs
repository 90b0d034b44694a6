//! The SQL a controller tracks, plus the static table/column footprint used
//! to decide whether a committed transaction could have affected it.

use fc_observer::SelectionInfo;
use sqlx::Arguments;
use sqlx::sqlite::SqliteArguments;

use crate::row::ColumnValue;

/// A bound parameter value. Mirrors [`ColumnValue`]'s variants so request
/// construction doesn't need to go through JSON.
#[derive(Debug, Clone)]
pub enum BindValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl From<&ColumnValue> for BindValue {
   fn from(value: &ColumnValue) -> Self {
      match value {
         ColumnValue::Null => BindValue::Null,
         ColumnValue::Integer(v) => BindValue::Integer(*v),
         ColumnValue::Real(v) => BindValue::Real(*v),
         ColumnValue::Text(v) => BindValue::Text(v.clone()),
         ColumnValue::Blob(v) => BindValue::Blob(v.clone()),
      }
   }
}

/// A tracked query: raw SQL plus bound parameters.
///
/// [`Request::selection`] is computed once, eagerly, at construction time —
/// either from an explicit caller-supplied footprint (precise) or by
/// heuristically parsing `sql` (conservative, widened on any ambiguity). See
/// [`fc_observer::SelectionInfo::parse_sql`].
#[derive(Debug, Clone)]
pub struct Request {
   sql: String,
   bindings: Vec<BindValue>,
   selection: SelectionInfo,
}

impl Request {
   pub fn new(sql: impl Into<String>) -> Self {
      let sql = sql.into();
      let selection = SelectionInfo::parse_sql(&sql);
      Self {
         sql,
         bindings: Vec::new(),
         selection,
      }
   }

   /// Use an explicit, precise table/column footprint instead of the
   /// heuristic SQL parse — appropriate when the caller knows exactly which
   /// tables and columns the query reads (e.g. it was built from a typed
   /// query builder rather than hand-written SQL).
   pub fn with_selection(mut self, selection: SelectionInfo) -> Self {
      self.selection = selection;
      self
   }

   pub fn bind(mut self, value: impl Into<BindValue>) -> Self {
      self.bindings.push(value.into());
      self
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   pub fn selection(&self) -> &SelectionInfo {
      &self.selection
   }

   pub(crate) fn arguments(&self) -> SqliteArguments<'static> {
      let mut args = SqliteArguments::default();
      for value in &self.bindings {
         match value {
            BindValue::Null => args.add(Option::<i64>::None).ok(),
            BindValue::Integer(v) => args.add(*v).ok(),
            BindValue::Real(v) => args.add(*v).ok(),
            BindValue::Text(v) => args.add(v.clone()).ok(),
            BindValue::Blob(v) => args.add(v.clone()).ok(),
         };
      }
      args
   }
}

impl From<i64> for BindValue {
   fn from(v: i64) -> Self {
      BindValue::Integer(v)
   }
}
impl From<&str> for BindValue {
   fn from(v: &str) -> Self {
      BindValue::Text(v.to_string())
   }
}
impl From<String> for BindValue {
   fn from(v: String) -> Self {
      BindValue::Text(v)
   }
}
impl From<f64> for BindValue {
   fn from(v: f64) -> Self {
      BindValue::Real(v)
   }
}
impl From<Vec<u8>> for BindValue {
   fn from(v: Vec<u8>) -> Self {
      BindValue::Blob(v)
   }
}
