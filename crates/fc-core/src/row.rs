//! Immutable, hashable snapshots of a single fetched row.

use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use sqlx::{Column, Row, TypeInfo, ValueRef, sqlite::SqliteRow};

use crate::error::Error;

/// A single SQLite column value, decoded to a form that is `Hash`/`Eq` so
/// [`RowSnapshot`] can be compared and deduplicated without re-querying.
///
/// `Real` compares and hashes by exact IEEE-754 bit pattern (`f64::to_bits`),
/// not by numeric equality: two floating-point reads of the identical stored
/// value always produce identical bits, while `NaN != NaN` under numeric
/// comparison would otherwise make a row appear to differ from itself between
/// two fetches that read exactly the same bytes from disk.
#[derive(Debug, Clone)]
pub enum ColumnValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl PartialEq for ColumnValue {
   fn eq(&self, other: &Self) -> bool {
      match (self, other) {
         (Self::Null, Self::Null) => true,
         (Self::Integer(a), Self::Integer(b)) => a == b,
         (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
         (Self::Text(a), Self::Text(b)) => a == b,
         (Self::Blob(a), Self::Blob(b)) => a == b,
         _ => false,
      }
   }
}

impl Eq for ColumnValue {}

impl Hash for ColumnValue {
   fn hash<H: Hasher>(&self, state: &mut H) {
      std::mem::discriminant(self).hash(state);
      match self {
         Self::Null => {}
         Self::Integer(v) => v.hash(state),
         Self::Real(v) => v.to_bits().hash(state),
         Self::Text(v) => v.hash(state),
         Self::Blob(v) => v.hash(state),
      }
   }
}

impl ColumnValue {
   pub fn as_json(&self) -> serde_json::Value {
      match self {
         Self::Null => serde_json::Value::Null,
         Self::Integer(v) => serde_json::Value::from(*v),
         Self::Real(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
         Self::Text(v) => serde_json::Value::from(v.clone()),
         Self::Blob(v) => {
            use base64::Engine;
            serde_json::Value::from(base64::engine::general_purpose::STANDARD.encode(v))
         }
      }
   }
}

/// An ordered, immutable view of one fetched row, keyed by column name.
///
/// Two snapshots compare equal (and hash equal) iff every column name/value
/// pair matches, independent of column order: the same prepared statement
/// always yields columns in the same order, so in practice order never
/// actually differs between two snapshots of the same query, but the
/// comparison itself is defined order-independently for clarity.
#[derive(Debug, Clone)]
pub struct RowSnapshot {
   columns: IndexMap<String, ColumnValue>,
}

impl RowSnapshot {
   /// Builds a snapshot directly from already-decoded columns. Used by tests
   /// and by callers that assemble rows from something other than a live
   /// `SqliteRow` (e.g. a typed in-memory fixture).
   pub fn from_parts(columns: IndexMap<String, ColumnValue>) -> Self {
      Self { columns }
   }

   pub fn from_row(row: &SqliteRow) -> Result<Self, Error> {
      let mut columns = IndexMap::with_capacity(row.columns().len());
      for (index, column) in row.columns().iter().enumerate() {
         let raw = row
            .try_get_raw(index)
            .map_err(|e| Error::Decode(column.name().to_string(), e.to_string()))?;
         let value = if raw.is_null() {
            ColumnValue::Null
         } else {
            match raw.type_info().name() {
               "INTEGER" | "BOOLEAN" => ColumnValue::Integer(
                  row
                     .try_get(index)
                     .map_err(|e| Error::Decode(column.name().to_string(), e.to_string()))?,
               ),
               "REAL" => ColumnValue::Real(
                  row
                     .try_get(index)
                     .map_err(|e| Error::Decode(column.name().to_string(), e.to_string()))?,
               ),
               "TEXT" => ColumnValue::Text(
                  row
                     .try_get(index)
                     .map_err(|e| Error::Decode(column.name().to_string(), e.to_string()))?,
               ),
               _ => ColumnValue::Blob(
                  row
                     .try_get(index)
                     .map_err(|e| Error::Decode(column.name().to_string(), e.to_string()))?,
               ),
            }
         };
         columns.insert(column.name().to_string(), value);
      }
      Ok(Self { columns })
   }

   pub fn get(&self, column: &str) -> Option<&ColumnValue> {
      self.columns.get(column)
   }

   pub fn column_names(&self) -> impl Iterator<Item = &str> {
      self.columns.keys().map(String::as_str)
   }

   pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
      self.columns.iter().map(|(k, v)| (k.as_str(), v))
   }

   /// The set of column names whose values differ between `self` and `other`.
   /// Columns present in only one snapshot are counted as differing.
   pub fn diff_columns(&self, other: &Self) -> IndexMap<String, ColumnValue> {
      let mut changed = IndexMap::new();
      for (name, value) in &self.columns {
         if other.columns.get(name) != Some(value) {
            changed.insert(name.clone(), value.clone());
         }
      }
      for (name, value) in &other.columns {
         if !self.columns.contains_key(name) {
            changed.insert(name.clone(), value.clone());
         }
      }
      changed
   }
}

impl PartialEq for RowSnapshot {
   fn eq(&self, other: &Self) -> bool {
      self.columns.len() == other.columns.len()
         && self
            .columns
            .iter()
            .all(|(k, v)| other.columns.get(k) == Some(v))
   }
}

impl Eq for RowSnapshot {}

impl Hash for RowSnapshot {
   fn hash<H: Hasher>(&self, state: &mut H) {
      // Order-independent: combine per-pair hashes with XOR so that
      // RowSnapshot's Hash stays consistent with its order-independent Eq.
      let mut combined: u64 = 0;
      for (k, v) in &self.columns {
         let mut pair_hasher = std::collections::hash_map::DefaultHasher::new();
         k.hash(&mut pair_hasher);
         v.hash(&mut pair_hasher);
         combined ^= pair_hasher.finish();
      }
      combined.hash(state);
   }
}
