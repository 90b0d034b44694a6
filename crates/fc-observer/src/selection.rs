//! `SelectionInfo`: the static description of which tables and columns a
//! prepared query reads, used to answer "could an event of kind K on table T
//! affect my result?" without re-running the query.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::change::ChangeOperation;

/// The set of columns of a table a query reads, or the `All` sentinel for
/// `SELECT *` (or any table we couldn't confidently narrow down).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSet {
   All,
   Some(HashSet<String>),
}

impl ColumnSet {
   fn intersects(&self, columns: &[&str]) -> bool {
      match self {
         ColumnSet::All => true,
         ColumnSet::Some(set) => columns.iter().any(|c| set.contains(*c)),
      }
   }
}

/// Static description of which tables and columns a prepared query reads.
///
/// Built once per request, either from a typed prepared request that knows
/// its own footprint precisely, or heuristically from SQL text via
/// [`SelectionInfo::parse_sql`]. The heuristic parser is intentionally
/// conservative: anything it cannot confidently classify widens to `All`
/// columns of every referenced table rather than narrowing, because a
/// missed dependency would silently drop change notifications while a
/// spurious one only costs an extra, filtered-out wakeup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionInfo {
   tables: HashMap<String, ColumnSet>,
}

impl SelectionInfo {
   /// Build a `SelectionInfo` directly from known table/column footprints.
   pub fn new(tables: HashMap<String, ColumnSet>) -> Self {
      Self { tables }
   }

   /// A `SelectionInfo` that reads every column of the given tables.
   pub fn all_columns(tables: impl IntoIterator<Item = String>) -> Self {
      Self {
         tables: tables.into_iter().map(|t| (t, ColumnSet::All)).collect(),
      }
   }

   /// Whether `table` is referenced at all by this selection.
   pub fn references_table(&self, table: &str) -> bool {
      self.tables.contains_key(table)
   }

   /// The tables this selection reads.
   pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
      self.tables.keys().map(String::as_str)
   }

   /// Whether an event of the given kind on `table` (for updates, touching
   /// `columns`) could affect this selection's result.
   pub fn observes(&self, kind: ChangeOperation, table: &str, columns: Option<&[&str]>) -> bool {
      let Some(cols) = self.tables.get(table) else {
         return false;
      };
      match kind {
         ChangeOperation::Insert | ChangeOperation::Delete => true,
         ChangeOperation::Update => match columns {
            Some(columns) => cols.intersects(columns),
            // No column list means "assume the worst": some update touched
            // this table and we can't prove it missed us.
            None => true,
         },
      }
   }

   /// Heuristically parse a `SelectionInfo` from raw SQL text.
   ///
   /// Recognizes table names following `FROM`/`JOIN` and column names
   /// following `SELECT`; a bare `*` (or any column list we fail to split
   /// cleanly) widens to [`ColumnSet::All`] for every referenced table.
   pub fn parse_sql(sql: &str) -> Self {
      static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
         Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
      });
      static SELECT_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
         Regex::new(r"(?is)^\s*SELECT\s+(.*?)\s+FROM\s").expect("valid regex")
      });
      static IDENT_RE: LazyLock<Regex> =
         LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

      let tables: Vec<String> = TABLE_RE
         .captures_iter(sql)
         .map(|c| c[1].to_string())
         .collect();

      if tables.is_empty() {
         return Self::default();
      }

      let columns_all = match SELECT_LIST_RE.captures(sql) {
         Some(caps) => {
            let list = &caps[1];
            if list.trim() == "*" {
               true
            } else {
               // A plain, unqualified identifier list like "id, name" maps
               // cleanly to per-table columns only when there is exactly one
               // table (no ambiguity about which table owns which column);
               // anything more complex (expressions, qualified names, joins)
               // widens to ALL rather than guessing.
               tables.len() != 1
                  || list
                     .split(',')
                     .map(str::trim)
                     .any(|part| !IDENT_RE.is_match(part))
            }
         }
         None => true,
      };

      if columns_all {
         return Self::all_columns(tables);
      }

      let caps = SELECT_LIST_RE.captures(sql).expect("checked above");
      let columns: HashSet<String> = caps[1].split(',').map(|c| c.trim().to_string()).collect();

      let mut map = HashMap::new();
      map.insert(tables[0].clone(), ColumnSet::Some(columns));
      Self::new(map)
   }
}
