//! Property tests for the quantified invariants over edit scripts: replay
//! correctness and exact changed-column sets, for randomly generated
//! before/after row lists.

use fc_core::{ColumnIdentity, ColumnValue, EditEvent, Identity, Item, RowSnapshot, apply, diff};
use indexmap::IndexMap;
use proptest::prelude::*;

fn row(id: i64, name: &str) -> RowSnapshot {
   let mut columns = IndexMap::new();
   columns.insert("id".to_string(), ColumnValue::Integer(id));
   columns.insert("name".to_string(), ColumnValue::Text(name.to_string()));
   RowSnapshot::from_parts(columns)
}

fn items(rows: Vec<RowSnapshot>) -> Vec<Item<i64>> {
   rows.into_iter().map(Item::new).collect()
}

/// Generates a small list of rows with distinct ids (a primary key can't
/// repeat within one result set) and short ASCII names.
fn row_list() -> impl Strategy<Value = Vec<RowSnapshot>> {
   prop::collection::vec((0i64..8, "[a-z]{1,4}"), 0..6).prop_map(|pairs| {
      let mut seen = std::collections::HashSet::new();
      pairs
         .into_iter()
         .filter(|(id, _)| seen.insert(*id))
         .map(|(id, name)| row(id, &name))
         .collect()
   })
}

proptest! {
   /// Applying the emitted EditEvents in order to the pre-state snapshot
   /// yields the post-state snapshot, for any pair of row lists.
   #[test]
   fn replay_reconstructs_post_state(old_rows in row_list(), new_rows in row_list()) {
      let old = items(old_rows.clone());
      let new = items(new_rows.clone());
      let events = diff(&old, &new, &ColumnIdentity::new("id"));
      let replayed = apply(&events, &old);
      let replayed_snapshots: Vec<RowSnapshot> =
         replayed.iter().map(|item| item.snapshot().clone()).collect();
      prop_assert_eq!(replayed_snapshots, new_rows);
   }

   /// For every Move/Update, changed_columns contains exactly the columns
   /// whose value differs between the matched old and new row.
   #[test]
   fn changed_columns_are_exact(old_rows in row_list(), new_rows in row_list()) {
      let old = items(old_rows);
      let new = items(new_rows);
      let identity = ColumnIdentity::new("id");
      let events = diff(&old, &new, &identity);

      for event in &events {
         if let EditEvent::Move { item, changed_columns, .. }
         | EditEvent::Update { item, changed_columns, .. } = event
         {
            // The matched old row is whichever old item the identity
            // predicate says is the same logical row.
            let old_match = old
               .iter()
               .find(|candidate| identity.same(candidate.snapshot(), item.snapshot()));
            if let Some(old_item) = old_match {
               let expected = old_item.snapshot().diff_columns(item.snapshot());
               prop_assert_eq!(changed_columns, &expected);
            }
         }
      }
   }

   /// Fetching twice with no intervening writes (i.e. diffing an identical
   /// list against itself) produces no events.
   #[test]
   fn identical_lists_produce_no_events(rows in row_list()) {
      let a = items(rows.clone());
      let b = items(rows);
      prop_assert!(diff(&a, &b, &ColumnIdentity::new("id")).is_empty());
   }
}
