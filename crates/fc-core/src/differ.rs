//! Minimal edit-script computation between two ordered result sets.

use indexmap::IndexMap;

use crate::item::{Identity, Item};
use crate::row::ColumnValue;

/// One entry of a minimal edit script transforming a pre-state result set
/// into a post-state one.
///
/// `Insertion`/`Deletion` carry the index in the *new*/`old` list respectively.
/// `Move`/`Update` both carry `changed_columns`: the set of columns whose
/// values differ between the old and new row (empty for a pure reorder with
/// no value change).
#[derive(Debug, Clone, PartialEq)]
pub enum EditEvent<E> {
   Insertion { item: E, index: usize },
   Deletion { item: E, index: usize },
   Move {
      item: E,
      from: usize,
      to: usize,
      changed_columns: IndexMap<String, ColumnValue>,
   },
   Update {
      item: E,
      index: usize,
      changed_columns: IndexMap<String, ColumnValue>,
   },
}

impl<E> EditEvent<E> {
   pub fn item(&self) -> &E {
      match self {
         Self::Insertion { item, .. }
         | Self::Deletion { item, .. }
         | Self::Move { item, .. }
         | Self::Update { item, .. } => item,
      }
   }
}

enum RawOp<E> {
   Insertion { item: Item<E>, index: usize },
   Deletion { item: Item<E>, index: usize },
}

/// Computes the minimal edit script between two ordered lists of [`Item`]s
/// and fuses matched deletion/insertion pairs into moves and updates.
///
/// ## Algorithm
///
/// 1. A standard Wagner-Fischer edit-distance matrix is built over full row
///    equality (not identity); substitution costs exactly one deletion plus
///    one insertion, never a cheaper single "replace" step. Backtracking
///    prefers a diagonal (unchanged row) whenever one is available at the
///    current cell, and prefers a deletion step over an insertion step when
///    both are optimal and neither is diagonal.
/// 2. Every raw deletion is then matched, by the caller's [`Identity`]
///    predicate, against every raw insertion; a match becomes a single
///    `Update` (same index on both sides) or `Move` (different indices)
///    event carrying the changed-columns diff. Unmatched raw ops remain
///    plain `Insertion`/`Deletion` events.
/// 3. Output order: deletions, insertions and moves first, in the order
///    they occurred in the raw script; `Update` events last.
///
/// Rows that match exactly between old and new state (including rows that
/// only changed position, while an equal-content row elsewhere happens to
/// tie the edit distance) never need to generate *any* event to be replayed
/// correctly — [`apply`] relies on exactly this: unmentioned rows are simply
/// carried along by the surrounding insertions and deletions.
pub fn diff<E>(
   old: &[Item<E>],
   new: &[Item<E>],
   identity: &dyn Identity,
) -> Vec<EditEvent<Item<E>>>
where
   E: Clone,
{
   let n = old.len();
   let m = new.len();
   let mut dp = vec![vec![0u32; m + 1]; n + 1];
   for i in 0..=n {
      dp[i][0] = i as u32;
   }
   for j in 0..=m {
      dp[0][j] = j as u32;
   }
   for i in 1..=n {
      for j in 1..=m {
         if old[i - 1].snapshot() == new[j - 1].snapshot() {
            dp[i][j] = dp[i - 1][j - 1];
         } else {
            dp[i][j] = (dp[i - 1][j] + 1)
               .min(dp[i][j - 1] + 1)
               .min(dp[i - 1][j - 1] + 2);
         }
      }
   }

   let mut raw: Vec<RawOp<E>> = Vec::new();
   let (mut i, mut j) = (n, m);
   while i > 0 || j > 0 {
      if i > 0
         && j > 0
         && old[i - 1].snapshot() == new[j - 1].snapshot()
         && dp[i][j] == dp[i - 1][j - 1]
      {
         i -= 1;
         j -= 1;
         continue;
      }
      let del_ok = i > 0 && dp[i][j] == dp[i - 1][j] + 1;
      let sub_ok = i > 0 && j > 0 && dp[i][j] == dp[i - 1][j - 1] + 2;
      let ins_ok = j > 0 && dp[i][j] == dp[i][j - 1] + 1;
      if del_ok {
         raw.push(RawOp::Deletion {
            item: old[i - 1].clone(),
            index: i - 1,
         });
         i -= 1;
      } else if sub_ok {
         raw.push(RawOp::Deletion {
            item: old[i - 1].clone(),
            index: i - 1,
         });
         raw.push(RawOp::Insertion {
            item: new[j - 1].clone(),
            index: j - 1,
         });
         i -= 1;
         j -= 1;
      } else if ins_ok {
         raw.push(RawOp::Insertion {
            item: new[j - 1].clone(),
            index: j - 1,
         });
         j -= 1;
      } else {
         unreachable!("edit-distance backtrack exhausted all options at ({i},{j})");
      }
   }
   // `raw` was built walking backward from (n, m) to (0, 0); reverse it so
   // each op's position in the vector is its forward sequence number, used
   // below to preserve "raw script order" among the final events.
   raw.reverse();

   let mut deletions: Vec<(Item<E>, usize, usize)> = Vec::new();
   let mut insertions: Vec<(Item<E>, usize, usize)> = Vec::new();
   for (seq, op) in raw.into_iter().enumerate() {
      match op {
         RawOp::Deletion { item, index } => deletions.push((item, index, seq)),
         RawOp::Insertion { item, index } => insertions.push((item, index, seq)),
      }
   }

   let mut matched_insertion = vec![false; insertions.len()];
   let mut structural: Vec<(usize, EditEvent<Item<E>>)> = Vec::new();
   let mut updates: Vec<(usize, EditEvent<Item<E>>)> = Vec::new();

   for (del_item, del_index, del_seq) in deletions {
      let pair = insertions
         .iter()
         .enumerate()
         .find(|(k, (ins_item, _, _))| {
            !matched_insertion[*k] && identity.same(del_item.snapshot(), ins_item.snapshot())
         })
         .map(|(k, _)| k);

      match pair {
         Some(k) => {
            matched_insertion[k] = true;
            let (ins_item, ins_index, ins_seq) = &insertions[k];
            let changed_columns = del_item.snapshot().diff_columns(ins_item.snapshot());
            let seq = del_seq.min(*ins_seq);
            if del_index == *ins_index {
               updates.push((
                  seq,
                  EditEvent::Update {
                     item: ins_item.clone(),
                     index: *ins_index,
                     changed_columns,
                  },
               ));
            } else {
               structural.push((
                  seq,
                  EditEvent::Move {
                     item: ins_item.clone(),
                     from: del_index,
                     to: *ins_index,
                     changed_columns,
                  },
               ));
            }
         }
         None => {
            structural.push((
               del_seq,
               EditEvent::Deletion {
                  item: del_item,
                  index: del_index,
               },
            ));
         }
      }
   }
   for (k, (ins_item, ins_index, ins_seq)) in insertions.into_iter().enumerate() {
      if !matched_insertion[k] {
         structural.push((
            ins_seq,
            EditEvent::Insertion {
               item: ins_item,
               index: ins_index,
            },
         ));
      }
   }

   structural.sort_by_key(|(seq, _)| *seq);
   updates.sort_by_key(|(seq, _)| *seq);

   structural
      .into_iter()
      .chain(updates)
      .map(|(_, event)| event)
      .collect()
}

/// Replays an edit script against `old`, returning the list it should
/// reconstruct. Used by tests to verify a computed script is correct, and
/// usable by any consumer that wants to maintain its own mirror of the
/// result set instead of replacing it wholesale on every notification.
///
/// Deletions (including the "from" side of a move) are applied against the
/// *original* list, from the highest index down, before any insertion
/// happens; insertions (including the "to" side of a move or update) are
/// then applied against the list under construction, from the lowest index
/// up. This two-phase order is what makes index bookkeeping correct even
/// though the events themselves may be emitted in a different order.
pub fn apply<E: Clone>(events: &[EditEvent<E>], old: &[E]) -> Vec<E> {
   let mut deletions: Vec<usize> = Vec::new();
   let mut insertions: Vec<(usize, E)> = Vec::new();
   for event in events {
      match event {
         EditEvent::Deletion { index, .. } => deletions.push(*index),
         EditEvent::Insertion { item, index } => insertions.push((*index, item.clone())),
         EditEvent::Move { item, from, to, .. } => {
            deletions.push(*from);
            insertions.push((*to, item.clone()));
         }
         EditEvent::Update { item, index, .. } => {
            deletions.push(*index);
            insertions.push((*index, item.clone()));
         }
      }
   }
   deletions.sort_unstable_by(|a, b| b.cmp(a));
   let mut working: Vec<E> = old.to_vec();
   for index in deletions {
      working.remove(index);
   }
   insertions.sort_by_key(|(index, _)| *index);
   for (index, item) in insertions {
      working.insert(index, item);
   }
   working
}
