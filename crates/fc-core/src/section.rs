//! A thin, read-only index over a controller's current result set.

use std::sync::Arc;

use crate::error::programmer_error;
use crate::item::{Identity, Item, Projector};

/// A point-in-time, single-section view of a controller's fetched rows.
///
/// Controllers in this crate never group rows into multiple sections (the
/// underlying query is always a flat `SELECT`), so `SectionView` is simply
/// an index-addressable wrapper — kept as its own type so a future grouped
/// mode could add sections without changing the read API callers already use.
#[derive(Clone)]
pub struct SectionView<E> {
   items: Arc<Vec<Item<E>>>,
   projector: Arc<dyn Projector<E>>,
}

impl<E> SectionView<E> {
   pub(crate) fn new(items: Arc<Vec<Item<E>>>, projector: Arc<dyn Projector<E>>) -> Self {
      Self { items, projector }
   }

   pub fn len(&self) -> usize {
      self.items.len()
   }

   pub fn is_empty(&self) -> bool {
      self.items.is_empty()
   }

   /// Projects and returns the element at `index`.
   ///
   /// Out-of-range access is a caller programming error, not a runtime
   /// condition — it panics rather than returning `None`, the same as
   /// indexing a slice out of bounds would. A projection failure (the row
   /// exists but couldn't be mapped) is a runtime condition and is returned
   /// as `Err` instead.
   pub fn get(&self, index: usize) -> Result<&E, crate::Error> {
      match self.items.get(index) {
         Some(item) => item.element(&*self.projector),
         None => programmer_error(format!(
            "index {index} out of range for a section of length {}",
            self.items.len()
         )),
      }
   }

   /// The index of the first row whose snapshot the given identity predicate
   /// considers the same as `needle`'s, or `None` if absent.
   pub fn index_of(&self, needle: &crate::RowSnapshot, identity: &dyn Identity) -> Option<usize> {
      self
         .items
         .iter()
         .position(|item| identity.same(item.snapshot(), needle))
   }

   pub fn iter(&self) -> impl Iterator<Item = &Item<E>> {
      self.items.iter()
   }
}
