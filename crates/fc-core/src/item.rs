//! A fetched row paired with its lazily-projected element.

use std::sync::OnceLock;

use crate::error::Error;
use crate::row::RowSnapshot;

/// Projects a [`RowSnapshot`] into the caller's element type.
///
/// Implemented as a plain closure bound by most callers; split out as a trait
/// so a `FetchedController` can hold one as a trait object.
pub trait Projector<E>: Send + Sync {
   fn project(&self, row: &RowSnapshot) -> Result<E, Error>;
}

impl<E, F> Projector<E> for F
where
   F: Fn(&RowSnapshot) -> Result<E, Error> + Send + Sync,
{
   fn project(&self, row: &RowSnapshot) -> Result<E, Error> {
      (self)(row)
   }
}

/// Identity predicate used by the differ's merge pass to recognize that a
/// deletion and an insertion represent the same logical row, moved or
/// updated rather than truly removed-and-added. Most callers implement this
/// as "same primary key"; the default bundled impl below does exactly that
/// for a named column.
pub trait Identity: Send + Sync {
   fn same(&self, a: &RowSnapshot, b: &RowSnapshot) -> bool;
}

/// Compares rows by a single named column — the common case of a primary
/// key or other stable row identifier.
pub struct ColumnIdentity {
   column: String,
}

impl ColumnIdentity {
   pub fn new(column: impl Into<String>) -> Self {
      Self {
         column: column.into(),
      }
   }
}

impl Identity for ColumnIdentity {
   fn same(&self, a: &RowSnapshot, b: &RowSnapshot) -> bool {
      match (a.get(&self.column), b.get(&self.column)) {
         (Some(x), Some(y)) => x == y,
         _ => false,
      }
   }
}

/// A single fetched row, holding both its raw [`RowSnapshot`] (used for
/// comparison and identity) and a memoized, lazily-computed projection to the
/// caller's element type `E`. Two `Item`s compare equal iff their snapshots
/// do — the cached element, if any, never participates in equality.
#[derive(Debug)]
pub struct Item<E> {
   snapshot: RowSnapshot,
   element: OnceLock<E>,
}

impl<E> Item<E> {
   pub fn new(snapshot: RowSnapshot) -> Self {
      Self {
         snapshot,
         element: OnceLock::new(),
      }
   }

   pub fn snapshot(&self) -> &RowSnapshot {
      &self.snapshot
   }

   /// Returns the projected element, computing and caching it on first call.
   pub fn element(&self, projector: &dyn Projector<E>) -> Result<&E, Error> {
      if let Some(existing) = self.element.get() {
         return Ok(existing);
      }
      let computed = projector.project(&self.snapshot)?;
      // `OnceLock::set` can race under concurrent callers; either outcome
      // (ours won, or another thread's did) yields an equivalent element.
      let _ = self.element.set(computed);
      Ok(self.element.get().expect("just set"))
   }
}

impl<E: Clone> Clone for Item<E> {
   fn clone(&self) -> Self {
      Self {
         snapshot: self.snapshot.clone(),
         element: self
            .element
            .get()
            .cloned()
            .map(OnceLock::from)
            .unwrap_or_default(),
      }
   }
}

impl<E> PartialEq for Item<E> {
   fn eq(&self, other: &Self) -> bool {
      self.snapshot == other.snapshot
   }
}

impl<E> Eq for Item<E> {}
