//! The public facade: a reactive, fetched result set over a tracked query.

use std::sync::{Arc, Mutex};

use fc_observer::{CommitSink, TransactionObserver};
use fc_sqlite_conn::{PendingFetchSink, SqliteDatabase};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error};

use crate::differ::{self, EditEvent};
use crate::error::{Error, programmer_error};
use crate::item::{Identity, Item, Projector};
use crate::request::Request;
use crate::row::RowSnapshot;
use crate::scheduler::{BoxFuture, FetchScheduler, NotificationContext};
use crate::section::SectionView;

type WillChangeCallback<A> = Arc<dyn Fn(&A) + Send + Sync>;
type OnChangeCallback<E> = Arc<dyn Fn(&EditEvent<Item<E>>) + Send + Sync>;
type DidChangeCallback<A> = Arc<dyn Fn(&A) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(Error) + Send + Sync>;
type FetchAlongside<A> =
   Arc<dyn for<'c> Fn(&'c mut Transaction<'static, Sqlite>) -> TxFuture<'c, Result<A, Error>> + Send + Sync>;
type FetchOutcome<E, A> = Result<(Vec<Item<E>>, A), Error>;

/// A boxed future that borrows its caller's transaction, used by
/// [`FetchedController::fetch_alongside`].
pub type TxFuture<'c, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'c>>;

/// Where a controller sits in its lifecycle. See the module-level docs in
/// [`crate`] for the full state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
   /// Constructed, never fetched.
   Idle,
   /// At least one fetch has completed; no change tracking registered.
   FetchedNoTracking,
   /// Change tracking is active: hooks registered, fetches triggered on commit.
   Observing,
   /// The underlying database was closed; every operation now fails.
   Inert,
}

struct Shared<E, A> {
   database: Arc<SqliteDatabase>,
   request: Mutex<Request>,
   items: Mutex<Arc<Vec<Item<E>>>>,
   projector: Arc<dyn Projector<E>>,
   identity: Arc<dyn Identity>,
   will_change: Mutex<Option<WillChangeCallback<A>>>,
   on_change: Mutex<Option<OnChangeCallback<E>>>,
   did_change: Mutex<Option<DidChangeCallback<A>>>,
   on_error: Mutex<Option<ErrorCallback>>,
   fetch_alongside: Mutex<Option<FetchAlongside<A>>>,
}

/// State that only exists while [`Phase::Observing`] is active.
struct Observation<E, A> {
   observer: TransactionObserver,
   scheduler: Arc<FetchScheduler<FetchOutcome<E, A>>>,
}

/// A reactive view over a single SQL query's result set.
///
/// Call [`FetchedController::fetch`] at least once to populate it, then
/// [`FetchedController::track_changes`] to start receiving an [`EditEvent`]
/// stream on every committed transaction that could plausibly have changed
/// the result (see [`fc_observer::SelectionInfo`] for what "plausibly" means
/// here — it never misses a real change, and may occasionally wake up for
/// one that turned out not to matter).
///
/// `A` is the type of value an optional [`FetchedController::fetch_alongside`]
/// computation produces, atomically with each re-fetch; callers that don't
/// need one can ignore the parameter (it defaults to `()`).
pub struct FetchedController<E, A = ()> {
   shared: Arc<Shared<E, A>>,
   notify: Arc<dyn NotificationContext>,
   phase: Mutex<Phase>,
   observation: Mutex<Option<Observation<E, A>>>,
}

impl<E, A> FetchedController<E, A>
where
   E: Clone + Send + Sync + 'static,
   A: Default + Send + Sync + 'static,
{
   pub fn new(
      database: Arc<SqliteDatabase>,
      request: Request,
      projector: Arc<dyn Projector<E>>,
      identity: Arc<dyn Identity>,
      notify: Arc<dyn NotificationContext>,
   ) -> Self {
      Self {
         shared: Arc::new(Shared {
            database,
            request: Mutex::new(request),
            items: Mutex::new(Arc::new(Vec::new())),
            projector,
            identity,
            will_change: Mutex::new(None),
            on_change: Mutex::new(None),
            did_change: Mutex::new(None),
            on_error: Mutex::new(None),
            fetch_alongside: Mutex::new(None),
         }),
         notify,
         phase: Mutex::new(Phase::Idle),
         observation: Mutex::new(None),
      }
   }

   /// Runs (or re-runs) the tracked request immediately, updating the result
   /// set synchronously with respect to the caller. The very first fetch
   /// moves the controller out of [`Phase::Idle`]; every fetch (including
   /// the first) diffs against the previous result and runs the
   /// will-change/on-change/did-change callbacks (if registered) around that
   /// diff — for the first fetch the previous result is always empty, so
   /// on-change only fires then if the query itself returns rows.
   pub async fn fetch(&self) -> Result<(), Error> {
      self.ensure_not_inert()?;
      let tx = self.shared.database.read_pool()?.begin().await?;
      let outcome = run_fetch(&self.shared, tx).await?;
      deliver(&self.shared, Ok(outcome));
      let mut phase = self.phase.lock().unwrap();
      if *phase == Phase::Idle {
         *phase = Phase::FetchedNoTracking;
      }
      Ok(())
   }

   /// Replaces the tracked request and immediately re-fetches.
   ///
   /// If change tracking is active, the old observer is invalidated and
   /// unregistered (so any commit hook callback already in flight for the
   /// stale request becomes a no-op; see [`fc_observer::TransactionObserver::invalidate`])
   /// before a new one is registered against the new request's selection.
   /// This ordering guarantees a commit racing the request swap either
   /// triggers under the old selection or not at all — never under a
   /// selection the request has already moved past.
   pub async fn set_request(&self, request: Request) -> Result<(), Error> {
      self.ensure_not_inert()?;
      *self.shared.request.lock().unwrap() = request;

      let mut observation = self.observation.lock().unwrap().take();
      if let Some(obs) = observation.as_mut() {
         obs.observer.invalidate();
         obs.observer.unregister();
         let selection = self.shared.request.lock().unwrap().selection().clone();
         let sink: Arc<dyn CommitSink> = obs.scheduler.clone();
         obs.observer = register_observer(&self.shared, selection, sink).await?;
      }
      *self.observation.lock().unwrap() = observation;

      self.fetch().await
   }

   /// Registers the callback invoked once per edit-script entry, after the
   /// result set has been swapped to the post-update state. Requires at
   /// least one prior [`FetchedController::fetch`] call — there is nothing
   /// to diff future fetches against otherwise. Starts change tracking
   /// (registering SQLite hooks on the writer connection and a pending-fetch
   /// sink on the database) the first time any of `track_changes`,
   /// `track_will_change` or `track_did_change` is called; subsequent calls
   /// just replace the callback.
   pub async fn track_changes(
      &self,
      callback: impl Fn(&EditEvent<Item<E>>) + Send + Sync + 'static,
   ) -> Result<(), Error> {
      self.ensure_not_inert()?;
      {
         let phase = *self.phase.lock().unwrap();
         if phase == Phase::Idle {
            programmer_error("track_changes called before any fetch populated a baseline result");
         }
      }
      *self.shared.on_change.lock().unwrap() = Some(Arc::new(callback));
      self.ensure_observing().await
   }

   /// Registers the callback invoked once per re-fetch, before the result
   /// set is swapped — index access against [`FetchedController::section`]
   /// from inside this callback still observes the pre-update result set.
   /// Passed the value [`FetchedController::fetch_alongside`] computed for
   /// this fetch, or `A::default()` if no fetch-alongside is registered.
   pub fn track_will_change(&self, callback: impl Fn(&A) + Send + Sync + 'static) {
      *self.shared.will_change.lock().unwrap() = Some(Arc::new(callback));
   }

   /// Registers the callback invoked once per re-fetch, after the result set
   /// has been swapped and every on-change call for this fetch has run.
   /// Index access from inside this callback observes the post-update
   /// result set.
   pub fn track_did_change(&self, callback: impl Fn(&A) + Send + Sync + 'static) {
      *self.shared.did_change.lock().unwrap() = Some(Arc::new(callback));
   }

   /// Registers a computation run atomically with every re-fetch — in the
   /// same read transaction as the tracked query, so it observes exactly the
   /// same snapshot — whose result is handed to the will-change and
   /// did-change callbacks. Replaces any previously registered computation.
   pub fn fetch_alongside(
      &self,
      f: impl for<'c> Fn(&'c mut Transaction<'static, Sqlite>) -> TxFuture<'c, Result<A, Error>>
      + Send
      + Sync
      + 'static,
   ) {
      *self.shared.fetch_alongside.lock().unwrap() = Some(Arc::new(f));
   }

   /// Registers the callback invoked when a background (commit-triggered)
   /// fetch fails. Fetches driven by an explicit [`FetchedController::fetch`]
   /// call instead surface their error directly through its `Result`.
   pub fn track_errors(&self, callback: impl Fn(Error) + Send + Sync + 'static) {
      *self.shared.on_error.lock().unwrap() = Some(Arc::new(callback));
   }

   /// A snapshot of the current result set. Cheap: shares the underlying
   /// `Vec` with the controller until the next fetch replaces it.
   pub fn section(&self) -> SectionView<E> {
      let items = self.shared.items.lock().unwrap().clone();
      SectionView::new(items, self.shared.projector.clone())
   }

   pub fn index_of(&self, needle: &RowSnapshot) -> Option<usize> {
      self.section().index_of(needle, &*self.shared.identity)
   }

   /// Stops change tracking and marks the controller inert; every further
   /// call returns [`Error::Inert`]. Idempotent.
   pub fn invalidate(&self) {
      *self.phase.lock().unwrap() = Phase::Inert;
      if let Some(mut obs) = self.observation.lock().unwrap().take() {
         obs.observer.invalidate();
         obs.observer.unregister();
      }
   }

   async fn ensure_observing(&self) -> Result<(), Error> {
      if self.observation.lock().unwrap().is_some() {
         return Ok(());
      }

      let fetch_shared = self.shared.clone();
      let deliver_shared = self.shared.clone();
      let scheduler = Arc::new(FetchScheduler::new(
         move |tx: Transaction<'static, Sqlite>| -> BoxFuture<FetchOutcome<E, A>> {
            let shared = fetch_shared.clone();
            Box::pin(async move { run_fetch(&shared, tx).await })
         },
         self.notify.clone(),
         move |outcome: FetchOutcome<E, A>| -> BoxFuture<()> {
            let shared = deliver_shared.clone();
            Box::pin(async move { deliver(&shared, outcome) })
         },
      ));

      let selection = self.shared.request.lock().unwrap().selection().clone();
      let sink: Arc<dyn CommitSink> = scheduler.clone();
      let observer = register_observer(&self.shared, selection, sink).await?;

      let pending_sink: Arc<dyn PendingFetchSink> = scheduler.clone();
      self
         .shared
         .database
         .register_pending_fetch_sink(Arc::downgrade(&pending_sink));

      *self.observation.lock().unwrap() = Some(Observation { observer, scheduler });
      *self.phase.lock().unwrap() = Phase::Observing;
      Ok(())
   }

   fn ensure_not_inert(&self) -> Result<(), Error> {
      if *self.phase.lock().unwrap() == Phase::Inert {
         return Err(Error::Inert);
      }
      Ok(())
   }
}

/// Runs the tracked query and the optional fetch-alongside computation
/// against the same already-open transaction, then releases it (a plain
/// read, so there's nothing to commit). Used both by explicit `fetch()`
/// calls (which open their own transaction against the read pool) and by
/// commit-triggered fetches (which receive one already pinned by
/// [`PendingFetchSink::pin_snapshot`]).
async fn run_fetch<E, A>(
   shared: &Shared<E, A>,
   mut tx: Transaction<'static, Sqlite>,
) -> Result<(Vec<Item<E>>, A), Error>
where
   A: Default,
{
   let (sql, args) = {
      let request = shared.request.lock().unwrap();
      (request.sql().to_string(), request.arguments())
   };
   let query = sqlx::query_with(&sql, args);
   let rows = match query.fetch_all(&mut *tx).await {
      Ok(rows) => rows,
      Err(e) => {
         let _ = tx.rollback().await;
         return Err(Error::Execution(e.to_string()));
      }
   };

   let items: Result<Vec<Item<E>>, Error> = rows
      .iter()
      .map(|row| RowSnapshot::from_row(row).map(Item::new))
      .collect();
   let items = match items {
      Ok(items) => items,
      Err(e) => {
         let _ = tx.rollback().await;
         return Err(e);
      }
   };

   let alongside = shared.fetch_alongside.lock().unwrap().clone();
   let alongside = match alongside {
      Some(f) => match f(&mut tx).await {
         Ok(value) => value,
         Err(e) => {
            let _ = tx.rollback().await;
            return Err(e);
         }
      },
      None => A::default(),
   };

   let _ = tx.rollback().await;
   Ok((items, alongside))
}

fn deliver<E: Clone, A>(shared: &Shared<E, A>, outcome: Result<(Vec<Item<E>>, A), Error>) {
   match outcome {
      Ok((new_items, alongside)) => {
         if let Some(will_change) = shared.will_change.lock().unwrap().clone() {
            will_change(&alongside);
         }

         let new_items = Arc::new(new_items);
         let previous = {
            let mut guard = shared.items.lock().unwrap();
            std::mem::replace(&mut *guard, new_items.clone())
         };
         let events = differ::diff(previous.as_slice(), new_items.as_slice(), &*shared.identity);
         if events.is_empty() {
            debug!("fetch produced no observable change");
         } else if let Some(on_change) = shared.on_change.lock().unwrap().clone() {
            for event in &events {
               on_change(event);
            }
         }

         if let Some(did_change) = shared.did_change.lock().unwrap().clone() {
            did_change(&alongside);
         }
      }
      Err(err) => {
         error!(error = %err, "background fetch failed");
         if let Some(callback) = shared.on_error.lock().unwrap().clone() {
            callback(err);
         }
      }
   }
}

async fn register_observer<E, A>(
   shared: &Shared<E, A>,
   selection: fc_observer::SelectionInfo,
   sink: Arc<dyn CommitSink>,
) -> Result<TransactionObserver, Error> {
   let mut guard = shared.database.acquire_writer().await?;
   let tables: Vec<&str> = selection.referenced_tables().collect();
   let columns = fc_observer::fetch_table_columns(&mut guard, tables).await?;
   let mut observer = TransactionObserver::new(selection, columns, sink);
   observer.register(&mut guard).await?;
   Ok(observer)
}
