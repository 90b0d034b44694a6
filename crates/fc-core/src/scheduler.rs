//! Bridges the writer context's commit notifications to the caller's
//! notification context, preserving commit order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fc_observer::CommitSink;
use fc_sqlite_conn::{PendingFetchSink, SqliteDatabase};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A serial execution context chosen by the caller: all callbacks a
/// `FetchedController` delivers run here, one at a time, in the order they
/// are scheduled, so a consumer never has to guard against two deliveries
/// interleaving.
pub trait NotificationContext: Send + Sync {
   fn schedule(&self, task: BoxFuture<()>);
}

/// The bundled [`NotificationContext`]: a single background task draining an
/// unbounded queue of boxed futures, awaiting each to completion before
/// starting the next. Good enough for any caller that doesn't already have
/// its own serial executor (a UI event loop, an actor mailbox, ...) to hand
/// in instead.
pub struct TokioSerialQueue {
   sender: mpsc::UnboundedSender<BoxFuture<()>>,
}

impl TokioSerialQueue {
   pub fn new() -> Self {
      let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture<()>>();
      tokio::spawn(async move {
         while let Some(task) = receiver.recv().await {
            task.await;
         }
      });
      Self { sender }
   }
}

impl Default for TokioSerialQueue {
   fn default() -> Self {
      Self::new()
   }
}

impl NotificationContext for TokioSerialQueue {
   fn schedule(&self, task: BoxFuture<()>) {
      if self.sender.send(task).is_err() {
         warn!("notification context's serial queue task has exited; dropping scheduled callback");
      }
   }
}

/// Runs a fetch for every dirty commit and delivers results to the
/// notification context in strict commit order, even though individual
/// fetches race each other on the writer context's thread pool.
///
/// ## Isolation
///
/// A dirty commit, detected via [`CommitSink::on_dirty_commit`] (called
/// synchronously from the writer's SQLite commit hook), only sets a pending
/// flag — it does no I/O, since hook callbacks can't `.await`. The actual
/// snapshot gets pinned later, from [`PendingFetchSink::pin_snapshot`],
/// which [`fc_sqlite_conn::SqliteDatabase::write`] calls while the writer
/// guard from the very commit that dirtied us is *still held*. Because the
/// write pool allows only one connection, nothing else can commit in that
/// window, so the read transaction opened here always sees exactly the
/// state as of that commit — never a later one that raced ahead of a
/// fetch that had only been queued, not yet started.
///
/// ## Ordering
///
/// [`FetchScheduler::pin_snapshot`] immediately pushes a fresh
/// [`oneshot::Receiver`] onto a FIFO queue, *before* the fetch itself starts
/// running. A single consumer task drains that queue strictly in push order,
/// awaiting each receiver to completion before moving to the next — so even
/// if fetch #2 finishes before fetch #1 (e.g. #1 hit a slower disk page),
/// the consumer still delivers #1's result first. The fetch work itself runs
/// on an independently spawned task once its snapshot is pinned, so a slow
/// fetch never blocks the writer context from accepting its next commit.
pub struct FetchScheduler<T> {
   order_tx: mpsc::UnboundedSender<oneshot::Receiver<T>>,
   fetch: Arc<dyn Fn(Transaction<'static, Sqlite>) -> BoxFuture<T> + Send + Sync>,
   pending: AtomicBool,
}

impl<T: Send + 'static> FetchScheduler<T> {
   pub fn new(
      fetch: impl Fn(Transaction<'static, Sqlite>) -> BoxFuture<T> + Send + Sync + 'static,
      notify: Arc<dyn NotificationContext>,
      deliver: impl Fn(T) -> BoxFuture<()> + Send + Sync + 'static,
   ) -> Self {
      let (order_tx, mut order_rx) = mpsc::unbounded_channel::<oneshot::Receiver<T>>();
      let deliver = Arc::new(deliver);
      tokio::spawn(async move {
         while let Some(receiver) = order_rx.recv().await {
            if let Ok(result) = receiver.await {
               let deliver = deliver.clone();
               notify.schedule(Box::pin(async move { deliver(result).await }));
            }
         }
      });

      Self {
         order_tx,
         fetch: Arc::new(fetch),
         pending: AtomicBool::new(false),
      }
   }
}

impl<T: Send + 'static> CommitSink for FetchScheduler<T> {
   /// Called synchronously from the writer's commit hook. Does no I/O —
   /// just flags that a dirty transaction committed, so the next
   /// `pin_snapshot` call (made by `SqliteDatabase::write`, still holding
   /// the writer guard) knows there's a fetch to pin.
   fn on_dirty_commit(&self) {
      self.pending.store(true, Ordering::SeqCst);
   }
}

impl<T: Send + 'static> PendingFetchSink for FetchScheduler<T> {
   fn pin_snapshot<'a>(
      &'a self,
      db: &'a SqliteDatabase,
   ) -> fc_sqlite_conn::BoxFuture<'a, fc_sqlite_conn::Result<()>> {
      Box::pin(async move {
         if !self.pending.swap(false, Ordering::SeqCst) {
            return Ok(());
         }

         let tx = db.read_pool()?.begin().await?;

         let (tx_result, rx_result) = oneshot::channel();
         if self.order_tx.send(rx_result).is_err() {
            warn!("fetch scheduler's dispatch task has exited; dropping pinned snapshot");
            return Ok(());
         }

         let fetch = self.fetch.clone();
         tokio::spawn(async move {
            let result = fetch(tx).await;
            let _ = tx_result.send(result);
         });
         Ok(())
      })
   }
}
