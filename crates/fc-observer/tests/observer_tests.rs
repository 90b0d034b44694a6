use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fc_observer::{CommitSink, SelectionInfo, TransactionObserver, fetch_table_columns};
use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;

struct CountingSink {
   count: Arc<AtomicUsize>,
}

impl CommitSink for CountingSink {
   fn on_dirty_commit(&self) {
      self.count.fetch_add(1, Ordering::SeqCst);
   }
}

async fn setup() -> SqliteConnection {
   let mut conn = SqliteConnection::connect(":memory:").await.unwrap();
   sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
      .execute(&mut conn)
      .await
      .unwrap();
   sqlx::query("CREATE TABLE other (id INTEGER PRIMARY KEY)")
      .execute(&mut conn)
      .await
      .unwrap();
   conn
}

#[tokio::test]
async fn commit_on_observed_table_triggers_sink() {
   let mut conn = setup().await;
   let count = Arc::new(AtomicUsize::new(0));
   let sink = Arc::new(CountingSink {
      count: count.clone(),
   });

   let selection = SelectionInfo::parse_sql("SELECT name, id FROM t");
   let columns = fetch_table_columns(&mut conn, ["t"]).await.unwrap();
   let mut observer = TransactionObserver::new(selection, columns, sink);
   observer.register(&mut conn).await.unwrap();

   sqlx::query("INSERT INTO t (id, name) VALUES (1, 'a')")
      .execute(&mut conn)
      .await
      .unwrap();

   assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commit_on_unobserved_table_does_not_trigger_sink() {
   let mut conn = setup().await;
   let count = Arc::new(AtomicUsize::new(0));
   let sink = Arc::new(CountingSink {
      count: count.clone(),
   });

   let selection = SelectionInfo::parse_sql("SELECT name, id FROM t");
   let columns = fetch_table_columns(&mut conn, ["t"]).await.unwrap();
   let mut observer = TransactionObserver::new(selection, columns, sink);
   observer.register(&mut conn).await.unwrap();

   sqlx::query("INSERT INTO other (id) VALUES (1)")
      .execute(&mut conn)
      .await
      .unwrap();

   assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rollback_clears_dirty_flag() {
   let mut conn = setup().await;
   let count = Arc::new(AtomicUsize::new(0));
   let sink = Arc::new(CountingSink {
      count: count.clone(),
   });

   let selection = SelectionInfo::parse_sql("SELECT name, id FROM t");
   let columns = fetch_table_columns(&mut conn, ["t"]).await.unwrap();
   let mut observer = TransactionObserver::new(selection, columns, sink);
   observer.register(&mut conn).await.unwrap();

   let mut tx = conn.begin().await.unwrap();
   sqlx::query("INSERT INTO t (id, name) VALUES (1, 'a')")
      .execute(&mut *tx)
      .await
      .unwrap();
   tx.rollback().await.unwrap();

   assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalidate_suppresses_subsequent_commits() {
   let mut conn = setup().await;
   let count = Arc::new(AtomicUsize::new(0));
   let sink = Arc::new(CountingSink {
      count: count.clone(),
   });

   let selection = SelectionInfo::parse_sql("SELECT name, id FROM t");
   let columns = fetch_table_columns(&mut conn, ["t"]).await.unwrap();
   let mut observer = TransactionObserver::new(selection, columns, sink);
   observer.register(&mut conn).await.unwrap();
   observer.invalidate();

   sqlx::query("INSERT INTO t (id, name) VALUES (1, 'a')")
      .execute(&mut conn)
      .await
      .unwrap();

   assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn update_touching_unselected_column_does_not_trigger() {
   let mut conn = SqliteConnection::connect(":memory:").await.unwrap();
   sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, hidden TEXT)")
      .execute(&mut conn)
      .await
      .unwrap();
   sqlx::query("INSERT INTO t (id, name, hidden) VALUES (1, 'a', 'x')")
      .execute(&mut conn)
      .await
      .unwrap();

   let count = Arc::new(AtomicUsize::new(0));
   let sink = Arc::new(CountingSink {
      count: count.clone(),
   });

   // Selection only reads `name`, not `hidden`.
   let mut map = HashMap::new();
   map.insert(
      "t".to_string(),
      fc_observer::ColumnSet::Some(["name".to_string()].into_iter().collect()),
   );
   let selection = SelectionInfo::new(map);
   let columns = fetch_table_columns(&mut conn, ["t"]).await.unwrap();
   let mut observer = TransactionObserver::new(selection, columns, sink);
   observer.register(&mut conn).await.unwrap();

   sqlx::query("UPDATE t SET hidden = 'y' WHERE id = 1")
      .execute(&mut conn)
      .await
      .unwrap();
   assert_eq!(count.load(Ordering::SeqCst), 0);

   sqlx::query("UPDATE t SET name = 'b' WHERE id = 1")
      .execute(&mut conn)
      .await
      .unwrap();
   assert_eq!(count.load(Ordering::SeqCst), 1);
}
