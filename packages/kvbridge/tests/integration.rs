use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::task::JoinSet;

use kvbridge::{
    open, whichdb, with_database, Database, Error, KeyValueStore, OpenFlags, RunnerError,
    StoreError,
};

fn flags(s: &str) -> OpenFlags {
    s.parse().unwrap()
}

/// Store whose `close` is counted and can be made to fail.
struct CountingStore {
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

impl KeyValueStore for CountingStore {
    fn get(&mut self, _key: &[u8]) -> kvbridge_store::Result<Option<Bytes>> {
        Ok(None)
    }

    fn set(&mut self, _key: Bytes, _value: Bytes) -> kvbridge_store::Result<()> {
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> kvbridge_store::Result<()> {
        Err(StoreError::KeyNotFound {
            key: Bytes::copy_from_slice(key),
        })
    }

    fn keys(&mut self) -> kvbridge_store::Result<Vec<Bytes>> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> kvbridge_store::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(StoreError::Io(std::io::Error::other("flush failed")));
        }
        Ok(())
    }

    fn engine_name(&self) -> &'static str {
        "counting"
    }
}

fn counting(fail_close: bool) -> (Database<CountingStore>, Arc<AtomicUsize>) {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    let db = Database::new(move || {
        Ok(CountingStore {
            closes: counter,
            fail_close,
        })
    });
    (db, closes)
}

#[tokio::test]
async fn test_set_get_delete_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path().join("colors.kvb"), flags("c"));
    db.connect().await.unwrap();

    db.set("alpha", "green").await.unwrap();
    assert_eq!(db.get("alpha").await.unwrap(), Some(Bytes::from("green")));

    db.delete("alpha").await.unwrap();
    assert!(!db.exists("alpha").await.unwrap());

    let err = db.delete("alpha").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_lifecycle());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_thousand_concurrent_sets() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(open(dir.path().join("bulk.kvb"), flags("c")));
    db.connect().await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..1000 {
        let db = Arc::clone(&db);
        tasks.spawn(async move {
            db.set(format!("key-{i}"), format!("value-{i}")).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(db.keys().await.unwrap().len(), 1000);
    for i in [0, 1, 499, 998, 999] {
        let value = db.get(format!("key-{i}")).await.unwrap();
        assert_eq!(value, Some(Bytes::from(format!("value-{i}"))));
    }
    db.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_random_writes_from_many_threads() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(open(dir.path().join("random.kvb"), flags("cf")));
    db.connect().await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..200_u32 {
        let db = Arc::clone(&db);
        tasks.spawn(async move {
            let mut value = vec![0u8; 64];
            rand::thread_rng().fill(&mut value[..]);
            db.set(i.to_be_bytes(), value.clone()).await?;
            Ok::<_, Error>((i, value))
        });
    }

    let mut written = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        written.push(joined.unwrap().unwrap());
    }
    for (i, value) in written {
        assert_eq!(db.get(i.to_be_bytes()).await.unwrap(), Some(Bytes::from(value)));
    }
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_close_waits_for_queued_operations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queued.kvb");
    let db = Arc::new(open(&path, flags("c")));
    db.connect().await.unwrap();

    let slow = {
        let db = Arc::clone(&db);
        tokio::spawn(async move {
            db.call(|store| {
                std::thread::sleep(Duration::from_millis(50));
                store.set(Bytes::from("slow"), Bytes::from("done"))
            })
            .await
        })
    };
    let queued = {
        let db = Arc::clone(&db);
        tokio::spawn(async move { db.set("queued", "done").await })
    };
    // Both tasks enqueue before close does.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    db.close().await.unwrap();
    slow.await.unwrap().unwrap();
    queued.await.unwrap().unwrap();

    let reopened = open(&path, flags("r"));
    reopened.connect().await.unwrap();
    assert_eq!(reopened.keys().await.unwrap(), vec!["queued", "slow"]);
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let (db, closes) = counting(false);

    assert!(matches!(db.get("alpha").await, Err(Error::NotConnected)));

    db.connect().await.unwrap();
    let err = db.connect().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyConnected));
    assert!(err.is_lifecycle());

    db.close().await.unwrap();
    db.close().await.unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    assert!(matches!(db.set("alpha", "blue").await, Err(Error::NotConnected)));
    assert!(matches!(db.connect().await, Err(Error::Closed)));
}

#[tokio::test]
async fn test_failed_close_still_closes() {
    let (db, closes) = counting(true);
    db.connect().await.unwrap();

    let err = db.close().await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Io(_))));
    assert!(db.is_closed());

    // Not retried.
    db.close().await.unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(matches!(db.exists("alpha").await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_connector_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path().join("missing.kvb"), flags("r"));

    let err = db.connect().await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Open { .. })));
    assert!(!err.is_lifecycle());
    assert!(db.is_closed());
    assert!(matches!(db.connect().await, Err(Error::Closed)));
}

#[tokio::test]
async fn test_panicking_call_does_not_poison_database() {
    let db = Database::new(|| Ok(kvbridge::MemoryStore::new()));
    db.connect().await.unwrap();
    db.set("alpha", "green").await.unwrap();

    let err = db
        .call(|_| -> kvbridge_store::Result<()> { panic!("engine bug") })
        .await
        .unwrap_err();
    match err {
        Error::Runner(RunnerError::Panicked { message }) => assert_eq!(message, "engine bug"),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(db.get("alpha").await.unwrap(), Some(Bytes::from("green")));
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_and_detect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.kvb");

    let db = open(&path, flags("c"));
    with_database(&db, |db| async move {
        db.set("alpha", "green").await?;
        db.set("bravo", "blue").await?;
        db.setdefault("alpha", "red").await
    })
    .await
    .unwrap();

    assert_eq!(whichdb(&path).await.as_deref(), Some("kvbridge.log"));

    let db = open(&path, flags("r"));
    db.connect().await.unwrap();
    assert_eq!(db.engine_name().await.unwrap(), "kvbridge.log");
    assert_eq!(db.get_or("alpha", "none").await.unwrap(), "green");
    assert_eq!(db.get_or("charlie", "none").await.unwrap(), "none");

    let err = db.set("charlie", "red").await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::ReadOnly)));
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_reorganize_and_traverse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reorg.kvb");
    let db = open(&path, flags("c"));
    db.connect().await.unwrap();

    for round in 0..20 {
        for key in ["alpha", "bravo", "charlie"] {
            db.set(key, format!("{key}-{round}")).await.unwrap();
        }
    }
    db.delete("bravo").await.unwrap();
    let before = std::fs::metadata(&path).unwrap().len();

    db.reorganize().await.unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() < before);

    let keys = db.key_cursor().collect().await.unwrap();
    assert_eq!(keys, vec!["alpha", "charlie"]);
    assert_eq!(db.first_key().await.unwrap(), Some(Bytes::from("alpha")));
    assert_eq!(db.next_key("charlie").await.unwrap(), None);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_fast_mode_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fast.kvb");
    let db = open(&path, flags("cf"));
    db.connect().await.unwrap();

    db.set("alpha", "green").await.unwrap();
    let buffered = std::fs::metadata(&path).unwrap().len();
    db.sync().await.unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > buffered);
    db.close().await.unwrap();
}
