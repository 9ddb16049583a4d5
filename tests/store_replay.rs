//! Store replay behavior against the in-memory engine.

use std::sync::Arc;

use quizstore::application::core::{
    POOL_EVENT_TABLE, POOL_TABLE, SETTING_EVENT_TABLE, SETTING_TABLE,
};
use quizstore::application::stores::{PoolStore, SettingStore};
use quizstore::cache::{
    CacheConfig, CacheStore, Database, EventKind, EventTable, InitStats, ObjectEvent, Store,
    StoreError, TxMode, recovery_begin_id, with_account_id,
};
use quizstore::domain::entities::{Pool, PoolEvent, Setting, SettingEvent};
use quizstore::infra::db::MemoryDatabase;

fn pools(db: &MemoryDatabase, config: CacheConfig) -> PoolStore<MemoryDatabase> {
    CacheStore::new(db.clone(), POOL_TABLE, POOL_EVENT_TABLE, config)
}

fn settings(db: &MemoryDatabase) -> SettingStore<MemoryDatabase> {
    CacheStore::new(
        db.clone(),
        SETTING_TABLE,
        SETTING_EVENT_TABLE,
        CacheConfig::default(),
    )
}

fn setting(key: &str, value: &str) -> Setting {
    Setting {
        id: 0,
        key: key.to_string(),
        value: value.to_string(),
    }
}

async fn load_pool_events(db: &MemoryDatabase) -> Vec<PoolEvent> {
    let events = db.event_table::<PoolEvent>(POOL_EVENT_TABLE);
    let mut tx = db.begin(TxMode::ReadOnly).await.expect("begin");
    let loaded = events.load_events(&mut tx, 1, 1_000).await.expect("load");
    db.commit(tx).await.expect("commit");
    loaded
}

#[tokio::test]
async fn ids_are_never_reused_after_delete() {
    let db = MemoryDatabase::new();
    let store = pools(&db, CacheConfig::default());
    store.init().await.expect("init");

    let first = store.create(Pool::default()).await.expect("create");
    assert_eq!(first.id, 1);
    assert_eq!(store.sync().await.expect("sync"), 1);
    assert_eq!(store.get(1), Some(first));

    store.delete(1).await.expect("delete");
    assert_eq!(store.sync().await.expect("sync"), 1);
    assert_eq!(store.get(1), None);

    let second = store.create(Pool::default()).await.expect("create");
    assert_eq!(second.id, 2);
    store.sync().await.expect("sync");
    assert_eq!(store.all(), vec![second]);

    let kinds: Vec<EventKind> = load_pool_events(&db)
        .await
        .iter()
        .map(ObjectEvent::event_kind)
        .collect();
    assert_eq!(
        kinds,
        vec![EventKind::Create, EventKind::Delete, EventKind::Create]
    );
}

#[tokio::test]
async fn init_replays_only_the_recovery_window() {
    let db = MemoryDatabase::new();
    let writer = pools(&db, CacheConfig::default());
    for _ in 0..60 {
        writer.create(Pool::default()).await.expect("create");
    }
    assert_eq!(recovery_begin_id(Some(60), 10), 50);

    let config = CacheConfig {
        recovery_window: 10,
        sync_batch_limit: 4,
    };
    let reader = pools(&db, config);
    reader.init().await.expect("init");

    assert_eq!(reader.len(), 60);
    assert_eq!(reader.begin_id().await, Some(61));
    assert_eq!(reader.sync().await.expect("sync"), 0);
}

#[tokio::test]
async fn recovery_cursor_starts_window_behind_tail() {
    const WINDOW: i64 = 20;
    let db = MemoryDatabase::new();
    let writer = pools(&db, CacheConfig::default());
    for _ in 0..WINDOW + 50 {
        writer.create(Pool::default()).await.expect("create");
    }

    let reader = pools(
        &db,
        CacheConfig {
            recovery_window: WINDOW,
            sync_batch_limit: 8,
        },
    );
    reader.init().await.expect("init");

    assert_eq!(
        reader.last_init(),
        Some(InitStats {
            recovery_begin_id: 50,
            skipped_events: 21,
            objects: 70,
        })
    );
    assert_eq!(reader.begin_id().await, Some(71));
}

#[tokio::test]
async fn late_and_early_readers_converge() {
    let db = MemoryDatabase::new();
    let early = settings(&db);
    early.init().await.expect("init");

    let theme = early.create(setting("theme", "light")).await.expect("create");
    early.create(setting("locale", "en")).await.expect("create");
    early.sync().await.expect("sync");

    early
        .update(Setting {
            value: "dark".to_string(),
            ..theme.clone()
        })
        .await
        .expect("update");
    let motd = early.create(setting("motd", "hi")).await.expect("create");
    early.delete(motd.id).await.expect("delete");
    early.sync().await.expect("sync");

    let late = settings(&db);
    late.init().await.expect("init");

    assert_eq!(early.all(), late.all());
    assert_eq!(late.value("theme").as_deref(), Some("dark"));
    assert_eq!(late.get_by_key("motd"), None);
    assert_eq!(early.begin_id().await, late.begin_id().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_get_distinct_ids() {
    let db = MemoryDatabase::new();
    let store = Arc::new(pools(&db, CacheConfig::default()));
    store.init().await.expect("init");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..5 {
                    ids.push(store.create(Pool::default()).await.expect("create").id);
                }
                ids
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.extend(task.await.expect("writer task"));
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 40);

    assert_eq!(store.sync().await.expect("sync"), 40);
    assert_eq!(store.len(), 40);

    let event_ids: Vec<i64> = load_pool_events(&db)
        .await
        .iter()
        .map(ObjectEvent::event_id)
        .collect();
    assert_eq!(event_ids, (1..=40).collect::<Vec<_>>());
}

#[tokio::test]
async fn events_record_the_acting_account() {
    let db = MemoryDatabase::new();
    let store = pools(&db, CacheConfig::default());

    with_account_id(7, store.create(Pool::default()))
        .await
        .expect("create");
    store.create(Pool::default()).await.expect("create");

    let accounts: Vec<Option<i64>> = load_pool_events(&db)
        .await
        .iter()
        .map(ObjectEvent::event_account_id)
        .collect();
    assert_eq!(accounts, vec![Some(7), None]);
}

#[tokio::test]
async fn failed_write_leaves_no_event() {
    let db = MemoryDatabase::new();
    let store = pools(&db, CacheConfig::default());
    store.init().await.expect("init");

    let err = store
        .update(Pool { id: 42 })
        .await
        .expect_err("missing row");
    assert!(matches!(err, StoreError::NotFound));
    assert!(load_pool_events(&db).await.is_empty());
    assert_eq!(store.sync().await.expect("sync"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_of_one_object_serialize() {
    let db = MemoryDatabase::new();
    let early = Arc::new(settings(&db));
    early.init().await.expect("init");
    let original = early.create(setting("theme", "light")).await.expect("create");

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let store = Arc::clone(&early);
            let value = Setting {
                value: n.to_string(),
                ..original.clone()
            };
            tokio::spawn(async move { store.update(value).await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.expect("writer task") {
            Ok(()) => succeeded += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(err) => panic!("unexpected update failure: {err}"),
        }
    }
    assert!(succeeded > 0);
    assert_eq!(early.sync().await.expect("sync"), succeeded + 1);

    let events = db.event_table::<SettingEvent>(SETTING_EVENT_TABLE);
    let mut tx = db.begin(TxMode::ReadOnly).await.expect("begin");
    let log = events.load_events(&mut tx, 1, 100).await.expect("load");
    db.commit(tx).await.expect("commit");
    let ids: Vec<i64> = log.iter().map(ObjectEvent::event_id).collect();
    assert_eq!(ids, (1..=succeeded as i64 + 1).collect::<Vec<_>>());

    // The row holds whatever the last committed update wrote.
    let last = log.last().expect("update event");
    assert_eq!(early.all(), vec![last.object().clone()]);

    let late = settings(&db);
    late.init().await.expect("init");
    assert_eq!(late.all(), early.all());
}
