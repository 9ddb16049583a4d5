use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use quizstore::application::core::{ROLE_EVENT_TABLE, ROLE_TABLE};
use quizstore::application::stores::RoleStore;
use quizstore::cache::{CacheConfig, CacheStore, Store};
use quizstore::domain::entities::Role;
use quizstore::infra::db::MemoryDatabase;

#[tokio::test]
async fn store_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store: RoleStore<MemoryDatabase> = CacheStore::new(
        MemoryDatabase::new(),
        ROLE_TABLE,
        ROLE_EVENT_TABLE,
        CacheConfig::default(),
    );
    store.init().await.expect("init");
    store
        .create(Role {
            id: 0,
            name: "observe_quizzes".to_string(),
        })
        .await
        .expect("create");
    assert_eq!(store.sync().await.expect("sync"), 1);

    let entries = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = entries
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "quizstore_store_objects",
        "quizstore_store_sync_ms",
        "quizstore_store_events_applied_total",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    for (composite_key, _, _, _) in &entries {
        let labelled = composite_key
            .key()
            .labels()
            .any(|label| label.key() == "store" && label.value() == "roles");
        assert!(
            labelled,
            "metric {} lacks the store label",
            composite_key.key().name()
        );
    }
}
