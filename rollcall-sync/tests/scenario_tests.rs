//! Two clients sharing one remote store.

use pretty_assertions::assert_eq;
use rollcall_sync::transport::mock::InMemoryStore;
use rollcall_sync::{
    AllowAll, Identity, Patch, Record, RecordId, RemoteChange, Resolution, SubscribeOptions,
    SyncClient, SyncConfig, UpdateOptions, Version,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn client(store: &Arc<InMemoryStore>, who: &str) -> SyncClient {
    SyncClient::new(
        store.clone(),
        Arc::new(AllowAll::new(Identity::new(who))),
        SyncConfig::default(),
    )
}

fn v(n: u64) -> Version {
    Version::new(n).unwrap()
}

#[tokio::test]
async fn stale_update_is_resolved_by_keeping_local() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(
        "classes",
        Record::new(
            RecordId::from("c1"),
            json!({"subject": "Physics", "room": "A-101"})
                .as_object()
                .cloned()
                .unwrap(),
            Identity::new("registrar"),
        ),
    );
    let a = client(&store, "teacher-a");
    let b = client(&store, "teacher-b");
    let id = RecordId::from("c1");

    // A: cache miss, remote read, cached.
    let seen = a.accessor().read("classes", &id, true).await.unwrap().unwrap();
    assert_eq!(seen.version, v(1));
    assert_eq!(seen.field("subject"), Some(&json!("Physics")));
    assert_eq!(store.calls().reads, 1);
    assert_eq!(a.cache().record("classes", &id), Some(seen.clone()));

    // B moves the record to v2.
    let from_b = b
        .accessor()
        .update(
            "classes",
            &id,
            Patch::new(v(1)).set("subject", "Applied Physics"),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(from_b.version, v(2));

    // A still believes v1.
    let err = a
        .accessor()
        .update(
            "classes",
            &id,
            Patch::new(seen.version).set("room", "B-204"),
            UpdateOptions::default(),
        )
        .await
        .unwrap_err();
    let case = err.into_conflict().expect("expected a conflict");
    assert_eq!(case.remote_record.version, v(2));
    assert_eq!(case.remote_record.modified_by, Identity::new("teacher-b"));
    assert_eq!(case.differing_fields(), vec!["room"]);

    // A keeps its change on top of v2.
    let resolved = a
        .accessor()
        .resolve(case, Resolution::KeepLocal)
        .await
        .unwrap();
    assert_eq!(resolved.version, v(3));
    assert_eq!(resolved.field("room"), Some(&json!("B-204")));
    assert_eq!(resolved.field("subject"), Some(&json!("Applied Physics")));
    assert_eq!(resolved.modified_by, Identity::new("teacher-a"));

    let remote = store.get("classes", &id).unwrap();
    assert_eq!(remote, resolved);
    assert_eq!(
        b.accessor().read("classes", &id, false).await.unwrap(),
        Some(remote)
    );
}

#[tokio::test(start_paused = true)]
async fn listener_sees_other_clients_writes() {
    let store = Arc::new(InMemoryStore::new());
    let a = client(&store, "teacher-a");
    let b = client(&store, "teacher-b");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = a.subscribe_with(
        "notices",
        move |change| sink.lock().unwrap().push(change),
        |_| {},
        SubscribeOptions::default().with_throttle(Duration::from_millis(100)),
    );
    while store.watcher_count("notices") == 0 {
        tokio::task::yield_now().await;
    }

    let created = b
        .accessor()
        .create(
            "notices",
            json!({"title": "Sports day moved"}).as_object().cloned().unwrap(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(a.cache().record("notices", &created.id), Some(created.clone()));
    let delivered = seen.lock().unwrap().clone();
    assert_eq!(delivered.last(), Some(&RemoteChange::Upserted(created)));

    store.reset_calls();
    let listed = a.accessor().list("notices", true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(store.calls().fetches(), 0);
}
