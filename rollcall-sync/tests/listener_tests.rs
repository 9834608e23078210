use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rollcall_sync::transport::mock::InMemoryStore;
use rollcall_sync::{
    AllowAll, ChangeStream, Fields, Identity, Record, RecordId, RemoteChange, RemoteStore,
    SubscribeOptions, Subscription, SubscriptionState, SyncClient, SyncConfig, SyncError,
    TransportError, TransportResult, Version,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

fn record(id: &str, data: Value) -> Record {
    Record::new(RecordId::from(id), fields(data), Identity::new("seed"))
}

fn client_over(store: Arc<dyn RemoteStore>) -> SyncClient {
    init_tracing();
    SyncClient::new(store, Arc::new(AllowAll::default()), SyncConfig::default())
}

fn options(throttle_ms: u64) -> SubscribeOptions {
    SubscribeOptions::default()
        .with_throttle(Duration::from_millis(throttle_ms))
        .with_max_retries(3)
        .with_retry_delay(Duration::from_millis(100))
        .with_max_retry_delay(Duration::from_millis(250))
}

/// Lets spawned tasks run without advancing the paused clock.
async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

async fn wait_attached(store: &InMemoryStore, path: &str) {
    for _ in 0..1000 {
        if store.watcher_count(path) == 1 {
            settle().await;
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("no watcher attached to {path}");
}

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Vec<RemoteChange>>>);

impl Received {
    fn push(&self, change: RemoteChange) {
        self.0.lock().unwrap().push(change);
    }

    fn all(&self) -> Vec<RemoteChange> {
        self.0.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

struct Subscribed {
    handle: Subscription,
    received: Received,
    errors: oneshot::Receiver<SyncError>,
}

fn subscribe(client: &SyncClient, path: &str, options: SubscribeOptions) -> Subscribed {
    let received = Received::default();
    let sink = received.clone();
    let (tx, errors) = oneshot::channel();
    let handle = client.subscribe_with(
        path,
        move |change| sink.push(change),
        move |err| {
            let _ = tx.send(err);
        },
        options,
    );
    Subscribed {
        handle,
        received,
        errors,
    }
}

// ── Delivery ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn pushes_write_through_before_throttled_delivery() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(250));
    wait_attached(&store, "classes").await;

    let c1 = record("c1", json!({"subject": "Physics"}));
    store.insert("classes", c1.clone());
    settle().await;

    assert_eq!(client.cache().record("classes", &c1.id), Some(c1.clone()));
    assert_eq!(client.cache().listing("classes"), Some(vec![c1.clone()]));
    assert_eq!(sub.received.len(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sub.received.all(), vec![RemoteChange::Upserted(c1)]);
    assert_eq!(sub.handle.state(), SubscriptionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn burst_within_window_delivers_latest_once() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(250));
    wait_attached(&store, "classes").await;

    for n in 1..=5 {
        store.insert("classes", record(&format!("c{n}"), json!({"period": n})));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let got = sub.received.all();
    assert_eq!(got.len(), 1);
    match &got[0] {
        RemoteChange::Upserted(r) => assert_eq!(r.id, RecordId::from("c5")),
        other => panic!("unexpected delivery {other:?}"),
    }
    assert_eq!(client.cache().listing("classes").unwrap().len(), 5);

    store.insert("classes", record("c6", json!({"period": 6})));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sub.received.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn throttle_window_spans_a_reattach() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let _sub = client.subscribe_with(
        "classes",
        move |change| sink.lock().unwrap().push((Instant::now(), change)),
        |_| {},
        options(250),
    );
    wait_attached(&store, "classes").await;
    tokio::time::sleep(Duration::from_millis(260)).await;
    assert_eq!(delivered.lock().unwrap().len(), 1);

    let c1 = record("c1", json!({"subject": "Physics"}));
    store.insert("classes", c1.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.push_error("classes", TransportError::Unavailable("socket reset".into()));
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(store.calls().watches, 2);
    let delivered = delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 2);
    let gap = delivered[1].0 - delivered[0].0;
    assert!(gap >= Duration::from_millis(250), "deliveries {gap:?} apart");
    assert_eq!(delivered[1].1, RemoteChange::Snapshot(vec![c1]));
}

#[tokio::test(start_paused = true)]
async fn zero_throttle_delivers_every_push() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;

    for n in 1..=3 {
        store.insert("classes", record(&format!("c{n}"), json!({"period": n})));
    }
    settle().await;

    let got = sub.received.all();
    assert_eq!(got.len(), 4);
    assert_eq!(got[0], RemoteChange::Snapshot(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn record_path_receives_its_record_only() {
    let store = Arc::new(InMemoryStore::new());
    let c1 = record("c1", json!({"room": "A-101"}));
    store.insert("classes", c1.clone());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes/c1", options(0));
    wait_attached(&store, "classes/c1").await;

    store.insert("classes", record("c2", json!({"room": "B-204"})));
    let mut moved = c1.clone();
    moved.apply_fields(&fields(json!({"room": "C-305"})));
    moved.version = Version::new(2).unwrap();
    store.insert("classes", moved.clone());
    settle().await;

    assert_eq!(
        sub.received.all(),
        vec![RemoteChange::Upserted(c1), RemoteChange::Upserted(moved.clone())]
    );
    assert_eq!(client.cache().record("classes", &moved.id), Some(moved));
    assert_eq!(client.cache().record("classes", &RecordId::from("c2")), None);
}

#[tokio::test(start_paused = true)]
async fn removal_is_written_through() {
    let store = Arc::new(InMemoryStore::new());
    let c1 = record("c1", json!({"room": "A-101"}));
    store.insert("classes", c1.clone());
    let client = client_over(store.clone());
    let _sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;
    assert_eq!(client.cache().record("classes", &c1.id), Some(c1.clone()));

    store.delete("classes", &c1.id).await.unwrap();
    settle().await;

    assert_eq!(client.cache().record("classes", &c1.id), None);
    assert_eq!(client.cache().listing("classes"), Some(Vec::new()));
}

// ── Retry ────────────────────────────────────────────────────────

/// Records the instant of every attach attempt.
struct TimedStore {
    inner: Arc<InMemoryStore>,
    attaches: Mutex<Vec<Instant>>,
}

impl TimedStore {
    fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            attaches: Mutex::new(Vec::new()),
        }
    }

    fn gaps_ms(&self) -> Vec<u64> {
        let attaches = self.attaches.lock().unwrap();
        attaches
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl RemoteStore for TimedStore {
    async fn create(&self, collection: &str, record: Record) -> TransportResult<Record> {
        self.inner.create(collection, record).await
    }

    async fn read(&self, collection: &str, id: &RecordId) -> TransportResult<Option<Record>> {
        self.inner.read(collection, id).await
    }

    async fn list(&self, collection: &str) -> TransportResult<Vec<Record>> {
        self.inner.list(collection).await
    }

    async fn update(
        &self,
        collection: &str,
        record: Record,
        expected: Option<Version>,
    ) -> TransportResult<Record> {
        self.inner.update(collection, record, expected).await
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> TransportResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn watch(&self, path: &str) -> TransportResult<ChangeStream> {
        self.attaches.lock().unwrap().push(Instant::now());
        self.inner.watch(path).await
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_back_off_then_report_once() {
    let inner = Arc::new(InMemoryStore::new());
    inner.fail_next_watches(100);
    let store = Arc::new(TimedStore::new(inner.clone()));
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(0));

    let err = sub.errors.await.expect("error callback never ran");
    assert!(matches!(err, SyncError::RemoteReadFailed(_)), "{err:?}");

    assert_eq!(inner.calls().watches, 4);
    assert_eq!(store.gaps_ms(), vec![100, 200, 250]);
    assert_eq!(sub.received.len(), 0);
    settle().await;
    assert_eq!(sub.handle.state(), SubscriptionState::Closed);
    assert!(client.listeners().active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn recovery_resets_retry_count() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_next_watches(2);
    let client = client_over(store.clone());
    let mut sub = subscribe(&client, "classes", options(0));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sub.handle.state(), SubscriptionState::Retrying);
    assert_eq!(sub.handle.retry_count(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.calls().watches, 3);
    assert_eq!(sub.handle.state(), SubscriptionState::Listening);
    assert_eq!(sub.handle.retry_count(), 0);
    assert!(sub.errors.try_recv().is_err());

    let info = client.listeners().active();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].retry_count, 0);
    assert_eq!(info[0].path, "classes");
}

#[tokio::test(start_paused = true)]
async fn stream_error_reattaches() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;

    store.push_error("classes", TransportError::Unavailable("socket reset".into()));
    settle().await;
    assert_eq!(sub.handle.state(), SubscriptionState::Retrying);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.calls().watches, 2);
    assert_eq!(sub.handle.state(), SubscriptionState::Listening);

    store.insert("classes", record("c1", json!({})));
    settle().await;
    assert!(matches!(
        sub.received.all().last(),
        Some(RemoteChange::Upserted(r)) if r.id == RecordId::from("c1")
    ));
}

#[tokio::test(start_paused = true)]
async fn ended_stream_reattaches() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;

    store.close_streams("classes");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(store.calls().watches, 2);
    assert_eq!(store.watcher_count("classes"), 1);
    assert_eq!(sub.handle.state(), SubscriptionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn permission_denied_is_not_retried() {
    let store = Arc::new(InMemoryStore::new());
    store.deny("rules reject teachers/");
    let client = client_over(store.clone());
    let sub = subscribe(&client, "teachers", options(0));

    let err = sub.errors.await.unwrap();
    assert!(matches!(err, SyncError::PermissionDenied(_)));
    assert_eq!(store.calls().watches, 1);
    settle().await;
    assert!(sub.handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn denial_on_open_stream_closes_without_retry() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;

    store.push_error("classes", TransportError::PermissionDenied("revoked".into()));
    let err = sub.errors.await.unwrap();

    assert!(matches!(err, SyncError::PermissionDenied(reason) if reason == "revoked"));
    assert_eq!(store.calls().watches, 1);
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unsubscribe_is_idempotent_and_stops_delivery() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let mut sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;
    let before = sub.received.len();

    sub.handle.unsubscribe();
    sub.handle.unsubscribe();
    assert!(sub.handle.is_closed());
    assert!(client.listeners().active().is_empty());

    store.insert("classes", record("c1", json!({})));
    settle().await;
    assert_eq!(sub.received.len(), before);
    assert_eq!(store.watcher_count("classes"), 0);
    assert!(sub.errors.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_while_retrying_stops_reattaching() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_next_watches(100);
    let client = client_over(store.clone());
    let mut sub = subscribe(&client, "classes", options(0));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sub.handle.state(), SubscriptionState::Retrying);
    sub.handle.unsubscribe();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.calls().watches, 1);
    assert_eq!(sub.handle.state(), SubscriptionState::Closed);
    assert!(sub.errors.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_unsubscribes() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let sub = subscribe(&client, "classes", options(0));
    wait_attached(&store, "classes").await;
    assert_eq!(client.listeners().active().len(), 1);

    drop(sub);
    settle().await;

    assert!(client.listeners().active().is_empty());
    assert_eq!(store.watcher_count("classes"), 0);
}

#[tokio::test(start_paused = true)]
async fn active_lists_subscriptions_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let client = client_over(store.clone());
    let a = subscribe(&client, "classes", options(0));
    let b = subscribe(&client, "students", options(0));
    settle().await;

    let active = client.listeners().active();
    assert_eq!(
        active.iter().map(|i| i.path.as_str()).collect::<Vec<_>>(),
        vec!["classes", "students"]
    );
    assert!(a.handle.id() < b.handle.id());
    assert!(active.iter().all(|i| i.state == SubscriptionState::Listening));
}

#[tokio::test(start_paused = true)]
async fn reset_session_closes_everything_and_clears_cache() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("classes", record("c1", json!({})));
    let client = client_over(store.clone());
    let a = subscribe(&client, "classes", options(0));
    let b = subscribe(&client, "classes/c1", options(0));
    settle().await;
    assert!(!client.cache().is_empty());

    client.reset_session();
    settle().await;

    assert!(a.handle.is_closed());
    assert!(b.handle.is_closed());
    assert!(client.listeners().active().is_empty());
    assert!(client.cache().is_empty());
}
