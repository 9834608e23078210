//! Listener manager: throttled, self-healing change subscriptions.
//!
//! Each subscription runs on its own task and moves through
//! `Connecting -> Listening <-> Retrying -> Closed`:
//!
//! - Every push is written through to the cache immediately.
//! - Callback delivery is throttled per subscription: pushes inside one
//!   window are coalesced and only the latest is delivered when the window
//!   elapses.
//! - Transport errors trigger reattachment with exponential backoff. When
//!   `max_retries` is exhausted the error callback runs once and the
//!   subscription closes.
//!
//! The returned [`Subscription`] is an owned handle. Unsubscribing is
//! idempotent and safe from any state; dropping the handle unsubscribes.

use crate::backoff::Backoff;
use crate::config::{ListenerConfig, SyncConfig};
use crate::error::{SyncError, TransportError};
use crate::record_cache::RecordCache;
use crate::transport::{ChangeStream, RemoteChange, RemoteStore};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Identifies a subscription within its manager.
pub type SubscriptionId = u64;

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Attaching to the change stream for the first time.
    Connecting,
    /// Receiving pushes.
    Listening,
    /// Waiting to reattach after a transport error.
    Retrying,
    /// Terminal.
    Closed,
}

/// Per-subscription throttling and retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub throttle: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl From<&ListenerConfig> for SubscribeOptions {
    fn from(config: &ListenerConfig) -> Self {
        Self {
            throttle: Duration::from_millis(config.throttle_ms),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::from(&ListenerConfig::default())
    }
}

impl SubscribeOptions {
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }
}

/// A registry entry, as reported by [`ListenerManager::active`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub path: String,
    pub state: SubscriptionState,
    pub retry_count: u32,
}

type DataCallback = Box<dyn Fn(RemoteChange) + Send + Sync>;
type ErrorCallback = Box<dyn FnOnce(SyncError) + Send>;
type Registry = Arc<Mutex<HashMap<SubscriptionId, Arc<Shared>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Shared subscription state ────────────────────────────────────

#[derive(Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    /// Returns `true` for the call that actually closed it.
    fn close(&self) -> bool {
        let was_closed = self.closed.swap(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        !was_closed
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

struct Status {
    state: SubscriptionState,
    retry_count: u32,
}

struct Shared {
    id: SubscriptionId,
    path: String,
    status: Mutex<Status>,
    close: CloseSignal,
}

impl Shared {
    fn state(&self) -> SubscriptionState {
        lock(&self.status).state
    }

    fn retry_count(&self) -> u32 {
        lock(&self.status).retry_count
    }

    // Closed is terminal; late transitions from the task are ignored.
    fn set_state(&self, state: SubscriptionState) {
        let mut status = lock(&self.status);
        if status.state != SubscriptionState::Closed {
            status.state = state;
        }
    }

    fn set_retrying(&self, retry_count: u32) {
        let mut status = lock(&self.status);
        if status.state != SubscriptionState::Closed {
            status.state = SubscriptionState::Retrying;
            status.retry_count = retry_count;
        }
    }

    fn reset_retries(&self) {
        lock(&self.status).retry_count = 0;
    }

    fn info(&self) -> SubscriptionInfo {
        let status = lock(&self.status);
        SubscriptionInfo {
            id: self.id,
            path: self.path.clone(),
            state: status.state,
            retry_count: status.retry_count,
        }
    }
}

fn shut_down(shared: &Shared, registry: &Registry) {
    if shared.close.close() {
        debug!("Closing subscription {} on {}", shared.id, shared.path);
    }
    shared.set_state(SubscriptionState::Closed);
    lock(registry).remove(&shared.id);
}

// ── Handle ───────────────────────────────────────────────────────

/// Owned handle to a live subscription.
pub struct Subscription {
    shared: Arc<Shared>,
    registry: Registry,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    pub fn state(&self) -> SubscriptionState {
        self.shared.state()
    }

    /// Reattach attempts since the last successful push.
    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SubscriptionState::Closed
    }

    /// Stops delivery and detaches. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        shut_down(&self.shared, &self.registry);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("path", &self.shared.path)
            .field("state", &self.state())
            .finish()
    }
}

// ── Manager ──────────────────────────────────────────────────────

/// Owns the subscription registry and spawns subscription tasks.
pub struct ListenerManager {
    store: Arc<dyn RemoteStore>,
    cache: Arc<RecordCache>,
    defaults: SubscribeOptions,
    registry: Registry,
    next_id: AtomicU64,
}

impl ListenerManager {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<RecordCache>, config: &SyncConfig) -> Self {
        Self {
            store,
            cache,
            defaults: SubscribeOptions::from(&config.listener),
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Options used when the caller has no preference.
    pub fn default_options(&self) -> SubscribeOptions {
        self.defaults.clone()
    }

    /// Subscribes to a collection (`"classes"`) or record (`"classes/c1"`).
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<D, E>(
        &self,
        path: &str,
        on_data: D,
        on_error: E,
        options: SubscribeOptions,
    ) -> Subscription
    where
        D: Fn(RemoteChange) + Send + Sync + 'static,
        E: FnOnce(SyncError) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(Shared {
            id,
            path: path.to_string(),
            status: Mutex::new(Status {
                state: SubscriptionState::Connecting,
                retry_count: 0,
            }),
            close: CloseSignal::default(),
        });
        lock(&self.registry).insert(id, Arc::clone(&shared));
        info!("Subscription {id} connecting to {path}");

        let task = SubscriptionTask {
            shared: Arc::clone(&shared),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            options,
            on_data: Box::new(on_data),
        };
        tokio::spawn(task.run(Box::new(on_error)));

        Subscription {
            shared,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Open subscriptions, ordered by id.
    pub fn active(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<_> = lock(&self.registry).values().map(|s| s.info()).collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    /// Closes every subscription (session reset).
    pub fn close_all(&self) {
        let all: Vec<Arc<Shared>> = lock(&self.registry).values().cloned().collect();
        for shared in all {
            shut_down(&shared, &self.registry);
        }
    }
}

// ── Task ─────────────────────────────────────────────────────────

struct SubscriptionTask {
    shared: Arc<Shared>,
    registry: Registry,
    store: Arc<dyn RemoteStore>,
    cache: Arc<RecordCache>,
    options: SubscribeOptions,
    on_data: DataCallback,
}

impl SubscriptionTask {
    async fn run(self, on_error: ErrorCallback) {
        let path = self.shared.path.clone();
        let mut backoff = Backoff::new(self.options.retry_delay, self.options.max_retry_delay);
        let mut throttle = Throttle::new(self.options.throttle);
        let mut retries = 0u32;

        loop {
            let Some(attached) = self.wait_for(&mut throttle, self.store.watch(&path)).await else {
                break;
            };

            let failure = match attached {
                Ok(stream) => {
                    self.shared.set_state(SubscriptionState::Listening);
                    debug!("Subscription {} listening on {path}", self.shared.id);
                    match self
                        .listen(stream, &mut throttle, &mut retries, &mut backoff)
                        .await
                    {
                        Some(err) => err,
                        None => break,
                    }
                }
                Err(err) => stream_error(err),
            };

            if self.shared.close.is_closed() {
                break;
            }

            if !failure.is_retryable() || retries >= self.options.max_retries {
                // The last value still waits for its window before the error is reported.
                if let Some(at) = throttle.due() {
                    if self
                        .wait_for(&mut throttle, tokio::time::sleep_until(at))
                        .await
                        .is_none()
                    {
                        break;
                    }
                }
                warn!(
                    "Subscription {} on {path} closed after {retries} retries: {failure}",
                    self.shared.id
                );
                on_error(failure);
                break;
            }

            retries += 1;
            self.shared.set_retrying(retries);
            let delay = backoff.next_delay();
            warn!(
                "Subscription {} on {path} failed ({failure}); retry {retries}/{} in {delay:?}",
                self.shared.id, self.options.max_retries
            );

            if self
                .wait_for(&mut throttle, tokio::time::sleep(delay))
                .await
                .is_none()
            {
                break;
            }
        }

        shut_down(&self.shared, &self.registry);
    }

    /// Pumps one attached stream. Returns `None` when unsubscribed and the
    /// transport error otherwise. A value still pending in `throttle` is
    /// left there for the caller.
    async fn listen(
        &self,
        mut stream: ChangeStream,
        throttle: &mut Throttle,
        retries: &mut u32,
        backoff: &mut Backoff,
    ) -> Option<SyncError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shared.close.closed() => return None,
                _ = wait_until(throttle.due()) => self.flush(throttle),
                item = stream.next() => match item {
                    Some(Ok(change)) => {
                        self.write_through(&change);
                        if *retries > 0 {
                            info!("Subscription {} recovered after {retries} retries", self.shared.id);
                            *retries = 0;
                            backoff.reset();
                            self.shared.reset_retries();
                        }
                        if let Some(change) = throttle.offer(change) {
                            (self.on_data)(change);
                        }
                    }
                    Some(Err(err)) => return Some(stream_error(err)),
                    None => {
                        return Some(SyncError::RemoteReadFailed(format!(
                            "change stream for {} ended",
                            self.shared.path
                        )));
                    }
                }
            }
        }
    }

    /// Waits for `fut` while still delivering a throttled value whose window
    /// closes meanwhile. `None` when unsubscribed first.
    async fn wait_for<F: Future>(&self, throttle: &mut Throttle, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = self.shared.close.closed() => return None,
                _ = wait_until(throttle.due()) => self.flush(throttle),
                output = &mut fut => return Some(output),
            }
        }
    }

    fn flush(&self, throttle: &mut Throttle) {
        if let Some(change) = throttle.take() {
            (self.on_data)(change);
        }
    }

    fn write_through(&self, change: &RemoteChange) {
        let path = self.shared.path.as_str();
        let (collection, is_record_path) = match path.split_once('/') {
            Some((collection, _)) => (collection, true),
            None => (path, false),
        };
        match change {
            RemoteChange::Upserted(record) => self.cache.put_record(collection, record),
            RemoteChange::Removed(id) => self.cache.forget_record(collection, id),
            RemoteChange::Snapshot(records) if !is_record_path => {
                self.cache.put_listing(collection, records);
            }
            RemoteChange::Snapshot(records) => {
                for record in records {
                    self.cache.put_record(collection, record);
                }
            }
        }
    }
}

/// Trailing-edge throttle. The first value opens a window and the latest
/// value is delivered when it closes. One instance lives for the whole
/// subscription, so reattaching cannot open a second window.
struct Throttle {
    window: Duration,
    pending: Option<RemoteChange>,
    deadline: Option<Instant>,
}

impl Throttle {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Hands the change back when it should be delivered right away.
    fn offer(&mut self, change: RemoteChange) -> Option<RemoteChange> {
        if self.window.is_zero() {
            return Some(change);
        }
        let window = self.window;
        self.pending = Some(change);
        self.deadline.get_or_insert_with(|| Instant::now() + window);
        None
    }

    fn due(&self) -> Option<Instant> {
        self.deadline
    }

    fn take(&mut self) -> Option<RemoteChange> {
        self.deadline = None;
        self.pending.take()
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn stream_error(err: TransportError) -> SyncError {
    match err {
        TransportError::PermissionDenied(reason) => SyncError::PermissionDenied(reason),
        other => SyncError::RemoteReadFailed(other.to_string()),
    }
}
