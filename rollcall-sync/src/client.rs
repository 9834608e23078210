//! Sync client: wires cache, accessor and listener manager together.

use crate::accessor::RemoteAccessor;
use crate::auth::AuthProvider;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::listener::{ListenerManager, SubscribeOptions, Subscription};
use crate::record_cache::RecordCache;
use crate::transport::{RemoteChange, RemoteStore};
use std::sync::Arc;
use tracing::info;

/// One client's view of the remote store: a shared cache, an accessor and
/// a listener manager over the same transport.
pub struct SyncClient {
    config: SyncConfig,
    cache: Arc<RecordCache>,
    accessor: Arc<RemoteAccessor>,
    listeners: ListenerManager,
}

impl SyncClient {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
    ) -> Self {
        let cache = Arc::new(RecordCache::new(&config));
        let accessor = Arc::new(RemoteAccessor::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            auth,
            &config,
        ));
        let listeners = ListenerManager::new(store, Arc::clone(&cache), &config);
        Self {
            config,
            cache,
            accessor,
            listeners,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn accessor(&self) -> &Arc<RemoteAccessor> {
        &self.accessor
    }

    pub fn listeners(&self) -> &ListenerManager {
        &self.listeners
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// Subscribes with the configured listener defaults.
    pub fn subscribe<D, E>(&self, path: &str, on_data: D, on_error: E) -> Subscription
    where
        D: Fn(RemoteChange) + Send + Sync + 'static,
        E: FnOnce(SyncError) + Send + 'static,
    {
        self.listeners
            .subscribe(path, on_data, on_error, self.listeners.default_options())
    }

    /// Subscribes with explicit options.
    pub fn subscribe_with<D, E>(
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
        self.listeners.subscribe(path, on_data, on_error, options)
    }

    /// Drops all cached state and closes every subscription (logout).
    pub fn reset_session(&self) {
        self.listeners.close_all();
        self.cache.clear();
        info!("Sync session reset");
    }
}
