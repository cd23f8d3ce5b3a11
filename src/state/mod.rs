pub mod lifecycle;
pub mod randomizer;
mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::randomizer_store::RandomizerStore, error::ServiceError,
    services::notifier::NotificationDispatcher, services::sse_events,
};

pub use self::sse::SseHub;
use self::sse::SseState;

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, collaborators and event hubs.
pub struct AppState {
    store: RwLock<Option<Arc<dyn RandomizerStore>>>,
    notifier: Arc<dyn NotificationDispatcher>,
    config: AppConfig,
    admin_token: Option<String>,
    sse: SseState,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    /// Admin routes stay locked when `admin_token` is `None`.
    pub fn new(
        config: AppConfig,
        notifier: Arc<dyn NotificationDispatcher>,
        admin_token: Option<String>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            notifier,
            config,
            admin_token,
            sse: SseState::new(64, 64),
            degraded: degraded_tx,
        })
    }

    /// Obtain the installed store, failing with [`ServiceError::Degraded`] while
    /// none is available.
    pub async fn require_store(&self) -> Result<Arc<dyn RandomizerStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn RandomizerStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag and announce it on both SSE streams when it changes.
    pub fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });

        if changed {
            sse_events::broadcast_system_status(self, value);
        }
    }

    /// Dispatcher delivering participant notifications.
    pub fn notifier(&self) -> Arc<dyn NotificationDispatcher> {
        self.notifier.clone()
    }

    /// Runtime configuration loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Static token expected in the admin header, if admin access is enabled.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Broadcast hub used for the admin SSE stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin()
    }
}
