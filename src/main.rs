//! Cohort Randomizer Back binary entrypoint wiring REST, SSE, storage and notifications.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use cohort_randomizer_back::{
    config::AppConfig,
    dao::randomizer_store::memory::MemoryRandomizerStore,
    routes,
    services::notifier::{LogDispatcher, NotificationDispatcher},
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let admin_token = env::var("ADMIN_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());
    if admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set; admin routes will reject every request");
    }

    let notifier = build_notifier(&config)?;
    let app_state = AppState::new(config, notifier, admin_token);

    start_storage(&app_state).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the Telegram dispatcher when a bot token is configured, the log one otherwise.
fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    match env::var("TELEGRAM_BOT_TOKEN").ok() {
        #[cfg(feature = "telegram-notify")]
        Some(token) if !token.trim().is_empty() => {
            use cohort_randomizer_back::services::notifier::TelegramDispatcher;

            let dispatcher = TelegramDispatcher::new(&config.telegram_api_base, token.trim())
                .context("building Telegram client")?;
            info!(api = %config.telegram_api_base, "delivering notifications through Telegram");
            Ok(Arc::new(dispatcher))
        }
        _ => {
            let _ = config;
            info!("no Telegram bot configured; notifications are only logged");
            Ok(Arc::new(LogDispatcher))
        }
    }
}

/// Install the in-memory store, or spawn the supervisor that keeps MongoDB connected.
async fn start_storage(state: &SharedState) {
    let backend = env::var("RANDOMIZER_STORE").unwrap_or_else(|_| "mongo".into());

    #[cfg(feature = "mongo-store")]
    {
        if backend != "memory" {
            use cohort_randomizer_back::{
                dao::{
                    randomizer_store::{
                        RandomizerStore,
                        mongodb::{MongoConfig, MongoRandomizerStore},
                    },
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            info!("using MongoDB storage; starting in degraded mode until connected");
            tokio::spawn(storage_supervisor::run(state.clone(), || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoRandomizerStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn RandomizerStore>)
            }));
            return;
        }
    }

    if backend != "memory" {
        warn!(%backend, "storage backend not compiled in; falling back to memory");
    }
    info!("using in-memory storage; data is lost on restart");
    state
        .set_store(Arc::new(MemoryRandomizerStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
