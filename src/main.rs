use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use vendora_backend::api::{self, AppState};
use vendora_backend::config::AppConfig;
use vendora_backend::database::{InMemoryStore, ScheduleStore, TransactionLedger, WalletStore};
use vendora_backend::health::HealthChecker;
use vendora_backend::logging::init_tracing;
use vendora_backend::services::catalog::CatalogService;
use vendora_backend::services::fulfillment::FulfillmentService;
use vendora_backend::system_config::{FileSystemConfigSource, SystemConfigSource};
use vendora_backend::vending::registry::ProviderRegistry;
use vendora_backend::vending::router::Router as ProviderRouter;
use vendora_backend::workers::ScheduledPurchaseWorker;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

struct Stores {
    wallets: Arc<dyn WalletStore>,
    ledger: Arc<dyn TransactionLedger>,
    schedules: Arc<dyn ScheduleStore>,
}

impl Stores {
    fn shared<S>(store: S) -> Self
    where
        S: WalletStore + TransactionLedger + ScheduleStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            wallets: store.clone(),
            ledger: store.clone(),
            schedules: store,
        }
    }
}

#[cfg(feature = "database")]
async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    use vendora_backend::database::{init_pool_from_config, PgStore};

    match &config.database {
        Some(database) => {
            let pool = init_pool_from_config(database).await?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            info!("postgres store ready");
            Ok(Stores::shared(store))
        }
        None => {
            info!("skipping database initialization (SKIP_EXTERNALS=true)");
            Ok(Stores::shared(InMemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "database"))]
async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.database.is_some() {
        warn!("built without the database feature, falling back to the in-memory store");
    }
    Ok(Stores::shared(InMemoryStore::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        skip_externals = config.skip_externals,
        settings_path = %config.settings_path.display(),
        "starting vendora backend"
    );

    let stores = open_stores(&config).await?;

    let settings: Arc<dyn SystemConfigSource> =
        Arc::new(FileSystemConfigSource::new(config.settings_path.clone()));
    // Fail fast on a broken settings document; it is re-read per request afterwards.
    settings.load().await?;

    let registry = Arc::new(ProviderRegistry::from_config(
        &config.provider_a,
        &config.provider_b,
    )?);
    info!(providers = ?registry.providers(), "provider adapters registered");

    let fulfillment = FulfillmentService::new(
        ProviderRouter::new(registry.clone()),
        CatalogService::new(config.catalog_cache_ttl),
        stores.wallets.clone(),
        stores.ledger.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = if config.scheduler.enabled {
        let worker = ScheduledPurchaseWorker::new(
            stores.schedules.clone(),
            stores.wallets.clone(),
            fulfillment.clone(),
            settings.clone(),
            config.scheduler.clone(),
        );
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        info!("scheduled purchase worker disabled");
        None
    };

    let app = api::router(AppState {
        fulfillment,
        settings,
        ledger: stores.ledger.clone(),
        schedules: stores.schedules.clone(),
        health_checker: HealthChecker::new(stores.wallets.clone(), registry),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(address = %addr, error = %e, "failed to bind");
        e
    })?;
    info!(address = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        let grace = config
            .scheduler
            .shutdown_grace(config.provider_a.timeout.max(config.provider_b.timeout));
        info!(grace_secs = grace.as_secs(), "waiting for scheduled purchase worker");
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "scheduled purchase worker panicked"),
            Err(_) => warn!(
                "timed out waiting for scheduled purchase worker; claimed records stay PROCESSING"
            ),
        }
    }

    info!("server shutdown complete");
    Ok(())
}
