//! Application entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ton_watcher::api::create_router;
use ton_watcher::app::{
    AppState, JobScheduler, LedgerFetchClient, ReconciliationService, Shutdown,
    WebhookNotifier, register_watcher_jobs,
};
use ton_watcher::config::{LogFormat, WatcherConfig};
use ton_watcher::domain::{LedgerApi, TransactionStore, WebhookClient};
use ton_watcher::infra::{HttpWebhookClient, PostgresClient, PostgresConfig, TonApiClient};

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = WatcherConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    info!("TON Watcher v{}", env!("CARGO_PKG_VERSION"));
    info!(wallet = %config.wallet_address, "Watching wallet");

    let postgres_client = PostgresClient::new(&config.database_url, PostgresConfig::default())
        .await
        .context("Failed to connect to PostgreSQL")?;
    postgres_client
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;
    info!("Database connected and migrations applied");
    let store: Arc<dyn TransactionStore> = Arc::new(postgres_client);

    let ton_api: Arc<dyn LedgerApi> = Arc::new(
        TonApiClient::new(config.ton_api_config()).context("Failed to create TonAPI client")?,
    );
    let latest_client = LedgerFetchClient::new(Arc::clone(&ton_api), config.requests_per_second());
    let missing_client = if config.share_ledger_rate_limiter {
        info!("Latest and missing jobs share one ledger rate limiter");
        latest_client.clone()
    } else {
        LedgerFetchClient::new(Arc::clone(&ton_api), config.requests_per_second())
    };

    let reconciliation = Arc::new(ReconciliationService::new(
        Arc::clone(&store),
        latest_client,
        missing_client,
        config.fetch_settings(),
    ));

    let webhook_client: Arc<dyn WebhookClient> = Arc::new(
        HttpWebhookClient::new(config.webhook_config())
            .context("Failed to create webhook client")?,
    );
    let notifier = Arc::new(WebhookNotifier::new(
        Arc::clone(&store),
        webhook_client,
        config.notifier_config(),
    ));

    let scheduler = if config.enable_scheduler {
        let mut scheduler = JobScheduler::new();
        register_watcher_jobs(
            &mut scheduler,
            Arc::clone(&reconciliation),
            Arc::clone(&notifier),
            config.job_intervals(),
        );
        info!("Recurring jobs scheduled");
        Some(scheduler)
    } else {
        info!("Scheduler disabled, jobs run only when triggered through the API");
        None
    };

    // Manual job runs observe the same signal that stops the server
    let (api_shutdown_tx, api_shutdown) = Shutdown::channel();
    let app_state = Arc::new(AppState::new(reconciliation, notifier, api_shutdown));
    let router = create_router(app_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Admin API listening on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = api_shutdown_tx.send(true);
        })
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }

    info!("Shutdown complete");
    Ok(())
}
