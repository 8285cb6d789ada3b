use axum::{routing::get, Router};
use lora_ingestor::alert::AlertEvaluator;
use lora_ingestor::config::Config;
use lora_ingestor::cooldown::CooldownTracker;
use lora_ingestor::db::{self, PgStore};
use lora_ingestor::fetch::Fetcher;
use lora_ingestor::metrics;
use lora_ingestor::notify::SmtpNotifier;
use lora_ingestor::poller::Poller;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting LoRa Ingestor");
    info!("Upstream: {}", config.live_url);
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.redacted_database_url());

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let pool = match db::make_pool(&config.database_url, config.db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = match SmtpNotifier::from_config(&config.mail) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Invalid alert email configuration: {}", e);
            std::process::exit(1);
        }
    };

    let fetcher = match Fetcher::new(config.live_url.clone(), config.fetch_timeout) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let alerts = AlertEvaluator::new(
        config.temp_threshold_c,
        CooldownTracker::new(config.cooldown_window),
        Arc::new(notifier),
    );
    let poller = Poller::new(
        fetcher,
        PgStore::new(pool),
        alerts,
        config.poll_interval,
        config.cooldown_sweep_every,
    );

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = poller.run() => {
            error!("Poller terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
