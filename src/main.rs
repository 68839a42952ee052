use std::sync::Arc;

use anyhow::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use storefront_api::{
    catalog::InMemoryCatalog,
    config::AppConfig,
    db,
    events::{self, event_channel},
    handlers,
    payments::InMemoryPaymentProcessor,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            // Fall back to a local development setup instead of refusing to
            // start; production deployments always ship a config.
            eprintln!("Failed to load configuration ({e}), using development defaults");
            let mut config = AppConfig::new(
                "sqlite://storefront.db?mode=rwc".to_string(),
                "127.0.0.1".to_string(),
                8080,
                "development".to_string(),
            );
            config.auto_migrate = true;
            config
        }
    };

    init_tracing(&config);

    let pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    let db = Arc::new(pool);

    if config.auto_migrate {
        db::run_migrations(&db).await.context("migrations failed")?;
    }

    let (event_sender, event_rx) = event_channel(256);
    let event_task = tokio::spawn(events::process_events(event_rx));

    // The in-memory collaborators stand in until real catalog/payment
    // integrations are configured.
    let catalog = Arc::new(InMemoryCatalog::new());
    let payments = Arc::new(InMemoryPaymentProcessor::new());

    let state = AppState::new(
        db,
        Arc::new(config.clone()),
        event_sender,
        catalog,
        payments,
    );

    let mut app = handlers::router(state).layer(TraceLayer::new_for_http());
    if !config.is_production() {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Storefront API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    event_task.abort();
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
