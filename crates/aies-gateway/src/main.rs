use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aies_core::config::AiesConfig;
use aies_engine::{CommandWatcher, Coordinator, CoordinatorOptions};
use aies_validate::{Schema, Validator};
use clap::Parser;
use futures_util::StreamExt;
use tracing::{info, warn};

mod app;
mod http;

#[derive(Debug, Parser)]
#[command(name = "aies-gateway", version, about = "Serve and validate per-device energy schedules")]
struct Cli {
    /// Config file (defaults to $AIES_CONFIG, then ~/.aies/aies.toml).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aies_gateway=info,aies_engine=info,tower_http=debug".into()),
        )
        .init();

    // load config: --config > AIES_CONFIG env > ~/.aies/aies.toml
    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("AIES_CONFIG").ok());
    let config = AiesConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AiesConfig::default()
    });

    let store = aies_store::open_store(&config.storage)?;

    let schema = match config.schema.path.as_deref() {
        Some(path) => {
            info!(%path, "loading schema");
            Schema::load(path)?
        }
        None => Schema::builtin()?,
    };

    let coordinator = Arc::new(
        Coordinator::load(store, Validator::new(schema), CoordinatorOptions::from(&config)).await,
    );

    // every bus event ends up in the log
    let mut events = coordinator.bus().subscribe_all().into_stream();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            info!(topic = %event.topic(), seq = event.seq(), event = %event.to_json(), "schedule event");
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if config.watcher.enabled {
        let watcher = CommandWatcher::new(
            Arc::clone(&coordinator),
            Duration::from_secs(config.watcher.tick_secs),
        );
        tokio::spawn(watcher.run(shutdown_rx));
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, coordinator));
    let router = app::build_router(state);

    info!("aies gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // stop the watcher
    let _ = shutdown_tx.send(true);
    Ok(())
}
