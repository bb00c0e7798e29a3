//! Wavemap - territory exploration service for GPS trackers
//!
//! Receives tracker uplinks over MQTT, scores newly visited H3 cells with the
//! wavefront rule, and serves the map, leaderboard and metrics over HTTP.
//!
//! Module structure:
//! - `domain/` - Core types (trackers, cells, grid)
//! - `services/` - Store, scoring, ingestion, queries
//! - `io/` - External interfaces (MQTT, HTTP, journal, uplink log)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use wavemap::domain::GridIndex;
use wavemap::infra::{Config, Metrics};
use wavemap::io::{ApiState, FileJournal, UplinkLog};
use wavemap::services::{
    create_report_channel, ExplorationStore, IngestionPipeline, QueryService, ScoringEngine,
};

/// Wavemap - hexagonal territory exploration for LoRaWAN GPS trackers
#[derive(Parser, Debug)]
#[command(name = "wavemap", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "wavemap starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    wavemap::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        resolution = %u8::from(config.resolution()),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        mqtt_topic = %config.mqtt_topic(),
        http_port = %config.http_port(),
        journal_file = ?config.journal_file(),
        queue_capacity = %config.queue_capacity(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared components
    let grid = GridIndex::new(config.resolution());
    let store = Arc::new(match config.journal_file() {
        Some(path) => ExplorationStore::open(Box::new(FileJournal::new(path)), grid.resolution())
            .with_context(|| format!("Failed to open exploration journal {path}"))?,
        None => ExplorationStore::new(),
    });
    let metrics = Arc::new(Metrics::new());

    // Bounded queue between MQTT delivery and scoring
    let (report_tx, report_rx) = create_report_channel(config.queue_capacity());

    // Start MQTT client
    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    let uplink_log = config.uplink_log_file().map(UplinkLog::new);
    tokio::spawn(async move {
        if let Err(e) = wavemap::io::mqtt::start_mqtt_client(
            &mqtt_config,
            report_tx,
            mqtt_metrics,
            mqtt_shutdown,
            uplink_log,
        )
        .await
        {
            tracing::error!(error = %e, "MQTT client error");
        }
    });

    // Start HTTP server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let state = Arc::new(ApiState {
            query: QueryService::new(store.clone(), grid),
            metrics: metrics.clone(),
            map_center: config.map_center(),
        });
        let bind_address = config.http_bind_address().to_string();
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                wavemap::io::start_http_server(&bind_address, http_port, state, http_shutdown).await
            {
                tracing::error!(error = %e, "HTTP server error");
            }
        });
    }

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_store = store.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
            info!(
                visited_cells = %metrics_store.visited_cell_count(),
                trackers = %metrics_store.tracker_count(),
                total_score = %metrics_store.total_score(),
                "exploration_state"
            );
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run pipeline - consumes reports until the MQTT client drops its sender
    let pipeline = IngestionPipeline::new(
        ScoringEngine::new(grid, store.clone()),
        metrics,
        config.default_display_name(),
    );
    pipeline.run(report_rx).await;

    info!("wavemap shutdown complete");
    Ok(())
}
