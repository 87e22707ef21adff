//! Quote Stream Binary
//!
//! Starts the market data stream client.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `QUOTE_STREAM_TOKEN`: Bearer credential for the broker handshake
//!
//! ## Optional
//! - `QUOTE_STREAM_URL`: Broker WebSocket endpoint (default: ws://localhost:9001/stream)
//! - `QUOTE_WATCH_GROUP`: Name of the selected watch group (default: default)
//! - `QUOTE_WATCH_SYMBOLS`: Comma-separated symbols for the group (default: empty)
//! - `QUOTE_STREAM_THROTTLE_MS`: Per-symbol throttle window (default: 200)
//! - `QUOTE_STREAM_SLA_WINDOW_MS`: First-quote delivery window (default: 2000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use quote_stream::infrastructure::telemetry;
use quote_stream::{
    EnvTokenProvider, MarketStream, StaticWatchlistProvider, StreamConfig, WatchSelection,
    WatchlistProvider, init_metrics,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting quote stream client");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let tokens = Arc::new(EnvTokenProvider::new());
    let stream = MarketStream::spawn(config, tokens);

    // The watch-group source stands in for the out-of-scope REST provider;
    // a provider failure means "no symbols", never a fatal error.
    let group = std::env::var("QUOTE_WATCH_GROUP").unwrap_or_else(|_| "default".to_string());
    let provider = watchlist_from_env(&group);
    let symbols = match provider.resolve(&group).await {
        Ok(symbols) => symbols,
        Err(e) => {
            tracing::warn!(error = %e, group = %group, "Watchlist unavailable, watching nothing");
            vec![]
        }
    };
    tracing::info!(group = %group, symbols = symbols.len(), "Watch group selected");
    stream.set_watchlist(WatchSelection::group(group, symbols)).await;

    // Surface status transitions and SLA breaches in the logs.
    let mut status_rx = stream.status();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            tracing::info!(status = status.as_str(), "Connection status changed");
        }
    });

    let mut breach_rx = stream.breaches();
    tokio::spawn(async move {
        while let Ok(breach) = breach_rx.recv().await {
            tracing::warn!(symbol = %breach.symbol, "SLA breach advisory");
        }
    });

    tracing::info!("Quote stream ready");

    await_shutdown().await;

    stream.shutdown().await;
    tracing::info!("Quote stream stopped");
    Ok(())
}

/// Build the environment-backed watchlist provider.
fn watchlist_from_env(group: &str) -> StaticWatchlistProvider {
    let symbols: Vec<String> = std::env::var("QUOTE_WATCH_SYMBOLS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    StaticWatchlistProvider::new().with_group(group, symbols)
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        url = %config.transport.url,
        throttle_ms = config.delivery.throttle_interval.as_millis(),
        sla_window_ms = config.delivery.sla_window.as_millis(),
        reconnect_delay_ms = config.transport.reconnect_delay.as_millis(),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
