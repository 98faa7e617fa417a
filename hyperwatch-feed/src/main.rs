use hyperwatch_data::{
    DirectoryError, FeedError, NormalizedTradeRecord, Pipeline, PipelineConfig, TradeId, ViewFilters,
    WalletDirectory, WalletTable,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

/// How often newly admitted records are picked up for logging.
const RECORD_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runner settings that live outside the library pipeline.
#[derive(Debug, Clone)]
struct FeedConfig {
    /// JSON wallet directory, reloaded on SIGHUP
    directory_path: Option<PathBuf>,
    summary_interval: Duration,
}

impl FeedConfig {
    fn from_env() -> Self {
        Self {
            directory_path: std::env::var_os("HYPERWATCH_WALLETS").map(PathBuf::from),
            summary_interval: std::env::var("HYPERWATCH_SUMMARY_SECS")
                .ok()
                .and_then(|secs| secs.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
        }
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    // Both ring and aws-lc-rs may be compiled in, so pick one explicitly for wss://
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(error) = run().await {
        error!(%error, "hyperwatch feed exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FeedError> {
    let feed_config = FeedConfig::from_env();
    let config = PipelineConfig::from_env();
    let filters = ViewFilters::from_env();

    info!(?feed_config, ?config, ?filters, "starting hyperwatch feed");

    let directory = Arc::new(match &feed_config.directory_path {
        Some(path) => WalletDirectory::load(path)?,
        None => {
            warn!("HYPERWATCH_WALLETS not set, running without tracked wallets");
            WalletDirectory::default()
        }
    });

    let mut pipeline = Pipeline::new(config, Arc::clone(&directory))?;
    pipeline.state().set_filters(filters);
    pipeline.start();

    let mut status_rx = pipeline.state().subscribe_status();
    let mut records = tokio::time::interval(RECORD_POLL_INTERVAL);
    let mut summary = tokio::time::interval(feed_config.summary_interval);
    let mut last_logged: Option<TradeId> = None;
    let mut reload = reload_signal()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl-C, shutting down");
                break;
            }
            _ = reload.recv() => {
                if let Some(path) = &feed_config.directory_path {
                    match std::fs::read_to_string(path)
                        .map_err(DirectoryError::from)
                        .and_then(|json| WalletTable::from_json(&json))
                    {
                        Ok(table) => directory.replace(table),
                        Err(error) => warn!(path = %path.display(), %error, "wallet directory reload failed, keeping current table"),
                    }
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                match pipeline.state().last_error() {
                    Some(last_error) => info!(%status, %last_error, "connection status changed"),
                    None => info!(%status, "connection status changed"),
                }
            }
            _ = records.tick() => {
                last_logged = log_new_records(&pipeline.state().projected(), last_logged);
            }
            _ = summary.tick() => {
                let stats = pipeline.state().stats();
                info!(
                    status = %pipeline.state().status(),
                    total = stats.total_trades,
                    filtered = stats.filtered_trades,
                    tracked = stats.tracked_trades,
                    large = stats.large_trades,
                    volume = %stats.total_volume.round_dp(2),
                    buffered = pipeline.state().len(),
                    enriched = pipeline.processor().enriched(),
                    "trade summary"
                );
            }
        }
    }

    pipeline.stop().await;
    Ok(())
}

/// Log projected records newer than `last_logged`, oldest first, returning the newest id.
fn log_new_records(
    projected: &[NormalizedTradeRecord],
    last_logged: Option<TradeId>,
) -> Option<TradeId> {
    let fresh = projected
        .iter()
        .take_while(|record| last_logged.as_ref() != Some(&record.id))
        .collect::<Vec<_>>();

    for record in fresh.iter().rev() {
        let time = record.time.format("%H:%M:%S%.3f");
        let label = record.label.as_deref().unwrap_or("-");
        if record.is_tracked || record.is_large {
            info!(
                %time,
                coin = %record.coin,
                side = %record.side,
                price = %record.price,
                notional = %record.notional.round_dp(2),
                wallet = %record.wallet,
                label,
                tracked = record.is_tracked,
                large = record.is_large,
                "trade"
            );
        } else {
            debug!(
                %time,
                coin = %record.coin,
                side = %record.side,
                notional = %record.notional.round_dp(2),
                wallet = %record.wallet,
                "trade"
            );
        }
    }

    projected.first().map(|record| record.id.clone()).or(last_logged)
}

#[cfg(unix)]
fn reload_signal() -> Result<tokio::signal::unix::Signal, FeedError> {
    use tokio::signal::unix::{SignalKind, signal};
    signal(SignalKind::hangup())
        .map_err(|error| FeedError::Config(format!("failed to install SIGHUP handler: {error}")))
}

#[cfg(not(unix))]
fn reload_signal() -> Result<NeverSignal, FeedError> {
    Ok(NeverSignal)
}

/// Stand-in for platforms without SIGHUP: never fires.
#[cfg(not(unix))]
struct NeverSignal;

#[cfg(not(unix))]
impl NeverSignal {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}

/// Initialize logging
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("HYPERWATCH_LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
