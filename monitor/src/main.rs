//! Feed-monitoring scheduler
//!
//! Polls syndication feeds on heterogeneous per-feed intervals and fans out
//! new entries to their subscribers. This binary wires the monitor core
//! (state table, dispatcher, detector, fanout, periodic driver) to a set of
//! in-memory reference adapters and runs until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod context;
mod detector;
mod dispatcher;
mod driver;
mod fakes;
mod fanout;
mod queue;
mod state;
mod stats;
mod worker;

use context::MonitorContext;
use dispatcher::Dispatcher;
use driver::PeriodicDriver;
use queue::SubmissionQueue;
use shared::config::MonitorConfig;
use shared::traits::SystemClock;
use state::FeedStateTable;
use stats::StatsAggregator;

/// Command-line arguments for the monitor.
#[derive(Parser, Debug)]
#[command(name = "monitor")]
#[command(about = "Feed-monitoring scheduler: polls feeds and fans out new entries to subscribers", long_about = None)]
struct CliArgs {
    /// Path to the tunables.toml configuration file.
    #[arg(value_name = "CONFIG_PATH", default_value = "./tunables.toml")]
    config_path: PathBuf,

    /// Seconds between periodic driver ticks.
    #[arg(long = "tick-seconds", default_value_t = 60)]
    tick_seconds: u64,
}

fn init_logging() {
    let file_appender = tracing_appender::rolling::daily("./logs", "monitor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leak the guard: it must outlive `main`, and this process never tears
    // the subscriber down before exiting.
    Box::leak(Box::new(guard));

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("monitor=info,shared=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();
}

fn build_context(config: MonitorConfig) -> (MonitorContext, Arc<fakes::InMemoryFeedStore>, tokio::sync::mpsc::UnboundedReceiver<u64>) {
    let store = Arc::new(fakes::InMemoryFeedStore::default());
    fakes::seed_demo_feeds(&store);

    let stats = Arc::new(Mutex::new(StatsAggregator::new()));
    let (queue, rx) = SubmissionQueue::channel();
    let config = Arc::new(config);
    let state = FeedStateTable::new(stats.clone(), queue.sender(), config.effective_options.minimal_interval);

    let ctx = MonitorContext {
        config,
        store: store.clone(),
        fetcher: Arc::new(fakes::NullFetcher),
        parser: Arc::new(fakes::PassthroughParser),
        transport: Arc::new(fakes::LoggingTransport),
        flood_locks: Arc::new(fakes::NeverFloodLocked),
        utilities: Arc::new(fakes::LoggingUtilities),
        messages: Arc::new(fakes::EnglishOnlyCatalog),
        clock: Arc::new(SystemClock),
        state,
        queue,
        stats,
        user_unsub_locks: Arc::new(Mutex::new(std::collections::HashMap::new())),
        blocked_counts: Arc::new(Mutex::new(std::collections::HashMap::new())),
    };
    (ctx, store, rx)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli_args = CliArgs::parse();
    info!(config_path = %cli_args.config_path.display(), "feed-monitoring scheduler starting up");

    let config = match MonitorConfig::load(&cli_args.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL ERROR: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let (ctx, store, rx) = build_context(config);
    let task_source = Arc::new(fakes::AllFeedsDue(store));

    let dispatcher = Dispatcher::new(ctx.clone());
    let dispatcher_handle = dispatcher.spawn(rx);

    let driver = PeriodicDriver::new(ctx, task_source, Duration::from_secs(cli_args.tick_seconds));
    let driver_handle = tokio::spawn(driver.run());

    let shutdown_signal = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).unwrap();
            let mut sigint = signal(SignalKind::interrupt()).unwrap();
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.unwrap();
            info!("received Ctrl+C");
        }
    };

    shutdown_signal.await;
    info!("shutdown signal received, stopping");
    driver_handle.abort();
    dispatcher_handle.abort();
    info!("feed-monitoring scheduler shutdown complete");
    Ok(())
}
