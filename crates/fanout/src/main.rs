//! Fanout - Apply tasks across interdependent subprojects

mod cli;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use cli::Cli;

fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();
    Cli::parse().execute()
}

/// Console logging follows RUST_LOG (default: warn). When a home
/// directory is available, a debug-level JSON log additionally lands
/// under ~/.fanout/logs/, rotated daily.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));
    let registry = tracing_subscriber::registry().with(console);

    match file_layer() {
        Some((file, guard)) => {
            registry.with(file).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Rotating JSON file layer, or `None` when the log directory cannot
/// be created.
fn file_layer<S>() -> Option<(impl Layer<S>, tracing_appender::non_blocking::WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let log_dir = dirs::home_dir()?.join(".fanout").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "fanout.jsonl"));
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(EnvFilter::new("debug"));
    Some((layer, guard))
}
