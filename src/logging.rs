//! Log subscriber setup.
//!
//! `switchboard replay --log-dir <dir>` uses [`init_production`], which writes
//! JSON lines that carry the per-event span (session and trace id). Other
//! subcommands use [`init_cli`]. `RUST_LOG` filters both, defaulting to `info`.

use std::path::Path;

use anyhow::Context as _;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the rotated log files.
pub const LOG_FILE_PREFIX: &str = "switchboard.log";

/// Keeps the background log writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to `{logs_dir}/switchboard.log.YYYY-MM-DD` as JSON, rotating daily,
/// and to stderr as text.
///
/// # Errors
///
/// Fails if `logs_dir` cannot be created or a subscriber is already set.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LoggingGuard { _writer: guard })
}

/// Log to stderr only.
///
/// # Errors
///
/// Fails if a subscriber is already set.
pub fn init_cli() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
