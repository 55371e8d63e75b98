//! Tracing configuration for shardlink
//!
//! - **Development**: debug level for shardlink crates
//! - **Production**: info level
//! - `RUST_LOG` wins over both; `[logging] level` wins over the build default
//! - Optional daily rolling file next to stdout when `[logging] log_dir` is set

use std::{fs, io, path::Path, sync::OnceLock};

use anyhow::Context;
use sl_core::settings::LoggingSettings;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, prelude::*, registry, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn is_development() -> bool {
    cfg!(debug_assertions)
}

/// Build the default filter directives for tracing
///
/// ## Behavior / 行为
/// - Base level is `level_override` when given, otherwise build dependent
/// - mDNS daemon internals stay at warn; its socket churn is noisy
fn build_filter_directives(is_dev: bool, level_override: Option<&str>) -> Vec<String> {
    let base = level_override.unwrap_or(if is_dev { "debug" } else { "info" });
    vec![
        base.to_string(),
        format!("sl_network={base}"),
        format!("sl_app={base}"),
        "mdns_sd=warn".to_string(),
    ]
}

/// Initialize the global tracing subscriber
///
/// Call once, before any orchestrator starts.
///
/// ## Errors / 错误
///
/// - A subscriber is already registered
/// - The log directory cannot be created
pub fn init_tracing_subscriber(settings: &LoggingSettings) -> anyhow::Result<()> {
    let directives = build_filter_directives(is_development(), settings.level.as_deref());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_ansi(cfg!(not(test)))
        .with_writer(BoxMakeWriter::new(io::stdout));

    let file_layer = match &settings.log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_timer(fmt::time::ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_ansi(false)
                .with_writer(build_file_writer(dir)?),
        ),
        None => None,
    };

    registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to register tracing subscriber")?;

    Ok(())
}

fn build_file_writer(dir: &Path) -> anyhow::Result<NonBlocking> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(dir, "shardlink.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    LOG_GUARD
        .set(guard)
        .map_err(|_| anyhow::anyhow!("Tracing log guard already initialized"))?;

    Ok(non_blocking)
}
