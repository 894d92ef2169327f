// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tracing subscriber initialization: console output plus one rotating log
//! file per subsystem (session, channel, relay, state, orchestrator) and a
//! combined `beetlerelay.log`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::SubsystemDebugFlags;

fn resolve_env_filter(debug_flags: &SubsystemDebugFlags) -> Result<EnvFilter> {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(rust_log.clone())
            .map_err(|e| anyhow!("invalid RUST_LOG '{rust_log}': {e}"));
    }
    Ok(EnvFilter::new(debug_flags.to_filter_string()))
}

/// Holds the non-blocking appender guards; logs stop flushing once dropped.
pub struct LoggingGuard {
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: PathBuf,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Initialize logging under `log_dir/run_<timestamp>/`, with a console layer
/// and one JSON file layer per entry in [`KNOWN_SUBSYSTEMS`] plus a combined
/// `beetlerelay.log`.
pub fn init_logging(
    debug_flags: &SubsystemDebugFlags,
    log_dir: Option<PathBuf>,
    retention_days: Option<u64>,
    retention_runs: Option<usize>,
) -> Result<LoggingGuard> {
    let base_log_dir = log_dir.unwrap_or_else(|| PathBuf::from("./logs"));

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = base_log_dir.join(format!("run_{timestamp}"));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_logs(&base_log_dir, retention_days, retention_runs)?;

    let env_filter = resolve_env_filter(debug_flags)?;

    let mut layers = Vec::new();
    let mut file_guards = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(env_filter.clone());
    layers.push(console_layer.boxed());

    for subsystem in crate::KNOWN_SUBSYSTEMS {
        let appender = rolling::daily(&run_folder, format!("{subsystem}.log"));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guards.push(guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(EnvFilter::new(format!("{subsystem}=debug,info")))
            .boxed();
        layers.push(file_layer);
    }

    let combined_appender = rolling::daily(&run_folder, "beetlerelay.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined_appender);
    let combined_layer = tracing_subscriber::fmt::layer()
        .with_writer(combined_non_blocking)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(env_filter)
        .boxed();
    layers.push(combined_layer);

    Registry::default().with(layers).init();
    file_guards.push(combined_guard);

    Ok(LoggingGuard { _file_guards: file_guards, log_dir: run_folder })
}

fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: Option<u64>,
    retention_runs: Option<usize>,
) -> Result<()> {
    if !base_log_dir.exists() {
        return Ok(());
    }

    let retention_days = retention_days.unwrap_or(30);
    let retention_runs = retention_runs.unwrap_or(10);
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

    let mut runs = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(ts) = name.strip_prefix("run_") {
                if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y%m%d_%H%M%S") {
                    runs.push((path, dt.and_utc()));
                }
            }
        }
    }
    runs.sort_by_key(|(_, dt)| *dt);

    let mut removed = 0;
    for (path, dt) in &runs {
        if *dt < cutoff {
            if std::fs::remove_dir_all(path).is_ok() {
                removed += 1;
            }
        }
    }
    if runs.len() - removed > retention_runs {
        let to_remove = runs.len() - removed - retention_runs;
        for (path, dt) in runs.iter().take(to_remove) {
            if *dt >= cutoff && path.exists() {
                let _ = std::fs::remove_dir_all(path);
            }
        }
    }
    Ok(())
}

pub fn init_logging_default(debug_flags: &SubsystemDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, None, None, None)
}
