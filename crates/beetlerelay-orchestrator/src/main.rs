// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The relay process entry point: load config, init logging, spawn sessions
//! and the relay client, then block until Ctrl-C triggers the shutdown
//! sequence (snapshot, kill all peers, deterministic join).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use beetlerelay_config::{load_config, validate_config};
use beetlerelay_observability::{init_logging, parse_debug_flags};
use beetlerelay_orchestrator::{spawn_all, MemoryLinkFactory};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let cli_args = parse_cli_overrides(std::env::args().skip(1));
    let config = load_config(None, Some(&cli_args)).context("failed to load configuration")?;
    validate_config(&config).context("configuration failed validation")?;

    let debug_flags = parse_debug_flags();
    let log_dir = (!config.logging.log_dir.is_empty()).then(|| config.logging.log_dir.clone().into());
    let _logging_guard = init_logging(
        &debug_flags,
        log_dir,
        Some(config.logging.retention_days),
        Some(config.logging.retention_runs),
    )
    .context("failed to initialize logging")?;

    info!(
        upstream = %config.upstream.host,
        port = config.upstream.port,
        player_id = %config.game.player_id,
        "beetle relay starting"
    );

    let link_factory = Arc::new(MemoryLinkFactory);
    let mut handle = spawn_all(&config, link_factory).context("failed to spawn sessions and relay client")?;

    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install Ctrl-C handler")?;

    if shutdown_rx.recv().is_err() {
        error!("shutdown signal channel closed unexpectedly");
    }
    info!("Ctrl-C received, shutting down");
    handle.shutdown();

    Ok(())
}

/// Translates `--upstream-host X` / `--player-id Y` style flags into the
/// map `beetlerelay_config::apply_cli_overrides` expects. Unrecognized
/// flags (including the per-subsystem `--debug-*` ones consumed separately
/// by `parse_debug_flags`) are ignored here.
fn parse_cli_overrides(args: impl Iterator<Item = String>) -> HashMap<String, String> {
    let mut overrides = HashMap::new();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        let key = match arg.as_str() {
            "--upstream-host" => "upstream_host",
            "--upstream-port" => "upstream_port",
            "--player-id" => "player_id",
            "--log-level" => "log_level",
            _ => continue,
        };
        if let Some(value) = args.next() {
            overrides.insert(key.to_string(), value);
        }
    }
    overrides
}
