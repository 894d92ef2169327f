// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support.
//!
//! Implements the 3-tier configuration loading order:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{BeetleRelayConfig, ConfigError, ConfigResult};

/// Search order: `BEETLERELAY_CONFIG_PATH` env var, then `./beetlerelay.toml`,
/// then up to 5 parent directories.
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("BEETLERELAY_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::FileNotFound(format!(
                "config file named by BEETLERELAY_CONFIG_PATH not found: {}",
                path.display()
            )))
        };
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join("beetlerelay.toml"));
        let mut current = cwd;
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join("beetlerelay.toml"));
                current = parent.to_path_buf();
            } else {
                break;
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::FileNotFound(format!(
        "beetlerelay.toml not found in any of these locations:\n{search_list}\n\nSet BEETLERELAY_CONFIG_PATH to override."
    )))
}

pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<BeetleRelayConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: BeetleRelayConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Supported environment variables:
/// - `BEETLERELAY_BEETLE_1`/`_2`/`_3` — device MAC overrides
/// - `BEETLERELAY_UPSTREAM_HOST` / `BEETLERELAY_UPSTREAM_PORT`
/// - `BEETLERELAY_PLAYER_ID`
/// - `BEETLERELAY_LOG_LEVEL`
pub fn apply_environment_overrides(config: &mut BeetleRelayConfig) {
    if let Ok(value) = env::var("BEETLERELAY_BEETLE_1") {
        config.devices.beetle_1 = value;
    }
    if let Ok(value) = env::var("BEETLERELAY_BEETLE_2") {
        config.devices.beetle_2 = value;
    }
    if let Ok(value) = env::var("BEETLERELAY_BEETLE_3") {
        config.devices.beetle_3 = value;
    }
    if let Ok(value) = env::var("BEETLERELAY_UPSTREAM_HOST") {
        config.upstream.host = value;
    }
    if let Ok(value) = env::var("BEETLERELAY_UPSTREAM_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.upstream.port = port;
        }
    }
    if let Ok(value) = env::var("BEETLERELAY_PLAYER_ID") {
        config.game.player_id = value;
    }
    if let Ok(value) = env::var("BEETLERELAY_LOG_LEVEL") {
        config.logging.global_log_level = value;
    }
}

/// CLI argument overrides (e.g. parsed from `--upstream-host 10.0.0.1`).
pub fn apply_cli_overrides(config: &mut BeetleRelayConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("upstream_host") {
        config.upstream.host = value.clone();
    }
    if let Some(value) = cli_args.get("upstream_port") {
        if let Ok(port) = value.parse::<u16>() {
            config.upstream.port = port;
        }
    }
    if let Some(value) = cli_args.get("player_id") {
        config.game.player_id = value.clone();
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.global_log_level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn find_config_file_honors_env_var() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        File::create(&config_path).unwrap();

        env::set_var("BEETLERELAY_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("BEETLERELAY_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn load_minimal_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("beetlerelay.toml");
        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[upstream]").unwrap();
        writeln!(file, "port = 9100").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        assert_eq!(config.upstream.port, 9100);
        assert_eq!(config.upstream.host, "127.0.0.1");
        assert_eq!(config.storage.mag_size, 6);
    }

    #[test]
    fn cli_overrides_take_precedence_over_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("beetlerelay.toml");
        File::create(&config_path).unwrap();

        env::set_var("BEETLERELAY_UPSTREAM_HOST", "env-host");
        let mut cli_args = HashMap::new();
        cli_args.insert("upstream_host".to_string(), "cli-host".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();
        env::remove_var("BEETLERELAY_UPSTREAM_HOST");

        assert_eq!(config.upstream.host, "cli-host");
    }
}
