// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loader for the beetle relay.
//!
//! Recognized keys: device MACs, upstream host/port, BLE service/characteristic
//! UUIDs, all session timeouts, frame/buffer/budget sizing, the player id,
//! and the snapshot/logging paths. Loaded from `beetlerelay.toml` with
//! environment and CLI override layers.
//!
//! ```rust,no_run
//! use beetlerelay_config::load_config;
//!
//! let config = load_config(None, None).expect("failed to load config");
//! println!("upstream: {}:{}", config.upstream.host, config.upstream.port);
//! ```

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML syntax: {0}")]
    Parse(String),
    #[error("{0}")]
    ValidationError(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_types_have_sane_defaults() {
        let config = BeetleRelayConfig::default();
        assert_eq!(config.storage.mag_size, 6);
        assert_eq!(config.timeouts.response_timeout_ms, 1_000);
    }
}
