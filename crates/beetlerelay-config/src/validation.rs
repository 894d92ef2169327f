// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation: range and consistency checks beyond what
//! `serde`/`toml` enforce structurally.

use crate::{BeetleRelayConfig, ConfigError, ConfigResult};

#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidValue { field: String, reason: String },
    DuplicateDeviceMac { mac: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid configuration value for {field}: {reason}")
            }
            Self::DuplicateDeviceMac { mac } => {
                write!(f, "device MAC {mac} is assigned to more than one peripheral")
            }
        }
    }
}

/// Validate the complete configuration. Checks magazine/storage bounds, a
/// non-empty player id, and that the three device MACs are distinct.
pub fn validate_config(config: &BeetleRelayConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    if config.storage.mag_size == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "storage.mag_size".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.storage.packet_size == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "storage.packet_size".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.game.player_id.trim().is_empty() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "game.player_id".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    let macs = [
        &config.devices.beetle_1,
        &config.devices.beetle_2,
        &config.devices.beetle_3,
    ];
    for (i, mac) in macs.iter().enumerate() {
        if macs[..i].iter().any(|other| *other == *mac) {
            errors.push(ConfigValidationError::DuplicateDeviceMac { mac: (*mac).clone() });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let joined = errors
            .iter()
            .map(|e| format!("  - {e}"))
            .collect::<Vec<_>>()
            .join("\n");
        Err(ConfigError::ValidationError(format!(
            "configuration validation failed:\n{joined}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&BeetleRelayConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_device_macs_are_rejected() {
        let mut config = BeetleRelayConfig::default();
        config.devices.beetle_2 = config.devices.beetle_1.clone();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn empty_player_id_is_rejected() {
        let mut config = BeetleRelayConfig::default();
        config.game.player_id = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }
}
