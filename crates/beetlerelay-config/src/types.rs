// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions mapping to sections of `beetlerelay.toml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BeetleRelayConfig {
    pub devices: DevicesConfig,
    pub upstream: UpstreamConfig,
    pub ble: BleConfig,
    pub timeouts: TimeoutsConfig,
    pub storage: StorageConfig,
    pub game: GameConfig,
    pub logging: LoggingConfig,
}

/// Peripheral MAC addresses. `beetle_1` is the gun, `beetle_2` the ankle
/// IMU, `beetle_3` the vest — the fixed role assignment the orchestrator
/// spawns sessions with.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub beetle_1: String,
    pub beetle_2: String,
    pub beetle_3: String,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            beetle_1: "00:00:00:00:00:01".to_string(),
            beetle_2: "00:00:00:00:00:02".to_string(),
            beetle_3: "00:00:00:00:00:03".to_string(),
        }
    }
}

/// Upstream game-server TCP endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
        }
    }
}

/// BLE GATT service/characteristic identifiers, shared by all three peripherals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BleConfig {
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            service_uuid: "0000fff0-0000-1000-8000-00805f9b34fb".to_string(),
            characteristic_uuid: "0000fff1-0000-1000-8000-00805f9b34fb".to_string(),
        }
    }
}

/// All recognized timeouts, stored in milliseconds for TOML friendliness and
/// exposed as [`Duration`] via the accessor methods below.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub response_timeout_ms: u64,
    pub handshake_interval_ms: u64,
    pub reconnection_interval_ms: u64,
    pub max_notif_wait_time_ms: u64,
    pub stats_log_interval_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 1_000,
            handshake_interval_ms: 1_000,
            reconnection_interval_ms: 2_000,
            max_notif_wait_time_ms: 10_000,
            stats_log_interval_ms: 30_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
    pub fn handshake_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_interval_ms)
    }
    pub fn reconnection_interval(&self) -> Duration {
        Duration::from_millis(self.reconnection_interval_ms)
    }
    pub fn max_notif_wait_time(&self) -> Duration {
        Duration::from_millis(self.max_notif_wait_time_ms)
    }
    pub fn stats_log_interval(&self) -> Duration {
        Duration::from_millis(self.stats_log_interval_ms)
    }
}

/// Frame/buffer/budget sizing, shared by every session's `ReliableChannel`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mag_size: u8,
    pub packet_size: usize,
    pub max_buffer_size: usize,
    pub max_queue_size: usize,
    pub max_corrupt_packets: u32,
    pub max_timeout_resend_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mag_size: 6,
            packet_size: 20,
            max_buffer_size: 4096,
            max_queue_size: 256,
            max_corrupt_packets: 10,
            max_timeout_resend_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    pub player_id: String,
    /// Where the per-player `{bullets, shield, health}` snapshot is read/written.
    pub snapshot_path: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_id: "player-1".to_string(),
            snapshot_path: "beetlerelay_snapshot.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub global_log_level: String,
    pub log_dir: String,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
