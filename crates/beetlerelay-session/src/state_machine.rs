// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session states, peripheral roles, and the timing configuration shared by
//! every session's connect/handshake/ready cycle.

use std::time::Duration;

/// Which of the three peripherals a session is talking to. Only the gun and
/// vest roles carry game state in their SYN payload and poll a server-state
/// queue; the ankle session is a pure IMU source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeetleRole {
    Gun,
    Ankle,
    Vest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeetleState {
    Disconnected,
    Connected,
    Ready,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub response_timeout: Duration,
    pub handshake_interval: Duration,
    pub reconnection_interval: Duration,
    pub max_notif_wait_time: Duration,
    pub stats_log_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(1),
            handshake_interval: Duration::from_secs(1),
            reconnection_interval: Duration::from_secs(2),
            max_notif_wait_time: Duration::from_secs(10),
            stats_log_interval: Duration::from_secs(30),
        }
    }
}
