// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wires the configured peripherals, the upstream relay, and shared
//! `GameState` together: one dedicated thread per `Session`, one
//! `RelayClient` (itself two threads), and a process-wide shutdown flag
//! each session's loop polls. Mirrors the dedicated-thread-plus-`Arc<AtomicBool>`
//! idiom used by `RelayClient` and by `Session::run` itself, just one layer up.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use beetlerelay_channel::ChannelConfig;
use beetlerelay_config::BeetleRelayConfig;
use beetlerelay_relay::{RelayClient, RelayClientConfig};
use beetlerelay_session::{BeetleRole, Session, SessionConfig};
use beetlerelay_state::{GameSnapshot, GameState, OutboundQueue, ServerGunState, ServerVestState, SingleSlot};
use tracing::{info, warn};

use crate::link_factory::BleLinkFactory;

fn session_config(config: &BeetleRelayConfig) -> SessionConfig {
    SessionConfig {
        response_timeout: config.timeouts.response_timeout(),
        handshake_interval: config.timeouts.handshake_interval(),
        reconnection_interval: config.timeouts.reconnection_interval(),
        max_notif_wait_time: config.timeouts.max_notif_wait_time(),
        stats_log_interval: config.timeouts.stats_log_interval(),
    }
}

fn channel_config(config: &BeetleRelayConfig) -> ChannelConfig {
    ChannelConfig {
        max_buffer_size: config.storage.max_buffer_size,
        max_corrupt_packets: config.storage.max_corrupt_packets,
        max_timeout_resend_attempts: config.storage.max_timeout_resend_attempts,
        response_timeout: config.timeouts.response_timeout(),
        ..ChannelConfig::default()
    }
}

/// Owns every spawned thread and the shared shutdown flag. Dropping it (or
/// calling [`OrchestratorHandle::shutdown`]) persists the snapshot, signals
/// every session and the relay client to tear down, and joins them all —
/// the process-level analogue of [`RelayClient`]'s own `stop`/`Drop`.
pub struct OrchestratorHandle {
    shutdown: Arc<AtomicBool>,
    sessions: Vec<JoinHandle<()>>,
    relay: Option<RelayClient>,
    game_state: Arc<GameState>,
    snapshot_path: PathBuf,
}

impl OrchestratorHandle {
    /// Persist the snapshot, flip the shutdown flag, and join every session
    /// thread. Idempotent: a second call is a no-op since the threads are
    /// already drained.
    pub fn shutdown(&mut self) {
        info!("shutdown requested, persisting snapshot and signaling sessions");
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.sessions.drain(..) {
            let _ = handle.join();
        }
        if let Some(mut relay) = self.relay.take() {
            relay.stop();
        }
        if let Err(err) = self.game_state.get_state().save(&self.snapshot_path) {
            warn!(error = %err, "failed to persist snapshot on shutdown");
        }
    }
}

impl Drop for OrchestratorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn one `Session` per configured peripheral (gun = `beetle_1`, ankle =
/// `beetle_2`, vest = `beetle_3`, per [`DevicesConfig`](beetlerelay_config::DevicesConfig))
/// plus the upstream `RelayClient`, sharing one `GameState` loaded from
/// `config.game.snapshot_path`.
pub fn spawn_all(
    config: &BeetleRelayConfig,
    link_factory: Arc<dyn BleLinkFactory>,
) -> anyhow::Result<OrchestratorHandle> {
    let snapshot_path = PathBuf::from(&config.game.snapshot_path);
    let snapshot = GameSnapshot::load_or_default(&snapshot_path);
    let game_state = Arc::new(GameState::from_snapshot(snapshot));

    let outbound = Arc::new(OutboundQueue::bounded(config.storage.max_queue_size));
    let server_gun_slot = Arc::new(SingleSlot::<ServerGunState>::new());
    let server_vest_slot = Arc::new(SingleSlot::<ServerVestState>::new());

    let relay_config = RelayClientConfig {
        host: config.upstream.host.clone(),
        port: config.upstream.port,
        player_id: config.game.player_id.clone(),
        gun_beetle_id: "beetle_1".to_string(),
        ankle_beetle_id: "beetle_2".to_string(),
    };
    let relay = RelayClient::spawn(
        relay_config,
        outbound.clone(),
        server_gun_slot.clone(),
        server_vest_slot.clone(),
    )?;
    info!(host = %config.upstream.host, port = config.upstream.port, "relay client connected");

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut sessions = Vec::with_capacity(3);

    let peripherals = [
        ("beetle_1", config.devices.beetle_1.clone(), BeetleRole::Gun, Some(server_gun_slot.clone()), None),
        ("beetle_2", config.devices.beetle_2.clone(), BeetleRole::Ankle, None, None),
        ("beetle_3", config.devices.beetle_3.clone(), BeetleRole::Vest, None, Some(server_vest_slot.clone())),
    ];

    for (beetle_id, mac, role, gun_slot, vest_slot) in peripherals {
        let link = link_factory.create(&mac);
        let session = Session::new(
            beetle_id.to_string(),
            role,
            config.game.player_id.clone(),
            link,
            session_config(config),
            channel_config(config),
            game_state.clone(),
            outbound.clone(),
            gun_slot,
            vest_slot,
        );
        let session_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("sess-{beetle_id}"))
            .spawn(move || session.run(session_shutdown))?;
        sessions.push(handle);
        info!(beetle_id, mac, ?role, "session thread spawned");
    }

    Ok(OrchestratorHandle {
        shutdown,
        sessions,
        relay: Some(relay),
        game_state,
        snapshot_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_factory::MemoryLinkFactory;
    use std::net::TcpListener;

    #[test]
    fn spawn_all_starts_three_sessions_and_shutdown_persists_snapshot() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Keep the upstream socket alive for the relay client's lifetime.
        let _accept_thread = thread::spawn(move || listener.accept());

        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("player-1.snapshot.json");

        let mut config = BeetleRelayConfig::default();
        config.upstream.host = addr.ip().to_string();
        config.upstream.port = addr.port();
        config.game.snapshot_path = snapshot_path.to_string_lossy().to_string();

        let mut handle = spawn_all(&config, Arc::new(MemoryLinkFactory)).unwrap();
        assert_eq!(handle.sessions.len(), 3);

        handle.shutdown();
        assert!(snapshot_path.exists());
    }
}
