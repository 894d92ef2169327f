// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The per-peripheral session: owns one [`BleLink`], one [`ReliableChannel`],
//! and drives the connect → handshake → ready state machine. Meant to be
//! moved into its own thread by the orchestrator and driven via [`Session::run`]
//! until the shared shutdown flag is set, mirroring the dedicated-worker-
//! thread idiom used elsewhere in this codebase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use beetlerelay_channel::{ChannelConfig, ChannelEvent, ReliableChannel};
use beetlerelay_protocol::{encode, TAG_GUN_STATE_ACK, TAG_RELOAD, TAG_SYN, TAG_SYN_ACK, TAG_UPDATE_STATE, TAG_VEST_STATE_ACK};
use beetlerelay_state::{GameState, OutboundQueue, ServerGunState, ServerVestState, SingleSlot, MAG_SIZE};
use tracing::{info, warn};

use crate::ble::BleLink;
use crate::dispatch::{self, SessionCtx};
use crate::state_machine::{BeetleRole, BeetleState, SessionConfig};

pub struct Session {
    beetle_id: String,
    role: BeetleRole,
    player_id: String,
    link: Box<dyn BleLink>,
    channel: ReliableChannel,
    config: SessionConfig,
    state: BeetleState,
    game_state: Arc<GameState>,
    outbound: Arc<OutboundQueue>,
    server_gun_slot: Option<Arc<SingleSlot<ServerGunState>>>,
    server_vest_slot: Option<Arc<SingleSlot<ServerVestState>>>,
    last_stats_log: Instant,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        beetle_id: String,
        role: BeetleRole,
        player_id: String,
        link: Box<dyn BleLink>,
        config: SessionConfig,
        channel_config: ChannelConfig,
        game_state: Arc<GameState>,
        outbound: Arc<OutboundQueue>,
        server_gun_slot: Option<Arc<SingleSlot<ServerGunState>>>,
        server_vest_slot: Option<Arc<SingleSlot<ServerVestState>>>,
    ) -> Self {
        Self {
            beetle_id,
            role,
            player_id,
            link,
            channel: ReliableChannel::new(channel_config),
            config,
            state: BeetleState::Disconnected,
            game_state,
            outbound,
            server_gun_slot,
            server_vest_slot,
            last_stats_log: Instant::now(),
        }
    }

    /// Emit the channel's counters at `info`. Called on every forced
    /// disconnect and on a `stats_log_interval` tick while READY.
    fn log_stats(&self, reason: &str) {
        let stats = self.channel.stats();
        info!(
            beetle_id = %self.beetle_id,
            reason,
            frames_received = stats.frames_received,
            frames_delivered = stats.frames_delivered,
            duplicates_dropped = stats.duplicates_dropped,
            gaps_naked = stats.gaps_naked,
            corrupt_frames = stats.corrupt_frames,
            resyncs = stats.resyncs,
            retransmits_sent = stats.retransmits_sent,
            nak_service_hits = stats.nak_service_hits,
            nak_service_misses = stats.nak_service_misses,
            "channel stats"
        );
    }

    pub fn state(&self) -> BeetleState {
        self.state
    }

    /// Drive the session until `shutdown` is set, then disconnect the link.
    /// Intended to be the body of a dedicated per-session thread.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            self.step();
        }
        if self.state != BeetleState::Disconnected {
            self.force_kill();
        }
        self.link.disconnect();
    }

    /// Run exactly one iteration of whatever the current state calls for:
    /// one connect attempt, one handshake round, or one READY-state poll.
    /// `run` is just this in a loop; exposed separately so scenario tests
    /// (and any embedder wanting finer control than a dedicated thread) can
    /// single-step a session.
    pub fn step(&mut self) {
        match self.state {
            BeetleState::Disconnected => self.do_connect(),
            BeetleState::Connected => self.do_handshake(),
            BeetleState::Ready => self.do_ready(),
        }
    }

    /// Force a teardown: send `K` to the peer and drop to DISCONNECTED.
    /// Used by the orchestrator's shutdown path.
    pub fn force_kill(&mut self) {
        let kill = encode(beetlerelay_protocol::TAG_KILL, 0, &[]).to_vec();
        let _ = self.link.write(&kill);
        self.log_stats("shutdown");
        self.state = BeetleState::Disconnected;
    }

    fn do_connect(&mut self) {
        match self.link.connect() {
            Ok(()) => {
                self.channel.reset();
                self.state = BeetleState::Connected;
                info!(beetle_id = %self.beetle_id, "connected, beginning handshake");
            }
            Err(err) => {
                warn!(beetle_id = %self.beetle_id, error = %err, "connect failed, backing off");
                thread::sleep(self.config.reconnection_interval);
            }
        }
    }

    fn do_handshake(&mut self) {
        let payload = self.syn_payload();
        let syn = self.channel.send_frame(TAG_SYN, 0, &payload, true);
        if self.link.write(&syn).is_err() {
            self.state = BeetleState::Disconnected;
            return;
        }

        match self.link.notify_wait(self.config.handshake_interval) {
            Ok(Some(bytes)) => {
                let now = Instant::now();
                let events = self.channel.ingest(&bytes, now);
                let saw_syn_ack = events
                    .iter()
                    .any(|e| matches!(e, ChannelEvent::Deliver(f) if f.tag == TAG_SYN_ACK));
                self.process_events(events);
                if self.state != BeetleState::Connected {
                    return;
                }
                if saw_syn_ack {
                    let ack = self.channel.send_frame(TAG_SYN_ACK, 0, &[], true);
                    if self.link.write(&ack).is_ok() {
                        self.channel.reset();
                        self.state = BeetleState::Ready;
                        info!(beetle_id = %self.beetle_id, "handshake complete, session ready");
                    } else {
                        self.state = BeetleState::Disconnected;
                    }
                }
                // else: no SYN-ACK yet this round, stay CONNECTED and retry the SYN.
            }
            Ok(None) => {
                // Handshake wait elapsed with no reply; retry.
            }
            Err(err) => {
                warn!(beetle_id = %self.beetle_id, error = %err, "transport error during handshake");
                self.state = BeetleState::Disconnected;
            }
        }
    }

    fn do_ready(&mut self) {
        match self.link.notify_wait(self.config.max_notif_wait_time) {
            Ok(Some(bytes)) => {
                let now = Instant::now();
                let events = self.channel.ingest(&bytes, now);
                self.process_events(events);
            }
            Ok(None) => {
                warn!(beetle_id = %self.beetle_id, "no notification within MAX_NOTIF_WAIT_TIME, disconnecting");
                self.state = BeetleState::Disconnected;
                return;
            }
            Err(err) => {
                warn!(beetle_id = %self.beetle_id, error = %err, "transport error in READY");
                self.state = BeetleState::Disconnected;
                return;
            }
        }

        if self.state != BeetleState::Ready {
            return;
        }
        let tick_events = self.channel.tick(Instant::now());
        self.process_events(tick_events);

        if self.state == BeetleState::Ready {
            self.poll_server_state(Instant::now());
        }

        if self.state == BeetleState::Ready && self.last_stats_log.elapsed() >= self.config.stats_log_interval {
            self.log_stats("interval");
            self.last_stats_log = Instant::now();
        }
    }

    /// Dispatch delivered frames, write transmit bytes, and react to a
    /// force-disconnect signal. Shared by the handshake and ready paths.
    fn process_events(&mut self, events: Vec<ChannelEvent>) {
        for event in events {
            match event {
                ChannelEvent::Deliver(frame) => {
                    if matches!(frame.tag, TAG_RELOAD | TAG_GUN_STATE_ACK | TAG_VEST_STATE_ACK) {
                        self.channel.clear_state_change();
                        self.channel.note_forward_progress();
                    }
                    let ctx = SessionCtx {
                        beetle_id: &self.beetle_id,
                        role: self.role,
                        player_id: &self.player_id,
                        game_state: &self.game_state,
                        outbound: &self.outbound,
                    };
                    let acks = dispatch::dispatch_frame(&ctx, &frame);
                    for ack in acks {
                        if self.link.write(&ack).is_err() {
                            self.state = BeetleState::Disconnected;
                        }
                    }
                }
                ChannelEvent::Transmit(bytes) => {
                    if self.link.write(&bytes).is_err() {
                        self.state = BeetleState::Disconnected;
                    }
                }
                ChannelEvent::ForceDisconnect(reason) => {
                    warn!(beetle_id = %self.beetle_id, ?reason, "channel forced disconnect");
                    self.log_stats("disconnect");
                    self.state = BeetleState::Disconnected;
                }
            }
        }
    }

    fn syn_payload(&self) -> Vec<u8> {
        match self.role {
            BeetleRole::Gun => vec![
                self.game_state.get_curr_shot(),
                self.game_state.get_remaining_bullets(),
            ],
            BeetleRole::Vest => {
                let (shield, health) = self.game_state.get_shield_health();
                vec![shield, health]
            }
            BeetleRole::Ankle => Vec::new(),
        }
    }

    /// Compare local state against the latest server-pushed state and send
    /// a recalibrating `U`/`R` frame if they disagree (scenario: server-driven
    /// recalibration). A no-op while a state change is already outstanding,
    /// since at most one `U`/`R` may be in flight (stop-and-wait).
    fn poll_server_state(&mut self, now: Instant) {
        if self.channel.state_change_in_progress() {
            return;
        }
        match self.role {
            BeetleRole::Gun => {
                let Some(slot) = self.server_gun_slot.clone() else { return };
                let Some(server) = slot.take() else { return };
                let local = self.game_state.get_remaining_bullets();
                if server.bullets == local {
                    // already in sync
                } else if server.bullets == MAG_SIZE {
                    self.send_reload(now);
                } else {
                    self.game_state.update_gun_state(Some(server.bullets));
                    self.send_gun_update(server.bullets, now);
                }
            }
            BeetleRole::Vest => {
                let Some(slot) = self.server_vest_slot.clone() else { return };
                let Some(server) = slot.take() else { return };
                let (local_shield, local_health) = self.game_state.get_shield_health();
                if server.shield != local_shield || server.health != local_health {
                    self.game_state
                        .update_vest_state(Some(server.shield), Some(server.health));
                    self.send_vest_update(server.shield, server.health, now);
                }
            }
            BeetleRole::Ankle => {}
        }
    }

    fn send_reload(&mut self, now: Instant) {
        let sqn = self.channel.next_outbound_sqn();
        let bytes = self.channel.send_frame(TAG_RELOAD, sqn, &[], false);
        self.transmit_state_change(bytes, now);
    }

    fn send_gun_update(&mut self, remaining_bullets: u8, now: Instant) {
        let sqn = self.channel.next_outbound_sqn();
        let bytes = self.channel.send_frame(TAG_UPDATE_STATE, sqn, &[remaining_bullets], false);
        self.transmit_state_change(bytes, now);
    }

    fn send_vest_update(&mut self, shield: u8, health: u8, now: Instant) {
        let sqn = self.channel.next_outbound_sqn();
        let bytes = self.channel.send_frame(TAG_UPDATE_STATE, sqn, &[shield, health], false);
        self.transmit_state_change(bytes, now);
    }

    fn transmit_state_change(&mut self, bytes: Vec<u8>, now: Instant) {
        if self.link.write(&bytes).is_ok() {
            self.channel.arm_state_change(bytes, now);
        } else {
            self.state = BeetleState::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::MemoryBleLink;
    use beetlerelay_protocol::{encode, TAG_SYN_ACK};
    use beetlerelay_state::{GameState, OutboundQueue, MAG_SIZE};
    use std::time::Duration;

    fn test_config() -> SessionConfig {
        SessionConfig {
            handshake_interval: Duration::from_millis(5),
            max_notif_wait_time: Duration::from_millis(5),
            reconnection_interval: Duration::from_millis(1),
            ..SessionConfig::default()
        }
    }

    fn new_session(
        role: BeetleRole,
        link: MemoryBleLink,
        server_gun_slot: Option<Arc<SingleSlot<ServerGunState>>>,
        server_vest_slot: Option<Arc<SingleSlot<ServerVestState>>>,
    ) -> Session {
        Session::new(
            "beetle_1".to_string(),
            role,
            "player-1".to_string(),
            Box::new(link),
            test_config(),
            ChannelConfig::default(),
            Arc::new(GameState::new()),
            Arc::new(OutboundQueue::bounded(16)),
            server_gun_slot,
            server_vest_slot,
        )
    }

    #[test]
    fn handshake_completes_on_syn_ack_and_reaches_ready() {
        let mut link = MemoryBleLink::new();
        link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
        let mut session = new_session(BeetleRole::Gun, link, None, None);

        session.do_connect();
        assert_eq!(session.state, BeetleState::Connected);

        session.do_handshake();
        assert_eq!(session.state, BeetleState::Ready);
    }

    #[test]
    fn handshake_retries_syn_when_no_reply_yet() {
        let link = MemoryBleLink::new();
        let mut session = new_session(BeetleRole::Ankle, link, None, None);

        session.do_connect();
        session.do_handshake();
        assert_eq!(session.state, BeetleState::Connected);
    }

    #[test]
    fn connect_failure_stays_disconnected() {
        let mut link = MemoryBleLink::new();
        link.connect_should_fail = true;
        let mut session = new_session(BeetleRole::Vest, link, None, None);

        session.do_connect();
        assert_eq!(session.state, BeetleState::Disconnected);
    }

    #[test]
    fn ready_session_dispatches_gunshot_and_acks() {
        let mut link = MemoryBleLink::new();
        link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
        let handle = link.handle();
        let mut session = new_session(BeetleRole::Gun, link, None, None);
        session.do_connect();
        session.do_handshake();
        assert_eq!(session.state, BeetleState::Ready);

        let gunshot = encode(beetlerelay_protocol::TAG_GUNSHOT, 0, &[MAG_SIZE - 1]).to_vec();
        handle.push_inbound(gunshot);

        session.do_ready();
        assert_eq!(session.game_state.get_remaining_bullets(), MAG_SIZE - 1);
        assert!(handle
            .written()
            .iter()
            .any(|bytes| bytes.first() == Some(&beetlerelay_protocol::TAG_GUNSHOT)));
    }

    #[test]
    fn server_push_triggers_reload_when_full_magazine_expected() {
        let mut link = MemoryBleLink::new();
        link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
        let slot = Arc::new(SingleSlot::new());
        slot.write(ServerGunState { bullets: MAG_SIZE });
        let mut session = new_session(BeetleRole::Gun, link, Some(slot), None);
        session.do_connect();
        session.do_handshake();
        assert_eq!(session.state, BeetleState::Ready);

        session.poll_server_state(Instant::now());
        assert!(session.channel.state_change_in_progress());
    }

    #[test]
    fn no_action_when_no_notification_arrives_within_deadline() {
        let mut link = MemoryBleLink::new();
        link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
        let mut session = new_session(BeetleRole::Ankle, link, None, None);
        session.do_connect();
        session.do_handshake();
        assert_eq!(session.state, BeetleState::Ready);

        session.do_ready();
        assert_eq!(session.state, BeetleState::Disconnected);
    }

    #[test]
    fn stats_tick_resets_without_panicking_once_interval_elapses() {
        let mut link = MemoryBleLink::new();
        link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
        let mut session = new_session(BeetleRole::Ankle, link, None, None);
        session.do_connect();
        session.do_handshake();
        assert_eq!(session.state, BeetleState::Ready);

        session.config.stats_log_interval = Duration::from_millis(0);
        session.last_stats_log = Instant::now() - Duration::from_millis(1);

        let mut handle_link = MemoryBleLink::new();
        handle_link.push_inbound(beetlerelay_protocol::encode_imu(&[0; 6]).to_vec());
        session.link = Box::new(handle_link);

        session.do_ready();
        assert_eq!(session.state, BeetleState::Ready);
        assert!(session.last_stats_log.elapsed() < Duration::from_secs(1));
    }
}
