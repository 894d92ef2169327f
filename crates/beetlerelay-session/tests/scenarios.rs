// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios driven against an in-memory `BleLink`, exercising a
//! full `Session` rather than any one layer in isolation.

use std::sync::Arc;
use std::time::Duration;

use beetlerelay_channel::ChannelConfig;
use beetlerelay_protocol::{decode, encode, TAG_GUNSHOT, TAG_SYN, TAG_SYN_ACK};
use beetlerelay_session::{BeetleRole, BeetleState, MemoryBleLink, Session, SessionConfig};
use beetlerelay_state::{GameSnapshot, GameState, OutboundEvent, OutboundQueue, MAG_SIZE};

fn fast_config() -> SessionConfig {
    SessionConfig {
        handshake_interval: Duration::from_millis(5),
        max_notif_wait_time: Duration::from_millis(5),
        reconnection_interval: Duration::from_millis(1),
        ..SessionConfig::default()
    }
}

/// Steps `session` until it reaches READY or `max_steps` is exhausted.
fn drive_to_ready(session: &mut Session, max_steps: usize) {
    for _ in 0..max_steps {
        if session.state() == BeetleState::Ready {
            return;
        }
        session.step();
    }
}

/// Scenario 1: happy handshake, gun. Local `{bullets=6}`; the SYN payload
/// must carry `(currShot=1, remainingBullets=6)` and the session reaches
/// READY once the peer's SYN-ACK arrives.
#[test]
fn scenario_1_happy_handshake_gun() {
    let mut link = MemoryBleLink::new();
    link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
    let handle = link.handle();

    let game_state = Arc::new(GameState::from_snapshot(GameSnapshot {
        bullets: MAG_SIZE,
        shield: 30,
        health: 100,
    }));

    let mut session = Session::new(
        "beetle_1".to_string(),
        BeetleRole::Gun,
        "player-1".to_string(),
        Box::new(link),
        fast_config(),
        ChannelConfig::default(),
        game_state,
        Arc::new(OutboundQueue::bounded(16)),
        None,
        None,
    );

    drive_to_ready(&mut session, 10);
    assert_eq!(session.state(), BeetleState::Ready);

    let written = handle.written();
    let syn = written
        .iter()
        .map(|bytes| decode(bytes).expect("valid frame"))
        .find(|frame| frame.tag == TAG_SYN)
        .expect("a SYN frame was written");
    assert_eq!(syn.payload()[0], 1); // currShot
    assert_eq!(syn.payload()[1], MAG_SIZE); // remainingBullets
}

/// Scenario 2: gunshot round-trip. READY, `bullets=6`. Peer notifies a
/// gunshot frame with `remaining=5`; expect the outbound queue to gain a
/// `Gunshot` event, `GameState.bullets` to drop to 5, and an ACK written
/// back to the peer.
#[test]
fn scenario_2_gunshot_round_trip() {
    let mut link = MemoryBleLink::new();
    link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
    let handle = link.handle();

    let game_state = Arc::new(GameState::from_snapshot(GameSnapshot {
        bullets: MAG_SIZE,
        shield: 30,
        health: 100,
    }));
    let outbound = Arc::new(OutboundQueue::bounded(16));
    let outbound_rx = outbound.receiver();

    let mut session = Session::new(
        "beetle_1".to_string(),
        BeetleRole::Gun,
        "player-1".to_string(),
        Box::new(link),
        fast_config(),
        ChannelConfig::default(),
        game_state.clone(),
        outbound,
        None,
        None,
    );

    drive_to_ready(&mut session, 10);
    assert_eq!(session.state(), BeetleState::Ready);

    let gunshot = encode(TAG_GUNSHOT, 0, &[MAG_SIZE - 1]).to_vec();
    handle.push_inbound(gunshot);
    session.step(); // one READY-state poll: ingest the gunshot, dispatch, ACK

    assert_eq!(game_state.get_remaining_bullets(), MAG_SIZE - 1);
    let event = outbound_rx.try_recv().expect("gunshot event enqueued");
    match event {
        OutboundEvent::Gunshot { player_id, .. } => assert_eq!(player_id, "player-1"),
        other => panic!("expected Gunshot event, got {other:?}"),
    }
    assert!(handle
        .written()
        .iter()
        .any(|bytes| bytes.first() == Some(&TAG_GUNSHOT)));
}

/// Scenario 5: server-driven recalibration. READY, local `bullets=3`. A
/// server push of `bullets=5` arrives; the gun session proposes the new
/// count and sends a `U` frame; once the peer ACKs with `X`, the local
/// count commits to 5.
#[test]
fn scenario_5_server_driven_recalibration() {
    use beetlerelay_protocol::{TAG_GUN_STATE_ACK, TAG_UPDATE_STATE};
    use beetlerelay_state::{ServerGunState, SingleSlot};

    let mut link = MemoryBleLink::new();
    link.push_inbound(encode(TAG_SYN_ACK, 0, &[]).to_vec());
    let handle = link.handle();

    let game_state = Arc::new(GameState::from_snapshot(GameSnapshot {
        bullets: 3,
        shield: 30,
        health: 100,
    }));
    let server_gun_slot = Arc::new(SingleSlot::new());
    server_gun_slot.write(ServerGunState { bullets: 5 });

    let mut session = Session::new(
        "beetle_1".to_string(),
        BeetleRole::Gun,
        "player-1".to_string(),
        Box::new(link),
        fast_config(),
        ChannelConfig::default(),
        game_state.clone(),
        Arc::new(OutboundQueue::bounded(16)),
        Some(server_gun_slot),
        None,
    );

    drive_to_ready(&mut session, 10);
    assert_eq!(session.state(), BeetleState::Ready);

    // In real operation the gun keeps streaming IMU samples, so the READY
    // loop's notify_wait keeps returning promptly; after dispatching one
    // such frame the session ticks and polls server state, sending the U.
    let imu = beetlerelay_protocol::encode_imu(&[0, 0, 0, 0, 0, 0]).to_vec();
    handle.push_inbound(imu);
    session.step();

    let update = handle
        .written()
        .iter()
        .map(|bytes| decode(bytes).expect("valid frame"))
        .find(|frame| frame.tag == TAG_UPDATE_STATE)
        .expect("a U frame was written");
    assert_eq!(update.payload()[0], 5);

    // IMU frames are sqn-exempt, so the peer's tracked sqn is still 0 when
    // it ACKs with X carrying (bullets_used, remaining_bullets=5).
    let ack = encode(TAG_GUN_STATE_ACK, 0, &[1, 5]).to_vec();
    handle.push_inbound(ack);
    session.step();

    assert_eq!(game_state.get_remaining_bullets(), 5);
}
