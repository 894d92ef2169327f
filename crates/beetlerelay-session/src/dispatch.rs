// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Type-specific frame handlers. Each function is summarized by its
//! pre/post conditions against [`GameState`] and the outbound queue; sqn
//! bookkeeping and duplicate/gap handling already happened one layer down
//! in `ReliableChannel`, so everything here assumes `frame` is validated
//! and in order.

use beetlerelay_protocol::{
    decode_imu, Frame, TAG_GUNSHOT, TAG_GUN_STATE_ACK, TAG_KILL, TAG_NAK, TAG_RELOAD, TAG_SYN_ACK,
    TAG_VESTSHOT, TAG_VEST_STATE_ACK,
};
use beetlerelay_state::{GameState, OutboundEvent, OutboundQueue};
use tracing::{debug, warn};

use crate::state_machine::BeetleRole;

/// Borrowed handles a dispatcher needs to act on one delivered frame. Built
/// fresh per call by the owning [`crate::session::Session`] rather than
/// held across calls, so there is no cyclic Session/Dispatcher ownership:
/// the dispatcher borrows, it never owns the session.
pub struct SessionCtx<'a> {
    pub beetle_id: &'a str,
    pub role: BeetleRole,
    pub player_id: &'a str,
    pub game_state: &'a GameState,
    pub outbound: &'a OutboundQueue,
}

/// Handle one delivered frame, returning zero or more raw frames the
/// session must write back to the peripheral (gunshot/vestshot ACKs).
pub fn dispatch_frame(ctx: &SessionCtx, frame: &Frame) -> Vec<Vec<u8>> {
    match frame.tag {
        beetlerelay_protocol::TAG_IMU => {
            handle_imu(ctx, frame);
            Vec::new()
        }
        TAG_GUNSHOT => handle_gunshot(ctx, frame),
        TAG_VESTSHOT => handle_vestshot(ctx, frame),
        TAG_RELOAD => {
            handle_reload_ack(ctx);
            Vec::new()
        }
        TAG_GUN_STATE_ACK => {
            handle_gun_state_ack(ctx, frame);
            Vec::new()
        }
        TAG_VEST_STATE_ACK => {
            handle_vest_state_ack(ctx, frame);
            Vec::new()
        }
        TAG_NAK => {
            // Already serviced by the ReliableChannel's own NAK handling;
            // nothing further for the dispatcher to do.
            debug!(beetle_id = ctx.beetle_id, "NAK delivered to dispatcher, already serviced");
            Vec::new()
        }
        TAG_SYN_ACK => {
            debug!(beetle_id = ctx.beetle_id, "duplicate SYN-ACK after handshake, ignored");
            Vec::new()
        }
        TAG_KILL => {
            warn!(beetle_id = ctx.beetle_id, "kill frame reached dispatcher");
            Vec::new()
        }
        other => {
            warn!(beetle_id = ctx.beetle_id, tag = other, "unhandled tag reached dispatcher");
            Vec::new()
        }
    }
}

fn handle_imu(ctx: &SessionCtx, frame: &Frame) {
    let samples = decode_imu(frame);
    ctx.outbound.enqueue_imu(OutboundEvent::Imu {
        beetle_id: ctx.beetle_id.to_string(),
        samples,
    });
}

/// `G` gunshot from the gun peripheral: enqueue the event, decrement the
/// magazine, and ACK with the peer's own sqn.
fn handle_gunshot(ctx: &SessionCtx, frame: &Frame) -> Vec<Vec<u8>> {
    let peer_sqn = frame.sqn();
    let remaining_bullets = frame.payload().first().copied().unwrap_or(0);

    ctx.outbound.enqueue_event(OutboundEvent::Gunshot {
        beetle_id: ctx.beetle_id.to_string(),
        player_id: ctx.player_id.to_string(),
    });
    ctx.game_state.use_bullet();
    if !ctx.game_state.apply_gun_state(remaining_bullets) {
        warn!(
            beetle_id = ctx.beetle_id,
            remaining_bullets, "gunshot apply_gun_state mismatch, not crashing"
        );
    }

    vec![beetlerelay_protocol::encode(TAG_GUNSHOT, peer_sqn, &[]).to_vec()]
}

/// `V` vestshot from the vest peripheral: enqueue the event, propose then
/// commit the shield/health pair, ACK with the peer's own sqn.
fn handle_vestshot(ctx: &SessionCtx, frame: &Frame) -> Vec<Vec<u8>> {
    let peer_sqn = frame.sqn();
    let payload = frame.payload();
    let shield = payload.first().copied().unwrap_or(0);
    let health = payload.get(1).copied().unwrap_or(0);

    ctx.outbound.enqueue_event(OutboundEvent::Vestshot {
        beetle_id: ctx.beetle_id.to_string(),
        player_id: ctx.player_id.to_string(),
    });
    ctx.game_state.update_vest_state(Some(shield), Some(health));
    let ack = beetlerelay_protocol::encode(TAG_VESTSHOT, peer_sqn, &[]).to_vec();
    if !ctx.game_state.apply_vest_state(shield, health) {
        warn!(beetle_id = ctx.beetle_id, shield, health, "vestshot apply mismatch, not crashing");
    }
    vec![ack]
}

/// `R` reload ACK: the peripheral confirms its magazine reset to MAG_SIZE.
/// Commits by applying the full magazine; the channel-level `arm/clear`
/// state-change bookkeeping is done by the caller (it owns the channel).
fn handle_reload_ack(ctx: &SessionCtx) {
    ctx.game_state.update_gun_state(Some(beetlerelay_state::MAG_SIZE));
    if !ctx.game_state.apply_gun_state(beetlerelay_state::MAG_SIZE) {
        warn!(beetle_id = ctx.beetle_id, "reload ack apply mismatch");
    }
}

/// `X` gun-state ACK: commits the outstanding `U` sent by the session's
/// server-recalibration path.
fn handle_gun_state_ack(ctx: &SessionCtx, frame: &Frame) {
    let remaining = frame.payload().get(1).copied().unwrap_or(0);
    if !ctx.game_state.apply_gun_state(remaining) {
        warn!(beetle_id = ctx.beetle_id, remaining, "gun-state ack apply mismatch");
    }
}

/// `W` vest-state ACK: commits the outstanding `U` sent by the session's
/// server-recalibration path.
fn handle_vest_state_ack(ctx: &SessionCtx, frame: &Frame) {
    let payload = frame.payload();
    let shield = payload.first().copied().unwrap_or(0);
    let health = payload.get(1).copied().unwrap_or(0);
    if !ctx.game_state.apply_vest_state(shield, health) {
        warn!(beetle_id = ctx.beetle_id, shield, health, "vest-state ack apply mismatch");
    }
}
