// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-session reliable delivery layer on top of the framed wire protocol:
//! byte buffering/resync, type and CRC validation, peer-sqn sequencing with
//! NAK-on-gap, a sent-packet log serving NAK retransmission requests, and
//! stop-and-wait retransmission of outstanding state-changing frames.
//!
//! This module contains no I/O and no timers of its own: the owning session
//! feeds it bytes via [`ReliableChannel::ingest`] and drives its retransmit
//! clock via periodic [`ReliableChannel::tick`] calls, reading back
//! [`ChannelEvent`]s to act on (deliver to the dispatcher, write bytes to
//! the transport, or tear the session down).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use beetlerelay_protocol::{decode, encode, Frame, ProtocolError, PACKET_SIZE, TAG_IMU, TAG_KILL, TAG_NAK};
use tracing::{debug, error, warn};

/// Frames this channel retains in its sent-packet log for NAK service.
const SENT_LOG_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub max_buffer_size: usize,
    pub max_corrupt_packets: u32,
    pub max_timeout_resend_attempts: u32,
    pub response_timeout: Duration,
    /// Window of silence (no valid frame) after which the buffer resyncs.
    pub resync_window: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 4096,
            max_corrupt_packets: 10,
            max_timeout_resend_attempts: 3,
            response_timeout: Duration::from_secs(1),
            resync_window: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    CorruptBudgetExceeded,
    RetransmitBudgetExceeded,
    NakBudgetExceeded,
    KillReceived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A validated, in-order frame ready for the dispatcher.
    Deliver(Frame),
    /// Raw bytes the owning session must write to the peer.
    Transmit(Vec<u8>),
    /// The channel has exhausted a budget and the session must tear down.
    ForceDisconnect(DisconnectReason),
}

/// Running counters, exposed for `STATS_LOG_INTERVAL` observability ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStats {
    pub frames_received: u64,
    pub frames_delivered: u64,
    pub duplicates_dropped: u64,
    pub gaps_naked: u64,
    pub corrupt_frames: u64,
    pub resyncs: u64,
    pub retransmits_sent: u64,
    pub nak_service_hits: u64,
    pub nak_service_misses: u64,
    pub fragmented_residuals: u64,
}

struct SentEntry {
    sqn: u8,
    bytes: Vec<u8>,
}

pub struct ReliableChannel {
    config: ChannelConfig,
    buffer: Vec<u8>,
    expected_peer_sqn: u8,
    outbound_sqn: u8,
    sent_log: VecDeque<SentEntry>,
    corrupt_count: u32,
    last_valid_frame_at: Option<Instant>,
    state_change_in_progress: bool,
    last_state_change_frame: Option<Vec<u8>>,
    state_change_deadline: Option<Instant>,
    resend_attempts: u32,
    consecutive_naks_without_progress: u32,
    /// A validated, in-order-but-ahead frame held back until the sqn gap
    /// preceding it is filled by the peer's retransmission.
    held_frame: Option<Frame>,
    stats: ChannelStats,
}

impl ReliableChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            expected_peer_sqn: 0,
            outbound_sqn: 0,
            sent_log: VecDeque::new(),
            corrupt_count: 0,
            last_valid_frame_at: None,
            state_change_in_progress: false,
            last_state_change_frame: None,
            state_change_deadline: None,
            resend_attempts: 0,
            consecutive_naks_without_progress: 0,
            held_frame: None,
            stats: ChannelStats::default(),
        }
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn expected_peer_sqn(&self) -> u8 {
        self.expected_peer_sqn
    }

    pub fn outbound_sqn(&self) -> u8 {
        self.outbound_sqn
    }

    /// Reset both sqn counters and in-flight bookkeeping. Called on every
    /// fresh `connect()` (see the `reset_expected_peer_sqn` design decision).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_peer_sqn = 0;
        self.outbound_sqn = 0;
        self.sent_log.clear();
        self.corrupt_count = 0;
        self.last_valid_frame_at = None;
        self.state_change_in_progress = false;
        self.last_state_change_frame = None;
        self.state_change_deadline = None;
        self.resend_attempts = 0;
        self.consecutive_naks_without_progress = 0;
        self.held_frame = None;
    }

    /// The next relay-assigned outbound sqn, for `U`/`R` state-changing frames.
    pub fn next_outbound_sqn(&mut self) -> u8 {
        let sqn = self.outbound_sqn;
        self.outbound_sqn = self.outbound_sqn.wrapping_add(1);
        sqn
    }

    /// Encode and record an outbound frame. Non-handshake, non-NAK frames
    /// are kept in the sent-packet log so a later NAK can find them; NAKs
    /// themselves are never retained, since they carry no real sqn of
    /// their own (always sent with `sqn=0`) and would otherwise shadow the
    /// actual data frame at sqn 0 in the log.
    pub fn send_frame(&mut self, tag: u8, sqn: u8, payload: &[u8], is_handshake: bool) -> Vec<u8> {
        let bytes = encode(tag, sqn, payload).to_vec();
        if !is_handshake && tag != TAG_NAK {
            self.record_sent(sqn, bytes.clone());
        }
        bytes
    }

    fn record_sent(&mut self, sqn: u8, bytes: Vec<u8>) {
        if self.sent_log.len() >= SENT_LOG_CAPACITY {
            self.sent_log.pop_front();
        }
        self.sent_log.push_back(SentEntry { sqn, bytes });
    }

    /// Arm the stop-and-wait retransmit timer after sending a state-changing
    /// (`U` or `R`) frame.
    pub fn arm_state_change(&mut self, frame_bytes: Vec<u8>, now: Instant) {
        self.state_change_in_progress = true;
        self.last_state_change_frame = Some(frame_bytes);
        self.state_change_deadline = Some(now + self.config.response_timeout);
        self.resend_attempts = 0;
    }

    /// Called when an `X`/`W`/`R` ACK commits the outstanding state change.
    pub fn clear_state_change(&mut self) {
        self.state_change_in_progress = false;
        self.last_state_change_frame = None;
        self.state_change_deadline = None;
        self.resend_attempts = 0;
    }

    pub fn state_change_in_progress(&self) -> bool {
        self.state_change_in_progress
    }

    /// Drive retransmit timers. Call periodically (e.g. from the owning
    /// session's event loop) with the current time.
    pub fn tick(&mut self, now: Instant) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if let Some(deadline) = self.state_change_deadline {
            if self.state_change_in_progress && now >= deadline {
                if self.resend_attempts >= self.config.max_timeout_resend_attempts {
                    events.push(ChannelEvent::ForceDisconnect(
                        DisconnectReason::RetransmitBudgetExceeded,
                    ));
                    return events;
                }
                if let Some(frame) = self.last_state_change_frame.clone() {
                    self.resend_attempts += 1;
                    self.stats.retransmits_sent += 1;
                    self.state_change_deadline = Some(now + self.config.response_timeout);
                    events.push(ChannelEvent::Transmit(frame));
                }
            }
        }
        events
    }

    /// Feed newly-received bytes from the transport. Returns zero or more
    /// events: validated frames to dispatch, bytes to transmit back (NAKs),
    /// and/or a force-disconnect signal.
    pub fn ingest(&mut self, chunk: &[u8], now: Instant) -> Vec<ChannelEvent> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() > self.config.max_buffer_size {
            let overflow = self.buffer.len() - self.config.max_buffer_size;
            warn!(overflow, "channel buffer overflow, dropping oldest bytes");
            self.buffer.drain(..overflow);
        }

        let mut events = Vec::new();
        // A frame held by a prior call's gap does not block this call from
        // decoding newly-arrived bytes: those bytes may be the retransmitted
        // frame that fills the gap. It only blocks further bytes *within
        // this same call* once a new gap is (re-)detected below.
        self.try_resolve_held(&mut events);
        let mut gap_open = false;

        while !gap_open && self.buffer.len() >= PACKET_SIZE {
            let candidate: Vec<u8> = self.buffer.drain(..PACKET_SIZE).collect();
            self.stats.frames_received += 1;

            match decode(&candidate) {
                Ok(frame) => {
                    self.last_valid_frame_at = Some(now);
                    self.corrupt_count = 0;

                    if frame.tag == TAG_KILL {
                        events.push(ChannelEvent::Deliver(frame));
                        events.push(ChannelEvent::ForceDisconnect(DisconnectReason::KillReceived));
                        self.buffer.clear();
                        return events;
                    }

                    if frame.tag == TAG_IMU {
                        self.stats.frames_delivered += 1;
                        events.push(ChannelEvent::Deliver(frame));
                        continue;
                    }

                    let peer_sqn = frame.sqn();
                    if peer_sqn < self.expected_peer_sqn {
                        self.stats.duplicates_dropped += 1;
                        debug!(peer_sqn, expected = self.expected_peer_sqn, "duplicate frame dropped");
                        continue;
                    } else if peer_sqn == self.expected_peer_sqn {
                        self.expected_peer_sqn = self.expected_peer_sqn.wrapping_add(1);
                        self.stats.frames_delivered += 1;
                        if frame.tag == TAG_NAK {
                            if let Some(event) = self.service_nak(frame.payload()[0]) {
                                events.push(event);
                            }
                        }
                        events.push(ChannelEvent::Deliver(frame));
                        self.try_resolve_held(&mut events);
                    } else {
                        self.stats.gaps_naked += 1;
                        warn!(peer_sqn, expected = self.expected_peer_sqn, "sqn gap detected");
                        let nak = self.send_frame(TAG_NAK, 0, &[self.expected_peer_sqn], false);
                        events.push(ChannelEvent::Transmit(nak));
                        // Halt further processing of this notify until the
                        // missing frame arrives: hold this frame rather than
                        // splicing it back into the byte buffer.
                        self.held_frame = Some(frame);
                        gap_open = true;
                    }
                }
                Err(err) => {
                    self.handle_corrupt(&candidate, err, now, &mut events);
                    if matches!(events.last(), Some(ChannelEvent::ForceDisconnect(_))) {
                        return events;
                    }
                }
            }
        }

        if !self.buffer.is_empty() {
            self.stats.fragmented_residuals += 1;
        }

        events
    }

    fn handle_corrupt(
        &mut self,
        candidate: &[u8],
        err: ProtocolError,
        now: Instant,
        events: &mut Vec<ChannelEvent>,
    ) {
        self.stats.corrupt_frames += 1;
        self.corrupt_count += 1;

        let mut cleared = false;
        match err {
            ProtocolError::UnknownType(tag) => {
                error!(tag, "unknown type tag, clearing buffer");
                self.buffer.clear();
                cleared = true;
            }
            ProtocolError::CrcMismatch { .. } => {
                let observed_tag = candidate[0];
                if observed_tag == TAG_IMU {
                    debug!("corrupt IMU frame dropped");
                } else {
                    warn!("corrupt frame, requesting retransmit");
                    let nak = self.send_frame(TAG_NAK, 0, &[self.expected_peer_sqn], false);
                    events.push(ChannelEvent::Transmit(nak));
                }
            }
            ProtocolError::WrongLength(_) => {}
        }

        // No valid frame has ever been seen, or none within the resync
        // window: the buffer's alignment can't be trusted either way, so
        // clear it. Treating "never seen" as stale (rather than not-stale)
        // matters: otherwise a garbage run whose length isn't a multiple of
        // PACKET_SIZE leaves a residual that permanently shifts every
        // subsequent candidate out of frame.
        if !cleared {
            let stale = self
                .last_valid_frame_at
                .map(|t| now.duration_since(t) > self.config.resync_window)
                .unwrap_or(true);
            if stale {
                self.stats.resyncs += 1;
                self.buffer.clear();
            }
        }

        if self.corrupt_count >= self.config.max_corrupt_packets {
            events.push(ChannelEvent::ForceDisconnect(
                DisconnectReason::CorruptBudgetExceeded,
            ));
        }
    }

    /// Deliver the held out-of-order frame if forward progress has caught
    /// expected_peer_sqn up to it.
    fn try_resolve_held(&mut self, events: &mut Vec<ChannelEvent>) {
        let ready = self
            .held_frame
            .as_ref()
            .map(|h| h.sqn() == self.expected_peer_sqn)
            .unwrap_or(false);
        if !ready {
            return;
        }
        let held = self.held_frame.take().expect("checked Some above");
        self.expected_peer_sqn = self.expected_peer_sqn.wrapping_add(1);
        self.stats.frames_delivered += 1;
        if held.tag == TAG_NAK {
            if let Some(event) = self.service_nak(held.payload()[0]) {
                events.push(event);
            }
        }
        events.push(ChannelEvent::Deliver(held));
    }

    /// Resolve a NAK naming `requested_sqn` against the sent-packet log.
    fn service_nak(&mut self, requested_sqn: u8) -> Option<ChannelEvent> {
        let found = self
            .sent_log
            .iter()
            .rev()
            .find(|entry| entry.sqn == requested_sqn)
            .map(|entry| entry.bytes.clone());

        match found {
            Some(bytes) => {
                self.stats.nak_service_hits += 1;
                self.consecutive_naks_without_progress += 1;
                if self.consecutive_naks_without_progress >= self.config.max_timeout_resend_attempts {
                    return Some(ChannelEvent::ForceDisconnect(
                        DisconnectReason::NakBudgetExceeded,
                    ));
                }
                Some(ChannelEvent::Transmit(bytes))
            }
            None => {
                self.stats.nak_service_misses += 1;
                error!(requested_sqn, "NAK references unknown sqn, not in sent log");
                None
            }
        }
    }

    /// Called whenever forward progress is made (e.g. a state change
    /// commits), resetting the consecutive-NAK-without-progress budget.
    pub fn note_forward_progress(&mut self) {
        self.consecutive_naks_without_progress = 0;
    }
}
