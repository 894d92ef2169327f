// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Single-slot mailboxes and the outbound event shape, shared between a
//! session's packet dispatcher and the upstream relay client.

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

/// A last-write-wins mailbox of capacity one. The server-state queues
/// (latest gun/vest state pushed down from upstream) and the IMU pairing
/// slots are all instances of this shape: a writer overwrites whatever is
/// there, a reader takes and clears it.
pub struct SingleSlot<T> {
    inner: Mutex<Option<T>>,
}

impl<T> SingleSlot<T> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    pub fn write(&self, value: T) {
        *self.inner.lock() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.inner.lock().take()
    }

    pub fn peek_is_some(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Default for SingleSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Authoritative gun state pushed down from the upstream server, awaiting
/// delivery to the gun peripheral as an `U` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerGunState {
    pub bullets: u8,
}

/// Authoritative vest state pushed down from the upstream server, awaiting
/// delivery to the vest peripheral as an `U` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerVestState {
    pub shield: u8,
    pub health: u8,
}

/// An event destined for the upstream relay's outbound queue. `beetle_id`
/// is used internally to pair IMU samples and to pick the server-state
/// queue a `U` push targets; it is stripped before non-IMU events are
/// serialized onto the wire (the relay's JSON contract carries only
/// `player_id` for `G`/`V` records).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Imu { beetle_id: String, samples: [i16; 6] },
    Gunshot { beetle_id: String, player_id: String },
    Vestshot { beetle_id: String, player_id: String },
}

/// The bounded MPSC queue sessions push onto and the relay client's sender
/// loop drains. IMU samples use drop-oldest-on-full backpressure (the
/// individual loss of a motion sample is acceptable); gunshot/vestshot
/// events use a blocking send so none are silently lost.
pub struct OutboundQueue {
    tx: Sender<OutboundEvent>,
    rx: Receiver<OutboundEvent>,
}

impl OutboundQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<OutboundEvent> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<OutboundEvent> {
        self.rx.clone()
    }

    /// Enqueue an IMU sample, dropping the oldest queued item if full.
    pub fn enqueue_imu(&self, event: OutboundEvent) {
        if self.tx.try_send(event.clone()).is_err() {
            let _ = self.rx.try_recv();
            let _ = self.tx.try_send(event);
        }
    }

    /// Enqueue a gunshot/vestshot event, blocking until the sender loop
    /// drains room (bounded backpressure rather than unbounded growth).
    pub fn enqueue_event(&self, event: OutboundEvent) {
        let _ = self.tx.send(event);
    }
}
