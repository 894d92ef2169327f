// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The BLE transport boundary. A peripheral's service/characteristic is
//! treated as an opaque byte-stream supporting `write()` and `notify()`;
//! everything above [`BleLink`] is transport-agnostic.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("BLE connect failed: {0}")]
    ConnectFailed(String),
    #[error("BLE write failed: {0}")]
    WriteFailed(String),
    #[error("BLE transport closed")]
    TransportClosed,
}

/// One peripheral's BLE GATT characteristic, abstracted for testability.
/// A real implementation wraps a platform BLE stack; [`MemoryBleLink`]
/// below is an in-process test double driving the same interface.
pub trait BleLink: Send {
    fn connect(&mut self) -> Result<(), BleError>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), BleError>;
    /// Block up to `timeout` for the next notification chunk. `Ok(None)`
    /// means the wait elapsed with nothing received.
    fn notify_wait(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, BleError>;
    fn disconnect(&mut self);
}

/// A cloneable handle onto a [`MemoryBleLink`]'s queues, kept by test code
/// after the link itself has been moved into a `Session`, so inbound frames
/// can be fed in and written frames inspected from outside.
#[derive(Clone, Default)]
pub struct MemoryBleLinkHandle {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    connected: Arc<Mutex<bool>>,
}

impl MemoryBleLinkHandle {
    pub fn push_inbound(&self, bytes: Vec<u8>) {
        self.inbound.lock().push_back(bytes);
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }
}

/// An in-memory [`BleLink`] double: `connect()` always succeeds (unless
/// `connect_should_fail` is set), `write()` records bytes for inspection,
/// and `notify_wait` drains a pre-seeded queue of inbound chunks, returning
/// `Ok(None)` immediately rather than actually blocking for `timeout` when
/// the queue is empty.
#[derive(Default)]
pub struct MemoryBleLink {
    handle: MemoryBleLinkHandle,
    pub connect_should_fail: bool,
}

impl MemoryBleLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&mut self, bytes: Vec<u8>) {
        self.handle.push_inbound(bytes);
    }

    /// A cloneable handle retained by the caller, for feeding frames in and
    /// inspecting writes after the link has been moved into a `Session`.
    pub fn handle(&self) -> MemoryBleLinkHandle {
        self.handle.clone()
    }
}

impl BleLink for MemoryBleLink {
    fn connect(&mut self) -> Result<(), BleError> {
        if self.connect_should_fail {
            return Err(BleError::ConnectFailed("forced failure".to_string()));
        }
        *self.handle.connected.lock() = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BleError> {
        if !self.handle.is_connected() {
            return Err(BleError::TransportClosed);
        }
        self.handle.written.lock().push(bytes.to_vec());
        Ok(())
    }

    fn notify_wait(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, BleError> {
        if !self.handle.is_connected() {
            return Err(BleError::TransportClosed);
        }
        Ok(self.handle.inbound.lock().pop_front())
    }

    fn disconnect(&mut self) {
        *self.handle.connected.lock() = false;
    }
}
