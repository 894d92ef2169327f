// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! How the orchestrator obtains a [`BleLink`] per peripheral MAC. Kept as a
//! trait object rather than a concrete constructor so swapping in a real BLE
//! stack is a matter of supplying a different factory, not touching the
//! spawn/shutdown plumbing below.

use beetlerelay_session::{BleLink, MemoryBleLink};

/// Builds one [`BleLink`] per peripheral MAC address.
pub trait BleLinkFactory: Send + Sync {
    fn create(&self, mac: &str) -> Box<dyn BleLink>;
}

/// The only factory this repository ships: an in-memory stand-in, since no
/// concrete BLE stack is integrated here. A production deployment supplies
/// its own [`BleLinkFactory`] wired to the platform's BLE bindings.
#[derive(Default)]
pub struct MemoryLinkFactory;

impl BleLinkFactory for MemoryLinkFactory {
    fn create(&self, _mac: &str) -> Box<dyn BleLink> {
        Box::new(MemoryBleLink::new())
    }
}
