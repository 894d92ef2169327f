// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-peripheral session state machine and packet dispatcher. A [`Session`]
//! owns one [`ble::BleLink`] and one `ReliableChannel`, drives the
//! connect/handshake/ready cycle, and hands delivered frames to
//! [`dispatch::dispatch_frame`] for type-specific handling.

pub mod ble;
pub mod dispatch;
pub mod session;
pub mod state_machine;

pub use ble::{BleError, BleLink, MemoryBleLink};
pub use dispatch::{dispatch_frame, SessionCtx};
pub use session::Session;
pub use state_machine::{BeetleRole, BeetleState, SessionConfig};

