// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The upstream relay client: one TCP connection to the cloud game engine,
//! driven by a sender thread (drains `outbound_q`, pairs IMU samples) and a
//! receiver thread (parses length-prefixed JSON, pushes authoritative state
//! into single-slot queues the gun/vest sessions poll).

pub mod client;
pub mod records;
pub mod wire;

pub use client::{RelayClient, RelayClientConfig, RelayError};
pub use records::{ImuPairedRecord, OutboundEventRecord, ServerStateRecord};
pub use wire::{write_record, RecordReader};
