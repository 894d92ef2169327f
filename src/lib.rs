// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! # beetlerelay
//!
//! Laptop-side relay for a wearable laser-tag game. Each player carries three
//! microcontroller peripherals ("beetles") — a gun unit, an ankle IMU, and a
//! vest unit — connected over a low-bandwidth serial-over-BLE link. This crate
//! owns one session per peripheral, decodes the 20-byte framed wire protocol,
//! runs a stop-and-wait reliable channel with NAK-based retransmission,
//! mirrors authoritative game state against a cloud game engine, and forwards
//! sensor/event data upstream over a length-prefixed TCP channel.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! beetlerelay = "0.1"  # Umbrella crate (default: all components)
//! ```
//!
//! ## Feature Flags
//!
//! - **`full`** (default): all components below.
//! - **`protocol`**: frame codec + CRC-8 only.
//! - **`state`**: GameState (gun magazine, vest shield/health) only.
//! - **`channel`**: ReliableChannel (implies `protocol`).
//! - **`session`**: SessionStateMachine + PacketDispatcher (implies `channel`, `state`).
//! - **`relay`**: upstream TCP RelayClient (implies `state`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beetlerelay_protocol::{encode, decode};
//!
//! let frame = encode(b'K', 0, &[]);
//! let decoded = decode(&frame).expect("valid frame");
//! assert_eq!(decoded.tag, b'K');
//! ```
//!
//! The binary entry point that wires all of this together — one `Session`
//! thread per configured peripheral plus one `RelayClient` — lives in the
//! `beetlerelay-orchestrator` crate, not here; this crate is the library
//! surface for the component pieces.

#[cfg(feature = "protocol")]
pub use beetlerelay_protocol as protocol;

#[cfg(feature = "state")]
pub use beetlerelay_state as state;

#[cfg(feature = "channel")]
pub use beetlerelay_channel as channel;

#[cfg(feature = "session")]
pub use beetlerelay_session as session;

#[cfg(feature = "relay")]
pub use beetlerelay_relay as relay;

#[cfg(test)]
mod tests {
    #[test]
    fn reexports_compile() {
        #[cfg(feature = "protocol")]
        let _ = crate::protocol::encode(b'K', 0, &[]);
    }
}
