// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! 20-byte framed wire protocol for the beetle relay: tag byte, sqn/payload
//! body, trailing CRC-8. See the frame codec component design for the exact
//! layout and the closed tag set.

mod crc8;
mod frame;

pub use crc8::crc8;
pub use frame::{
    decode, decode_imu, encode, encode_imu, is_known_tag, Frame, ProtocolError, KNOWN_TAGS,
    PACKET_SIZE, TAG_GUNSHOT, TAG_GUN_STATE_ACK, TAG_IMU, TAG_KILL, TAG_NAK, TAG_RELOAD,
    TAG_SYN, TAG_SYN_ACK, TAG_UPDATE_STATE, TAG_VESTSHOT, TAG_VEST_STATE_ACK,
};
