//! 20-byte fixed frame layout: `tag(1) | body(18) | crc(1)`.
//!
//! For every tag except IMU (`M`), `body[0]` is the sqn and `body[1..18]`
//! (17 bytes) is the type payload. IMU frames carry no sqn; all 18 body
//! bytes are six little-endian `i16` samples.

use crate::crc8::crc8;

/// Total frame size on the wire.
pub const PACKET_SIZE: usize = 20;

/// Size of the body region covered by the CRC, excluding the tag byte.
const BODY_SIZE: usize = 18;

/// Maximum payload bytes after the sqn byte for non-IMU frames.
const MAX_PAYLOAD: usize = BODY_SIZE - 1;

pub const TAG_SYN: u8 = b'S';
pub const TAG_SYN_ACK: u8 = b'A';
pub const TAG_IMU: u8 = b'M';
pub const TAG_GUNSHOT: u8 = b'G';
pub const TAG_VESTSHOT: u8 = b'V';
pub const TAG_RELOAD: u8 = b'R';
pub const TAG_UPDATE_STATE: u8 = b'U';
pub const TAG_GUN_STATE_ACK: u8 = b'X';
pub const TAG_VEST_STATE_ACK: u8 = b'W';
pub const TAG_NAK: u8 = b'N';
pub const TAG_KILL: u8 = b'K';

/// The closed set of recognized wire tags (see external interfaces).
pub const KNOWN_TAGS: [u8; 11] = [
    TAG_SYN,
    TAG_SYN_ACK,
    TAG_IMU,
    TAG_GUNSHOT,
    TAG_VESTSHOT,
    TAG_RELOAD,
    TAG_UPDATE_STATE,
    TAG_GUN_STATE_ACK,
    TAG_VEST_STATE_ACK,
    TAG_NAK,
    TAG_KILL,
];

pub fn is_known_tag(tag: u8) -> bool {
    KNOWN_TAGS.contains(&tag)
}

/// A decoded, CRC-valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    body: [u8; BODY_SIZE],
}

impl Frame {
    /// sqn for every tag except `M`, which has no sqn (call [`imu_body`] instead).
    pub fn sqn(&self) -> u8 {
        self.body[0]
    }

    /// The 17 payload bytes following the sqn byte, for non-IMU tags.
    pub fn payload(&self) -> &[u8] {
        &self.body[1..]
    }

    /// The full 18-byte body, for IMU frames (no sqn byte).
    pub fn imu_body(&self) -> &[u8; BODY_SIZE] {
        &self.body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame length {0} != {PACKET_SIZE}")]
    WrongLength(usize),
    #[error("CRC mismatch: expected {expected:#04x}, got {got:#04x}")]
    CrcMismatch { expected: u8, got: u8 },
    #[error("unknown type tag {0:#04x}")]
    UnknownType(u8),
}

/// Encode a non-IMU frame: `tag | sqn | payload (zero-padded to 17 bytes) | crc`.
///
/// `payload` must be at most 17 bytes; longer payloads are truncated to fit,
/// since every defined non-IMU payload in this protocol is far shorter.
pub fn encode(tag: u8, sqn: u8, payload: &[u8]) -> [u8; PACKET_SIZE] {
    let mut frame = [0u8; PACKET_SIZE];
    frame[0] = tag;
    frame[1] = sqn;
    let n = payload.len().min(MAX_PAYLOAD);
    frame[2..2 + n].copy_from_slice(&payload[..n]);
    frame[19] = crc8(&frame[..19]);
    frame
}

/// Encode an IMU frame. `samples` is six little-endian `i16` values:
/// `(accX, accY, accZ, gyrX, gyrY, gyrZ)`.
pub fn encode_imu(samples: &[i16; 6]) -> [u8; PACKET_SIZE] {
    let mut frame = [0u8; PACKET_SIZE];
    frame[0] = TAG_IMU;
    for (i, sample) in samples.iter().enumerate() {
        let bytes = sample.to_le_bytes();
        frame[1 + i * 2] = bytes[0];
        frame[2 + i * 2] = bytes[1];
    }
    // bytes 13..19 remain zero padding.
    frame[19] = crc8(&frame[..19]);
    frame
}

/// Decode and CRC-validate a 20-byte frame.
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() != PACKET_SIZE {
        return Err(ProtocolError::WrongLength(bytes.len()));
    }
    let expected = crc8(&bytes[..19]);
    let got = bytes[19];
    if expected != got {
        return Err(ProtocolError::CrcMismatch { expected, got });
    }
    let tag = bytes[0];
    if !is_known_tag(tag) {
        return Err(ProtocolError::UnknownType(tag));
    }
    let mut body = [0u8; BODY_SIZE];
    body.copy_from_slice(&bytes[1..19]);
    Ok(Frame { tag, body })
}

/// Decode the six little-endian `i16` IMU samples from a frame body.
pub fn decode_imu(frame: &Frame) -> [i16; 6] {
    let body = frame.imu_body();
    let mut samples = [0i16; 6];
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample = i16::from_le_bytes([body[i * 2], body[i * 2 + 1]]);
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_round_trip_for_all_prefixes() {
        // Property: decode(p || crc8(p)) succeeds with the same type/payload,
        // for a representative sweep of 19-byte prefixes.
        for tag in KNOWN_TAGS {
            for sqn in [0u8, 1, 255] {
                let encoded = encode(tag, sqn, &[0xAB, 0xCD, 0xEF]);
                let decoded = decode(&encoded).expect("valid frame");
                assert_eq!(decoded.tag, tag);
                assert_eq!(decoded.sqn(), sqn);
            }
        }
    }

    #[test]
    fn wrong_length_rejected() {
        let short = [0u8; 10];
        assert_eq!(decode(&short), Err(ProtocolError::WrongLength(10)));
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let mut encoded = encode(TAG_GUNSHOT, 0, &[5]);
        encoded[5] ^= 0xFF;
        assert!(matches!(
            decode(&encoded),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut encoded = encode(TAG_GUNSHOT, 0, &[5]);
        encoded[0] = b'?';
        encoded[19] = crc8(&encoded[..19]);
        assert_eq!(decode(&encoded), Err(ProtocolError::UnknownType(b'?')));
    }

    #[test]
    fn imu_round_trip() {
        let samples = [100i16, -200, 300, -400, 500, -600];
        let encoded = encode_imu(&samples);
        let decoded = decode(&encoded).expect("valid frame");
        assert_eq!(decoded.tag, TAG_IMU);
        assert_eq!(decode_imu(&decoded), samples);
    }

    #[test]
    fn scenario_1_happy_handshake_gun_syn() {
        // Local gun state {bullets=6}: SYN payload carries (currShot=1, remainingBullets=6).
        let syn = encode(TAG_SYN, 0, &[1, 6]);
        assert_eq!(syn[0], b'S');
        assert_eq!(syn[1], 0);
        assert_eq!(syn[2], 1);
        assert_eq!(syn[3], 6);
        let decoded = decode(&syn).expect("valid SYN frame");
        assert_eq!(decoded.payload()[0], 1);
        assert_eq!(decoded.payload()[1], 6);
    }
}
