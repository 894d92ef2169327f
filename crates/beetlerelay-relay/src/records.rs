// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire shapes for the upstream JSON records, serialized/deserialized
//! exactly as the external interfaces describe them.

use serde::{Deserialize, Serialize};

/// Outbound IMU pair: gun + ankle samples for one player, paired in the
/// sender loop before being flushed to the wire.
/// `player_id` stays snake_case on the wire like the rest of this protocol's
/// records; only the per-sample fields are camelCase, so each is renamed
/// individually rather than via a blanket `rename_all`.
#[derive(Debug, Clone, Serialize)]
pub struct ImuPairedRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub player_id: String,
    #[serde(rename = "gunAccX")]
    pub gun_acc_x: i16,
    #[serde(rename = "gunAccY")]
    pub gun_acc_y: i16,
    #[serde(rename = "gunAccZ")]
    pub gun_acc_z: i16,
    #[serde(rename = "gunGyrX")]
    pub gun_gyr_x: i16,
    #[serde(rename = "gunGyrY")]
    pub gun_gyr_y: i16,
    #[serde(rename = "gunGyrZ")]
    pub gun_gyr_z: i16,
    #[serde(rename = "ankleAccX")]
    pub ankle_acc_x: i16,
    #[serde(rename = "ankleAccY")]
    pub ankle_acc_y: i16,
    #[serde(rename = "ankleAccZ")]
    pub ankle_acc_z: i16,
    #[serde(rename = "ankleGyrX")]
    pub ankle_gyr_x: i16,
    #[serde(rename = "ankleGyrY")]
    pub ankle_gyr_y: i16,
    #[serde(rename = "ankleGyrZ")]
    pub ankle_gyr_z: i16,
}

impl ImuPairedRecord {
    pub fn new(player_id: String, gun: [i16; 6], ankle: [i16; 6]) -> Self {
        Self {
            kind: "M",
            player_id,
            gun_acc_x: gun[0],
            gun_acc_y: gun[1],
            gun_acc_z: gun[2],
            gun_gyr_x: gun[3],
            gun_gyr_y: gun[4],
            gun_gyr_z: gun[5],
            ankle_acc_x: ankle[0],
            ankle_acc_y: ankle[1],
            ankle_acc_z: ankle[2],
            ankle_gyr_x: ankle[3],
            ankle_gyr_y: ankle[4],
            ankle_gyr_z: ankle[5],
        }
    }
}

/// Outbound gunshot/vestshot event: `type ∈ {"G", "V"}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEventRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub player_id: String,
}

/// Inbound authoritative state pushed down by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStateRecord {
    pub player_id: String,
    pub bullets: u8,
    pub health: u8,
    pub hp_shield: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imu_record_field_names_match_the_wire_contract() {
        let record = ImuPairedRecord::new(
            "player-1".to_string(),
            [1, 2, 3, 4, 5, 6],
            [7, 8, 9, 10, 11, 12],
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"M\""));
        assert!(json.contains("\"gunAccX\":1"));
        assert!(json.contains("\"ankleGyrZ\":12"));
    }

    #[test]
    fn server_state_record_parses_expected_keys() {
        let json = r#"{"player_id":"player-1","bullets":5,"health":100,"hp_shield":0}"#;
        let record: ServerStateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.bullets, 5);
        assert_eq!(record.hp_shield, 0);
    }
}
