// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Authoritative, process-lifetime game state shared across all of a
//! player's peripheral sessions: the gun magazine and the vest
//! shield/health. Each sub-state is independently lock-protected and
//! supports a two-phase pending/apply update protocol so that a value
//! proposed to a peripheral is only ever considered live once the
//! peripheral (or the upstream server) confirms it.

use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

mod shared;
pub use shared::{OutboundEvent, ServerGunState, ServerVestState, SingleSlot};

/// Magazine capacity.
pub const MAG_SIZE: u8 = 6;
/// Maximum vest shield value.
pub const SHIELD_MAX: u8 = 30;
/// Maximum (and respawn) health value.
pub const HEALTH_MAX: u8 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read snapshot at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write snapshot at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// `{bullets, shield, health}`, the persisted-state contract of the
/// external interfaces: one JSON file per player, written at clean
/// shutdown and read at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub bullets: u8,
    pub shield: u8,
    pub health: u8,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            bullets: MAG_SIZE,
            shield: SHIELD_MAX,
            health: HEALTH_MAX,
        }
    }
}

impl GameSnapshot {
    /// Load a snapshot from `path`. A missing or malformed file is not
    /// fatal: the condition is logged and defaults are returned.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed snapshot, using defaults");
                    Self::default()
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "no snapshot found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| StateError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GunState {
    bullets: u8,
    pending: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
struct VestState {
    shield: u8,
    health: u8,
    pending: Option<(u8, u8)>,
}

/// Shared, thread-safe game state for one player, mirrored against every
/// peripheral session and the upstream server.
pub struct GameState {
    gun: Mutex<GunState>,
    vest: Mutex<VestState>,
}

impl GameState {
    pub fn new() -> Self {
        Self::from_snapshot(GameSnapshot::default())
    }

    pub fn from_snapshot(snapshot: GameSnapshot) -> Self {
        Self {
            gun: Mutex::new(GunState {
                bullets: snapshot.bullets.min(MAG_SIZE),
                pending: None,
            }),
            vest: Mutex::new(VestState {
                shield: snapshot.shield.min(SHIELD_MAX),
                health: if snapshot.health == 0 {
                    HEALTH_MAX
                } else {
                    snapshot.health.min(HEALTH_MAX)
                },
                pending: None,
            }),
        }
    }

    /// A snapshot of the current (committed) values.
    pub fn get_state(&self) -> GameSnapshot {
        let gun = self.gun.lock();
        let vest = self.vest.lock();
        GameSnapshot {
            bullets: gun.bullets,
            shield: vest.shield,
            health: vest.health,
        }
    }

    pub fn get_remaining_bullets(&self) -> u8 {
        self.gun.lock().bullets
    }

    pub fn get_shield_health(&self) -> (u8, u8) {
        let vest = self.vest.lock();
        (vest.shield, vest.health)
    }

    /// `MAG_SIZE - bullets + 1`, used to re-seed peripheral shot IDs on SYN.
    pub fn get_curr_shot(&self) -> u8 {
        MAG_SIZE - self.gun.lock().bullets + 1
    }

    /// Propose a new bullet count; does not take effect until [`apply_gun_state`].
    pub fn update_gun_state(&self, bullets: Option<u8>) {
        let mut gun = self.gun.lock();
        let proposed = bullets.unwrap_or(gun.bullets).min(MAG_SIZE);
        gun.pending = Some(proposed);
        debug!(proposed, "gun state update proposed");
    }

    /// Commit the pending bullet count iff it matches `bullets`.
    pub fn apply_gun_state(&self, bullets: u8) -> bool {
        let mut gun = self.gun.lock();
        match gun.pending {
            Some(pending) if pending == bullets => {
                gun.bullets = bullets;
                gun.pending = None;
                true
            }
            Some(pending) => {
                warn!(pending, confirmed = bullets, "gun state apply mismatch, rejecting");
                false
            }
            None => {
                warn!(confirmed = bullets, "gun state apply with no pending update");
                false
            }
        }
    }

    /// Propose a new shield/health pair; does not take effect until [`apply_vest_state`].
    pub fn update_vest_state(&self, shield: Option<u8>, health: Option<u8>) {
        let mut vest = self.vest.lock();
        let proposed_shield = shield.unwrap_or(vest.shield).min(SHIELD_MAX);
        let proposed_health = health.unwrap_or(vest.health).min(HEALTH_MAX);
        vest.pending = Some((proposed_shield, proposed_health));
        debug!(proposed_shield, proposed_health, "vest state update proposed");
    }

    /// Commit the pending shield/health pair iff it matches. If the
    /// confirmed health is `<= 0`, respawn instead of committing it.
    pub fn apply_vest_state(&self, shield: u8, health: u8) -> bool {
        let mut vest = self.vest.lock();
        if health == 0 {
            vest.shield = 0;
            vest.health = HEALTH_MAX;
            vest.pending = None;
            warn!("vest apply would leave health <= 0, respawning");
            return false;
        }
        match vest.pending {
            Some(pending) if pending == (shield, health) => {
                vest.shield = shield;
                vest.health = health;
                vest.pending = None;
                true
            }
            Some(pending) => {
                warn!(?pending, confirmed = ?(shield, health), "vest state apply mismatch, rejecting");
                false
            }
            None => {
                warn!(confirmed = ?(shield, health), "vest state apply with no pending update");
                false
            }
        }
    }

    /// Reduce the magazine by one shot. Pending only; confirmed by a
    /// subsequent [`apply_gun_state`] carrying the peripheral's own count.
    pub fn use_bullet(&self) -> bool {
        let mut gun = self.gun.lock();
        if gun.bullets == 0 {
            warn!("use_bullet called with empty magazine");
            return false;
        }
        let proposed = gun.bullets.saturating_sub(1);
        gun.pending = Some(proposed);
        true
    }

    /// Propose a full shield refresh.
    pub fn refresh_shield(&self) {
        let mut vest = self.vest.lock();
        let health = vest.health;
        vest.pending = Some((SHIELD_MAX, health));
    }

    /// Apply `n` points of damage: shield absorbs first, overflow carries
    /// to health. A lethal result respawns immediately (bypassing the
    /// pending/apply handshake, since it is a local safety action, not one
    /// that awaits peer confirmation); a survivable result is only
    /// proposed as pending.
    pub fn apply_damage(&self, n: u8) {
        let mut vest = self.vest.lock();
        let absorbed = n.min(vest.shield);
        let overflow = n - absorbed;
        let new_shield = vest.shield - absorbed;
        let new_health = vest.health.saturating_sub(overflow);

        if overflow > 0 && new_health == 0 {
            vest.shield = 0;
            vest.health = HEALTH_MAX;
            vest.pending = None;
            warn!("damage would leave health <= 0, respawning");
        } else {
            vest.pending = Some((new_shield, new_health));
            debug!(new_shield, new_health, "damage proposed");
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_full_health_full_magazine() {
        let state = GameState::new();
        let snapshot = state.get_state();
        assert_eq!(snapshot, GameSnapshot::default());
    }

    #[test]
    fn two_phase_apply_without_update_fails_and_is_unchanged() {
        let state = GameState::new();
        assert!(!state.apply_gun_state(3));
        assert_eq!(state.get_remaining_bullets(), MAG_SIZE);

        assert!(!state.apply_vest_state(10, 50));
        assert_eq!(state.get_shield_health(), (SHIELD_MAX, HEALTH_MAX));
    }

    #[test]
    fn gun_update_then_matching_apply_commits() {
        let state = GameState::new();
        state.update_gun_state(Some(5));
        assert!(state.apply_gun_state(5));
        assert_eq!(state.get_remaining_bullets(), 5);
    }

    #[test]
    fn gun_apply_mismatch_is_rejected() {
        let state = GameState::new();
        state.update_gun_state(Some(5));
        assert!(!state.apply_gun_state(4));
        assert_eq!(state.get_remaining_bullets(), MAG_SIZE);
    }

    #[test]
    fn use_bullet_then_peripheral_confirmation_commits() {
        let state = GameState::new();
        assert!(state.use_bullet());
        assert!(state.apply_gun_state(5));
        assert_eq!(state.get_remaining_bullets(), 5);
    }

    #[test]
    fn use_bullet_on_empty_magazine_fails() {
        let state = GameState::from_snapshot(GameSnapshot {
            bullets: 0,
            shield: SHIELD_MAX,
            health: HEALTH_MAX,
        });
        assert!(!state.use_bullet());
    }

    #[test]
    fn vest_update_then_matching_apply_commits() {
        let state = GameState::new();
        state.update_vest_state(Some(20), Some(80));
        assert!(state.apply_vest_state(20, 80));
        assert_eq!(state.get_shield_health(), (20, 80));
    }

    #[test]
    fn vest_apply_with_lethal_health_respawns_instead_of_committing() {
        let state = GameState::new();
        state.update_vest_state(Some(0), Some(0));
        assert!(!state.apply_vest_state(0, 0));
        assert_eq!(state.get_shield_health(), (0, HEALTH_MAX));
    }

    #[test]
    fn respawn_invariant_on_lethal_damage() {
        // Scenario 6: local {shield:10, health:15}; applyDamage(50) ⇒ {0, 100}.
        let state = GameState::from_snapshot(GameSnapshot {
            bullets: MAG_SIZE,
            shield: 10,
            health: 15,
        });
        state.apply_damage(50);
        assert_eq!(state.get_shield_health(), (0, HEALTH_MAX));
        assert_eq!(state.get_state(), GameSnapshot { bullets: MAG_SIZE, shield: 0, health: HEALTH_MAX });
    }

    #[test]
    fn survivable_damage_absorbs_shield_then_health_as_pending() {
        let state = GameState::from_snapshot(GameSnapshot {
            bullets: MAG_SIZE,
            shield: 10,
            health: 100,
        });
        state.apply_damage(15);
        // Not yet committed: getState still reflects the prior current value.
        assert_eq!(state.get_shield_health(), (10, 100));
        // But the proposed values are reachable through a matching apply.
        assert!(state.apply_vest_state(0, 95));
        assert_eq!(state.get_shield_health(), (0, 95));
    }

    #[test]
    fn curr_shot_tracks_remaining_bullets() {
        let state = GameState::new();
        assert_eq!(state.get_curr_shot(), 1);
        state.update_gun_state(Some(3));
        state.apply_gun_state(3);
        assert_eq!(state.get_curr_shot(), MAG_SIZE - 3 + 1);
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player-1.snapshot.json");

        let snapshot = GameSnapshot { bullets: 2, shield: 15, health: 42 };
        snapshot.save(&path).unwrap();

        let loaded = GameSnapshot::load_or_default(&path);
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn missing_snapshot_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert_eq!(GameSnapshot::load_or_default(&path), GameSnapshot::default());
    }
}
