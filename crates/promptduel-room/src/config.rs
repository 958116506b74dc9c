//! Room and engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DuelError;

/// Smallest allowed `min_players`. A duel needs an opponent.
pub const MIN_PLAYERS_FLOOR: usize = 2;

/// Largest allowed `max_players`.
pub const MAX_PLAYERS_CEILING: usize = 10;

// ---------------------------------------------------------------------------
// DuelConfig
// ---------------------------------------------------------------------------

/// Per-room settings chosen by the creator. Fixed once the room exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelConfig {
    /// Number of questions drawn for the room.
    pub item_count: usize,

    /// Participants required before the duel may start.
    pub min_players: usize,

    /// Participant capacity. Reaching it starts the duel immediately.
    pub max_players: usize,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            item_count: 5,
            min_players: 2,
            max_players: 4,
        }
    }
}

impl DuelConfig {
    /// Checks `2 <= min_players <= max_players <= 10` and `item_count > 0`.
    ///
    /// # Errors
    /// Returns [`DuelError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<(), DuelError> {
        if self.item_count == 0 {
            return Err(DuelError::InvalidConfig(
                "item_count must be at least 1".into(),
            ));
        }
        if self.min_players < MIN_PLAYERS_FLOOR {
            return Err(DuelError::InvalidConfig(format!(
                "min_players must be at least {MIN_PLAYERS_FLOOR}, got {}",
                self.min_players
            )));
        }
        if self.max_players > MAX_PLAYERS_CEILING {
            return Err(DuelError::InvalidConfig(format!(
                "max_players must be at most {MAX_PLAYERS_CEILING}, got {}",
                self.max_players
            )));
        }
        if self.min_players > self.max_players {
            return Err(DuelError::InvalidConfig(format!(
                "min_players ({}) exceeds max_players ({})",
                self.min_players, self.max_players
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Settings of the lifecycle engine itself, shared by every room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Read-compute-write attempts before giving up with
    /// [`DuelError::TransientConflict`].
    pub max_retries: u32,

    /// How long an active duel may run before the sweep completes it.
    pub duel_duration: Duration,

    /// How long a room may sit in its lobby before the sweep starts it
    /// (enough players) or abandons it (not enough).
    pub lobby_timeout: Duration,

    /// How long a completed or abandoned room stays readable (final
    /// standings included) before the sweep removes it from the store.
    pub archive_retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            duel_duration: Duration::from_secs(10 * 60),
            lobby_timeout: Duration::from_secs(5 * 60),
            archive_retention: Duration::from_secs(60 * 60),
        }
    }
}
