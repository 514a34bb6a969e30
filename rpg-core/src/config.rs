//! Tunable defaults for combat resolution.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Defaults applied when an enemy spec or attacker leaves something out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// HP of an NPC with no hp and no resolvable archetype.
    pub default_npc_hp: i32,

    /// Armor class fallback.
    pub default_npc_ac: i32,

    /// Attack bonus fallback.
    pub default_npc_attack_bonus: i32,

    /// Damage expression used by attackers with no weapon.
    pub default_damage: String,

    /// Minimum similarity (exclusive) for a fuzzy target match.
    pub fuzzy_threshold: f64,

    /// Number of log lines included in a combat summary.
    pub log_tail: usize,

    /// Floor on the damage of a successful hit.
    pub minimum_hit_damage: i32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            default_npc_hp: 10,
            default_npc_ac: 10,
            default_npc_attack_bonus: 2,
            default_damage: "1d6".to_string(),
            fuzzy_threshold: 0.4,
            log_tail: 5,
            minimum_hit_damage: 1,
        }
    }
}

impl CombatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Set the default NPC hit points.
    pub fn with_default_npc_hp(mut self, hp: i32) -> Self {
        self.default_npc_hp = hp;
        self
    }

    /// Set the default NPC armor class.
    pub fn with_default_npc_ac(mut self, ac: i32) -> Self {
        self.default_npc_ac = ac;
        self
    }

    /// Set the default NPC attack bonus.
    pub fn with_default_npc_attack_bonus(mut self, bonus: i32) -> Self {
        self.default_npc_attack_bonus = bonus;
        self
    }

    /// Set the unarmed damage expression.
    pub fn with_default_damage(mut self, notation: impl Into<String>) -> Self {
        self.default_damage = notation.into();
        self
    }

    /// Set the fuzzy match threshold.
    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    /// Set how many log lines a summary carries.
    pub fn with_log_tail(mut self, lines: usize) -> Self {
        self.log_tail = lines;
        self
    }

    pub fn with_minimum_hit_damage(mut self, damage: i32) -> Self {
        self.minimum_hit_damage = damage;
        self
    }
}
