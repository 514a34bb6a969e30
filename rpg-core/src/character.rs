//! Persistent character records.
//!
//! A [`Character`] outlives any single encounter. Combat reads its stats at
//! start and writes hit points back through [`crate::sync::CharacterSync`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Equipment
// ============================================================================

/// A weapon as the engine sees it: a name and a damage expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    /// Catalog identifier, e.g. `"weapon_scimitar"`.
    pub id: String,
    pub name: String,
    /// Damage notation, e.g. `"1d6"`.
    pub damage: String,
}

impl Weapon {
    pub fn new(id: impl Into<String>, name: impl Into<String>, damage: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            damage: damage.into(),
        }
    }
}

// ============================================================================
// Character
// ============================================================================

/// Combat-relevant numbers on a character sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub current_hit_points: i32,
    pub max_hit_points: i32,
    pub armor_class: i32,
    pub attack_bonus: i32,
}

impl CombatStats {
    pub fn new(max_hit_points: i32, armor_class: i32, attack_bonus: i32) -> Self {
        Self {
            current_hit_points: max_hit_points,
            max_hit_points,
            armor_class,
            attack_bonus,
        }
    }

    /// Set current HP, clamped into `[0, max]`.
    pub fn set_hit_points(&mut self, hp: i32) {
        self.current_hit_points = hp.clamp(0, self.max_hit_points.max(0));
    }

    pub fn is_alive(&self) -> bool {
        self.current_hit_points > 0
    }
}

/// A persistent player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub combat_stats: CombatStats,
    #[serde(default)]
    pub initiative_bonus: i32,
    /// Carried weapons; the first one is wielded.
    #[serde(default)]
    pub equipment: Vec<Weapon>,
}

impl Character {
    pub fn new(name: impl Into<String>, combat_stats: CombatStats) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            combat_stats,
            initiative_bonus: 0,
            equipment: Vec::new(),
        }
    }

    pub fn with_initiative_bonus(mut self, bonus: i32) -> Self {
        self.initiative_bonus = bonus;
        self
    }

    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.equipment.push(weapon);
        self
    }

    pub fn wielded_weapon(&self) -> Option<&Weapon> {
        self.equipment.first()
    }
}

/// A ready-made fighter for demos and tests: 20/20 HP, AC 15, +4 to hit, longsword.
pub fn create_sample_hero(name: &str) -> Character {
    Character::new(name, CombatStats::new(20, 15, 4))
        .with_initiative_bonus(2)
        .with_weapon(Weapon::new("weapon_longsword", "Longsword", "1d8"))
}
