//! Loosely-validated, agent-facing request to start combat.

use crate::ToolSchema;
use serde::{Deserialize, Serialize};

/// Name given to an `EnemySpec` that arrives without one.
pub const UNKNOWN_ENEMY_NAME: &str = "Unknown Enemy";

/// One enemy as described by the controlling agent. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToolSchema)]
pub struct EnemySpec {
    /// Display name of the enemy
    #[serde(default)]
    pub name: Option<String>,
    /// Archetype id or name from the enemy catalog, e.g. "goblin_warrior"
    #[serde(default)]
    pub archetype: Option<String>,
    /// Current hit points
    #[serde(default)]
    pub hp: Option<i32>,
    /// Maximum hit points
    #[serde(default)]
    pub max_hp: Option<i32>,
    /// Armor class
    #[serde(default, alias = "armor_class")]
    pub ac: Option<i32>,
    /// Bonus added to attack rolls and damage
    #[serde(default)]
    pub attack_bonus: Option<i32>,
    /// Bonus added to the initiative roll
    #[serde(default)]
    pub initiative_bonus: Option<i32>,
}

impl EnemySpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_archetype(mut self, archetype: impl Into<String>) -> Self {
        self.archetype = Some(archetype.into());
        self
    }

    pub fn with_hp(mut self, hp: i32) -> Self {
        self.hp = Some(hp);
        self
    }

    pub fn with_ac(mut self, ac: i32) -> Self {
        self.ac = Some(ac);
        self
    }

    pub fn with_attack_bonus(mut self, bonus: i32) -> Self {
        self.attack_bonus = Some(bonus);
        self
    }

    pub fn with_initiative_bonus(mut self, bonus: i32) -> Self {
        self.initiative_bonus = Some(bonus);
        self
    }

    /// The name to display, blank names included.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_ENEMY_NAME)
            .to_string()
    }
}

/// A request to start an encounter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatIntent {
    pub description: Option<String>,
    pub enemies: Vec<EnemySpec>,
}

impl CombatIntent {
    pub fn new(enemies: Vec<EnemySpec>) -> Self {
        Self {
            description: None,
            enemies,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
