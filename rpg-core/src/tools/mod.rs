//! Agent-facing tool surface.
//!
//! Each tool has a typed argument struct whose JSON schema is derived from
//! its doc comments. [`CombatTools`] deserializes incoming calls, runs them
//! against the stored session, and always answers with a JSON payload:
//! either the tool's result or `{"error": "..."}`.

pub mod matching;
pub mod surface;

pub use matching::{resolve_target, similarity};
pub use surface::CombatTools;

use crate::combat::{CombatError, EnemySpec};
use crate::store::StoreError;
use crate::Tool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tool as advertised to the controlling agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Errors from tool calls. Rendered as `{"error": <Display>}`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Game state not found")]
    GameStateNotFound,

    #[error("No active combat found")]
    NoActiveCombat,

    #[error("Combat is already active. End current combat before starting a new one.")]
    CombatAlreadyActive,

    #[error("Could not identify current attacker from turn order.")]
    NoCurrentTurn,

    #[error("No valid targets found (all enemies dead?). check_combat_end might be needed.")]
    NoValidTargets,

    #[error("Could not find target '{name}'. Available: {}", .available.join(", "))]
    TargetNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Combat(#[from] CombatError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// Tool argument structs
// ============================================================================

/// Signals that a fight is breaking out. Use ONLY when the player attacks someone or violence erupts outside combat; start_combat then sets up the encounter.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "declare_combat_start")]
pub struct DeclareCombatStartArgs {
    /// What triggers the fight, e.g. "Three goblins jump from the bushes"
    pub description: String,
}

/// Starts a new combat encounter with the specified enemies. Rolls initiative and adds the player automatically. Missing enemy stats take defaults.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "start_combat")]
pub struct StartCombatArgs {
    /// Enemies to fight. Each needs a name; archetype, hp, ac and attack_bonus are optional
    pub enemies: Vec<EnemySpec>,
    /// Brief narrative description of how the fight starts
    #[serde(default)]
    pub description: Option<String>,
}

/// Executes a weapon attack by the current turn holder against a target by name.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "execute_attack")]
pub struct ExecuteAttackArgs {
    /// Name (or partial name) of the target, e.g. "Goblin"
    pub target_name: String,
    /// Bonus added to the attack roll
    #[serde(default)]
    pub attack_modifier: Option<i32>,
    /// Roll two d20 and keep the higher
    #[serde(default)]
    pub advantage: Option<bool>,
}

/// Applies damage without an attack roll, e.g. from a spell, trap or the environment.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "apply_direct_damage")]
pub struct ApplyDirectDamageArgs {
    /// Combatant id or name of the target
    pub target_id: String,
    /// Damage to apply. Must be positive
    pub amount: i32,
    /// Source of the damage, e.g. "fireball"
    #[serde(default)]
    pub reason: Option<String>,
    /// Whether the damage comes from a standard attack
    #[serde(default)]
    pub is_attack: Option<bool>,
}

/// Restores hit points to a combatant, up to their maximum.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "apply_healing")]
pub struct ApplyHealingArgs {
    /// Name (or partial name) of the combatant to heal
    pub target_name: String,
    /// Hit points to restore. Must be positive
    pub amount: i32,
    /// Source of the healing, e.g. "healing potion"
    #[serde(default)]
    pub reason: Option<String>,
}

/// Ends the current turn and passes it to the next living combatant.
#[derive(Debug, Clone, Default, Tool, Deserialize)]
#[tool(name = "end_turn")]
pub struct EndTurnArgs {}

/// Checks whether one side has been defeated, and closes the combat if so.
#[derive(Debug, Clone, Default, Tool, Deserialize)]
#[tool(name = "check_combat_end")]
pub struct CheckCombatEndArgs {}

/// Ends the combat immediately, e.g. when enemies surrender or the party flees.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "end_combat")]
pub struct EndCombatArgs {
    /// Why the combat ends, e.g. "fled" or "negotiated"
    pub reason: String,
}

/// Reports participants, hit points, turn order and recent events of the current combat.
#[derive(Debug, Clone, Default, Tool, Deserialize)]
#[tool(name = "get_combat_status")]
pub struct GetCombatStatusArgs {}

/// Searches enemy archetypes by id or name. Use the returned id as an enemy's archetype.
#[derive(Debug, Clone, Tool, Deserialize)]
#[tool(name = "search_enemy_archetype")]
pub struct SearchEnemyArchetypeArgs {
    /// Search term, e.g. "goblin"
    pub query: String,
}
