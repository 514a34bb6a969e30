//! Per-session game state, the single source of truth between tool calls.

use crate::character::CharacterId;
use crate::combat::{CombatState, CombatSummary};
use serde::{Deserialize, Serialize};

/// What the session is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Narrative,
    Combat,
}

/// What remains of an encounter once it is detached from the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatRecord {
    /// Outcome or end reason, e.g. "victory" or "fled".
    pub outcome: String,
    /// Final summary, including the tail of the combat log.
    pub summary: CombatSummary,
}

/// Everything persisted for one play session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub session_id: String,
    #[serde(default)]
    pub session_mode: SessionMode,
    /// The session's player character.
    #[serde(default)]
    pub character_id: Option<CharacterId>,
    #[serde(default)]
    pub combat_state: Option<CombatState>,
    #[serde(default)]
    pub last_combat_result: Option<CombatRecord>,
}

impl GameState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            session_mode: SessionMode::Narrative,
            character_id: None,
            combat_state: None,
            last_combat_result: None,
        }
    }

    pub fn with_character(mut self, character_id: CharacterId) -> Self {
        self.character_id = Some(character_id);
        self
    }

    /// The attached combat, if it is still running.
    pub fn active_combat(&self) -> Option<&CombatState> {
        self.combat_state.as_ref().filter(|c| c.is_active)
    }

    /// Attach a freshly started encounter.
    pub fn enter_combat(&mut self, combat: CombatState) {
        self.combat_state = Some(combat);
        self.session_mode = SessionMode::Combat;
    }

    /// Detach the encounter and keep its record for narration.
    pub fn conclude_combat(&mut self, outcome: impl Into<String>, summary: CombatSummary) {
        self.combat_state = None;
        self.session_mode = SessionMode::Narrative;
        self.last_combat_result = Some(CombatRecord {
            outcome: outcome.into(),
            summary,
        });
    }
}
