//! Stable, agent-facing view of an encounter.

use super::state::{CombatState, Combatant, CombatantId, CombatantKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the participant table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub id: CombatantId,
    pub name: String,
    pub kind: CombatantKind,
    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub is_alive: bool,
}

impl From<&Combatant> for ParticipantSummary {
    fn from(c: &Combatant) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            kind: c.kind(),
            hp: c.current_hp,
            max_hp: c.max_hp,
            armor_class: c.armor_class,
            is_alive: c.is_alive(),
        }
    }
}

/// Snapshot of an encounter as reported to the controlling agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSummary {
    pub combat_id: Uuid,
    pub description: String,
    pub round: u32,
    pub is_active: bool,
    /// `"ongoing"` or `"ended"`.
    pub status: String,
    pub participants: Vec<ParticipantSummary>,
    /// Names in initiative order.
    pub turn_order: Vec<String>,
    pub current_turn: Option<String>,
    pub current_turn_id: Option<CombatantId>,
    /// Most recent log entries, oldest first.
    pub log: Vec<String>,
}

impl CombatSummary {
    pub fn from_state(state: &CombatState, log_tail: usize) -> Self {
        let turn_order = state
            .turn_order
            .iter()
            .filter_map(|id| state.get(*id))
            .map(|c| c.name.clone())
            .collect();
        let current = state.current_combatant();

        Self {
            combat_id: state.id,
            description: state.description.clone(),
            round: state.round_number,
            is_active: state.is_active,
            status: if state.is_active { "ongoing" } else { "ended" }.to_string(),
            participants: state.participants.iter().map(ParticipantSummary::from).collect(),
            turn_order,
            current_turn: current.map(|c| c.name.clone()),
            current_turn_id: current.map(|c| c.id),
            log: state.log_tail(log_tail).to_vec(),
        }
    }
}
