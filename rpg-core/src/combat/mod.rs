//! Turn-based combat: data model, engine and summaries.
//!
//! The engine is stateless between calls. Every operation takes the
//! [`CombatState`] loaded by the caller, mutates it, and leaves saving to
//! the caller.

pub mod engine;
pub mod intent;
pub mod state;
pub mod summary;

pub use engine::{AttackOptions, CombatEngine, DamageSource};
pub use intent::{CombatIntent, EnemySpec};
pub use state::{
    AttackResult, CombatOutcome, CombatState, Combatant, CombatantId, CombatantKind,
    CombatantSource, Npc,
};
pub use summary::{CombatSummary, ParticipantSummary};

use crate::store::StoreError;
use thiserror::Error;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum CombatError {
    #[error("Cannot start combat without any enemies")]
    NoEnemies,

    #[error("Combatant not found: {0}")]
    CombatantNotFound(CombatantId),

    #[error("Invalid combatant: {0}")]
    InvalidCombatant(String),

    #[error("Combat is not active")]
    NotActive,

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}
