//! Write-back of combat hit points onto persisted characters.

use crate::character::Character;
use crate::combat::{CombatState, Combatant};
use crate::store::{CharacterStore, StoreError};
use std::sync::Arc;

/// Keeps player character records in step with their combatants.
///
/// Each sync is a load, mutate, save round-trip finished before the
/// enclosing operation returns. Failures are never swallowed.
#[derive(Clone)]
pub struct CharacterSync {
    characters: Arc<dyn CharacterStore>,
}

impl CharacterSync {
    pub fn new(characters: Arc<dyn CharacterStore>) -> Self {
        Self { characters }
    }

    /// Persist one combatant's HP. NPCs are transient and skipped.
    ///
    /// Returns the updated character for player combatants.
    pub async fn sync_combatant(
        &self,
        combatant: &Combatant,
    ) -> Result<Option<Character>, StoreError> {
        let Some(character_id) = combatant.character_id() else {
            return Ok(None);
        };

        let mut character = self.characters.load(character_id).await?;
        character
            .combat_stats
            .set_hit_points(combatant.current_hp);
        self.characters.save(&character).await?;

        tracing::debug!(
            character = %character.name,
            hp = character.combat_stats.current_hit_points,
            "synced character hit points"
        );
        Ok(Some(character))
    }

    /// Persist every player combatant in the encounter.
    pub async fn sync_players(&self, state: &CombatState) -> Result<usize, StoreError> {
        let mut synced = 0;
        for combatant in &state.participants {
            if self.sync_combatant(combatant).await?.is_some() {
                synced += 1;
            }
        }
        Ok(synced)
    }
}
