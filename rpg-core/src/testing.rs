//! Testing utilities for the combat engine.
//!
//! This module provides tools for deterministic testing:
//! - `ScriptedRoller` for exact die faces
//! - `TestHarness` for scripted tool-call scenarios on in-memory stores
//! - `FailingCharacterStore` for persistence failure paths
//! - Assertion helpers for verifying combat state

use crate::catalog::BuiltinCatalog;
use crate::character::{create_sample_hero, Character, CharacterId};
use crate::combat::{CombatState, Combatant};
use crate::config::CombatConfig;
use crate::dice::DiceRoller;
use crate::session::{GameState, SessionMode};
use crate::store::{
    CharacterStore, InMemoryCharacterStore, InMemorySessionStore, SessionStore, StoreError,
};
use crate::tools::CombatTools;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A dice roller that returns queued faces in order.
///
/// Clones share one queue, so a test can keep a handle and keep feeding
/// faces after handing the roller to the code under test.
#[derive(Clone, Default)]
pub struct ScriptedRoller {
    faces: Arc<Mutex<VecDeque<u32>>>,
}

impl ScriptedRoller {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        let roller = Self::default();
        roller.push(faces);
        roller
    }

    /// Queue more faces.
    pub fn push(&self, faces: impl IntoIterator<Item = u32>) {
        self.faces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(faces);
    }

    /// Faces not yet consumed.
    pub fn remaining(&self) -> usize {
        self.faces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DiceRoller for ScriptedRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let next = self
            .faces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(face) => face.clamp(1, sides.max(1)),
            None => {
                tracing::warn!(sides, "scripted roller exhausted, rolling 1");
                1
            }
        }
    }
}

/// A character store whose every operation fails.
pub struct FailingCharacterStore;

#[async_trait]
impl CharacterStore for FailingCharacterStore {
    async fn load(&self, _id: CharacterId) -> Result<Character, StoreError> {
        Err(StoreError::Backend("character store unavailable".to_string()))
    }

    async fn save(&self, _character: &Character) -> Result<(), StoreError> {
        Err(StoreError::Backend("character store unavailable".to_string()))
    }
}

/// Test harness for scripted combat scenarios.
///
/// Wires `CombatTools` to in-memory stores, the built-in catalog and a
/// scripted roller, with a saved hero attached to the session.
pub struct TestHarness {
    pub sessions: Arc<InMemorySessionStore>,
    pub characters: Arc<InMemoryCharacterStore>,
    pub roller: ScriptedRoller,
    pub tools: CombatTools,
    pub hero: Character,
}

impl TestHarness {
    /// Create a harness with the sample hero and default config.
    pub fn new() -> Self {
        Self::with_character(create_sample_hero("Test Hero"))
    }

    /// Create a harness with a custom character.
    pub fn with_character(character: Character) -> Self {
        Self::with_parts(character, CombatConfig::default())
    }

    pub fn with_parts(character: Character, config: CombatConfig) -> Self {
        let sessions = Arc::new(InMemorySessionStore::with_state(
            GameState::new("test-session").with_character(character.id),
        ));
        let characters = Arc::new(InMemoryCharacterStore::with_characters([character.clone()]));
        let roller = ScriptedRoller::default();
        let tools = CombatTools::new(
            sessions.clone(),
            characters.clone(),
            Arc::new(BuiltinCatalog::new()),
            config,
        )
        .with_roller(roller.clone());

        Self {
            sessions,
            characters,
            roller,
            tools,
            hero: character,
        }
    }

    /// Queue die faces for the next rolls.
    pub fn script(&self, faces: impl IntoIterator<Item = u32>) -> &Self {
        self.roller.push(faces);
        self
    }

    /// Call a tool by name.
    pub async fn call(&self, name: &str, input: Value) -> Value {
        self.tools.call(name, input).await
    }

    pub async fn game_state(&self) -> Option<GameState> {
        self.sessions.load_game_state().await.ok().flatten()
    }

    pub async fn combat(&self) -> Option<CombatState> {
        self.game_state().await.and_then(|g| g.combat_state)
    }

    /// The hero as currently persisted.
    pub async fn saved_hero(&self) -> Option<Character> {
        self.characters.load(self.hero.id).await.ok()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a combatant by exact name.
pub fn combatant<'a>(combat: &'a CombatState, name: &str) -> Option<&'a Combatant> {
    combat.participants.iter().find(|c| c.name == name)
}

/// Assert a tool payload is not an error.
#[track_caller]
pub fn assert_tool_ok(payload: &Value) {
    assert!(
        payload.get("error").is_none(),
        "Expected success, got error payload: {payload}"
    );
}

/// Assert a tool payload is an error containing `fragment`.
#[track_caller]
pub fn assert_tool_error(payload: &Value, fragment: &str) {
    let message = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("Expected error payload, got: {payload}"));
    assert!(
        message.contains(fragment),
        "Expected error containing '{fragment}', got '{message}'"
    );
}

/// Assert a combatant's HP.
#[track_caller]
pub fn assert_hp(combat: &CombatState, name: &str, current: i32, max: i32) {
    let found = combatant(combat, name)
        .unwrap_or_else(|| panic!("Expected combatant '{name}' in combat"));
    assert_eq!(
        (found.current_hp, found.max_hp),
        (current, max),
        "Expected {name} HP {current}/{max}, got {}/{}",
        found.current_hp,
        found.max_hp
    );
}

/// Assert the session is in combat.
#[track_caller]
pub fn assert_in_combat(game: &GameState) {
    assert!(
        game.session_mode == SessionMode::Combat && game.active_combat().is_some(),
        "Expected to be in combat"
    );
}

/// Assert the session is NOT in combat.
#[track_caller]
pub fn assert_not_in_combat(game: &GameState) {
    assert!(
        game.session_mode == SessionMode::Narrative && game.combat_state.is_none(),
        "Expected to NOT be in combat"
    );
}
