//! Storage interfaces for session and character state.
//!
//! The engine never holds state between calls; every tool invocation loads
//! through these traits, mutates, and writes back. Locking across concurrent
//! requests for one session is the store's business.
//!
//! Two reference backends are provided: in-memory (tests, local runs) and
//! JSON files on disk.

use crate::character::{Character, CharacterId};
use crate::session::GameState;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Game state storage scoped to one session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session's game state, `None` if it was never saved.
    async fn load_game_state(&self) -> Result<Option<GameState>, StoreError>;

    /// Replace the session's game state.
    async fn update_game_state(&self, state: &GameState) -> Result<(), StoreError>;
}

/// Persistent character records.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn load(&self, id: CharacterId) -> Result<Character, StoreError>;

    async fn save(&self, character: &Character) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory backends
// ============================================================================

/// In-memory session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    state: RwLock<Option<GameState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: GameState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_game_state(&self) -> Result<Option<GameState>, StoreError> {
        Ok(self.state.read().await.clone())
    }

    async fn update_game_state(&self, state: &GameState) -> Result<(), StoreError> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }
}

/// In-memory character store.
#[derive(Default)]
pub struct InMemoryCharacterStore {
    characters: RwLock<HashMap<CharacterId, Character>>,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        Self {
            characters: RwLock::new(characters.into_iter().map(|c| (c.id, c)).collect()),
        }
    }
}

#[async_trait]
impl CharacterStore for InMemoryCharacterStore {
    async fn load(&self, id: CharacterId) -> Result<Character, StoreError> {
        self.characters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::CharacterNotFound(id))
    }

    async fn save(&self, character: &Character) -> Result<(), StoreError> {
        self.characters
            .write()
            .await
            .insert(character.id, character.clone());
        Ok(())
    }
}

// ============================================================================
// JSON file backends
// ============================================================================

/// Versioned envelope around everything written to disk.
#[derive(Serialize, Deserialize)]
struct SaveFile<T> {
    version: u32,
    data: T,
}

async fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(&SaveFile {
        version: SAVE_VERSION,
        data,
    })?;

    // Write then rename so a crash never leaves a half-written file.
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json).await?;
    fs::rename(&temp_path, path).await?;

    tracing::debug!("Saved {}", path.display());
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let json = match fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let saved: SaveFile<T> = serde_json::from_str(&json)?;
    if saved.version != SAVE_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: SAVE_VERSION,
            found: saved.version,
        });
    }

    tracing::debug!("Loaded {}", path.display());
    Ok(Some(saved.data))
}

/// Session store keeping one JSON file per session.
pub struct JsonSessionStore {
    path: PathBuf,
}

impl JsonSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn load_game_state(&self) -> Result<Option<GameState>, StoreError> {
        read_json(&self.path).await
    }

    async fn update_game_state(&self, state: &GameState) -> Result<(), StoreError> {
        write_json(&self.path, state).await
    }
}

/// Character store keeping `<id>.json` files in a directory.
pub struct JsonCharacterStore {
    dir: PathBuf,
}

impl JsonCharacterStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn character_path(&self, id: CharacterId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl CharacterStore for JsonCharacterStore {
    async fn load(&self, id: CharacterId) -> Result<Character, StoreError> {
        read_json(&self.character_path(id))
            .await?
            .ok_or(StoreError::CharacterNotFound(id))
    }

    async fn save(&self, character: &Character) -> Result<(), StoreError> {
        write_json(&self.character_path(character.id), character).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::create_sample_hero;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rpg-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_in_memory_session_store() {
        let store = InMemorySessionStore::new();
        assert!(store.load_game_state().await.unwrap().is_none());

        store
            .update_game_state(&GameState::new("s1"))
            .await
            .unwrap();
        let loaded = store.load_game_state().await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
    }

    #[tokio::test]
    async fn test_in_memory_character_missing() {
        let store = InMemoryCharacterStore::new();
        let id = CharacterId::new();
        assert!(matches!(
            store.load(id).await,
            Err(StoreError::CharacterNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_json_character_store() {
        let dir = temp_dir();
        let store = JsonCharacterStore::new(&dir);
        let mut hero = create_sample_hero("Aria");
        hero.combat_stats.set_hit_points(11);

        store.save(&hero).await.unwrap();
        let loaded = store.load(hero.id).await.unwrap();
        assert_eq!(loaded, hero);

        assert!(matches!(
            store.load(CharacterId::new()).await,
            Err(StoreError::CharacterNotFound(_))
        ));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_json_session_store() {
        let dir = temp_dir();
        let store = JsonSessionStore::new(dir.join("session.json"));
        assert!(store.load_game_state().await.unwrap().is_none());

        let state = GameState::new("s2").with_character(CharacterId::new());
        store.update_game_state(&state).await.unwrap();
        assert_eq!(store.load_game_state().await.unwrap(), Some(state));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = temp_dir();
        let path = dir.join("old.json");
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(&path, r#"{"version": 99, "data": {"session_id": "x"}}"#)
            .await
            .unwrap();

        let store = JsonSessionStore::new(&path);
        assert!(matches!(
            store.load_game_state().await,
            Err(StoreError::VersionMismatch {
                expected: 1,
                found: 99
            })
        ));

        let _ = fs::remove_dir_all(&dir).await;
    }
}
