//! Rules-adjudication core for a text-driven RPG.
//!
//! This crate provides:
//! - A turn-based combat engine (initiative, attacks, damage, turn order, end detection)
//! - Hit point write-back onto persisted character records
//! - An enemy archetype catalog with default loadouts
//! - A tool surface for an external language-model controller
//!
//! The engine keeps no state between calls. Each tool invocation loads the
//! session's `GameState`, mutates its combat, and saves it back.
//!
//! # Quick Start
//!
//! ```ignore
//! use rpg_core::{BuiltinCatalog, CombatConfig, CombatTools, GameState};
//! use rpg_core::store::{InMemoryCharacterStore, InMemorySessionStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tools = CombatTools::new(
//!         Arc::new(InMemorySessionStore::with_state(GameState::new("s1"))),
//!         Arc::new(InMemoryCharacterStore::new()),
//!         Arc::new(BuiltinCatalog::new()),
//!         CombatConfig::default(),
//!     );
//!
//!     let summary = tools
//!         .call("start_combat", json!({"enemies": [{"name": "Goblin", "archetype": "goblin_warrior"}]}))
//!         .await;
//!     println!("{summary}");
//! }
//! ```

pub mod catalog;
pub mod character;
pub mod combat;
pub mod config;
pub mod dice;
pub mod session;
pub mod store;
pub mod sync;
pub mod testing;
pub mod tools;

// Re-export for convenience
pub use rpg_macros::{Tool, ToolSchema};

// Primary public API
pub use catalog::{Archetype, ArchetypeCatalog, BuiltinCatalog};
pub use character::{Character, CharacterId, CombatStats, Weapon};
pub use combat::{CombatEngine, CombatError, CombatIntent, CombatState, EnemySpec};
pub use config::CombatConfig;
pub use dice::{DiceRoller, RandomRoller};
pub use session::{GameState, SessionMode};
pub use store::{CharacterStore, SessionStore, StoreError};
pub use testing::{ScriptedRoller, TestHarness};
pub use tools::{CombatTools, ToolDefinition, ToolError};
