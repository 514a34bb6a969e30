//! Combat value objects: combatants, the encounter snapshot and attack results.

use crate::character::{CharacterId, Weapon};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier of a combatant within one encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Combatants
// ============================================================================

/// Which side a combatant fights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CombatantKind {
    Player,
    Npc,
}

impl CombatantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombatantKind::Player => "PLAYER",
            CombatantKind::Npc => "NPC",
        }
    }
}

impl fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transient sheet of a generated NPC. Lives and dies with the encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    /// Catalog archetype the NPC was built from, if any resolved.
    pub archetype: Option<String>,
    pub equipment: Vec<Weapon>,
}

/// Where a combatant comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombatantSource {
    /// Refers to a persisted character; HP is written back to it.
    Player { character_id: CharacterId },
    /// Owns its NPC sheet.
    Npc(Npc),
}

/// A participant in an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub current_hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub attack_bonus: i32,
    pub initiative_bonus: i32,
    /// Total initiative rolled at combat start.
    pub initiative: i32,
    /// Wielded weapon; `None` attacks with the configured default damage.
    pub weapon: Option<Weapon>,
    pub source: CombatantSource,
}

impl Combatant {
    pub fn kind(&self) -> CombatantKind {
        match self.source {
            CombatantSource::Player { .. } => CombatantKind::Player,
            CombatantSource::Npc(_) => CombatantKind::Npc,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.current_hp > 0
    }

    /// The persisted character behind a player combatant.
    pub fn character_id(&self) -> Option<CharacterId> {
        match self.source {
            CombatantSource::Player { character_id } => Some(character_id),
            CombatantSource::Npc(_) => None,
        }
    }

    /// Set current HP, clamped into `[0, max_hp]`.
    pub fn set_hp(&mut self, hp: i32) {
        self.current_hp = hp.clamp(0, self.max_hp.max(0));
    }
}

// ============================================================================
// Combat State
// ============================================================================

/// Full snapshot of one encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    pub id: Uuid,
    /// Location or situation the encounter started in.
    pub description: String,
    pub participants: Vec<Combatant>,
    /// Participant ids by descending initiative. Fixed at start.
    pub turn_order: Vec<CombatantId>,
    /// Index into `turn_order` of whoever is acting.
    pub turn_index: usize,
    pub round_number: u32,
    pub is_active: bool,
    /// Append-only narrative of what happened.
    pub log: Vec<String>,
}

impl CombatState {
    pub fn get(&self, id: CombatantId) -> Option<&Combatant> {
        self.participants.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.participants.iter_mut().find(|c| c.id == id)
    }

    pub fn current_turn_id(&self) -> Option<CombatantId> {
        self.turn_order.get(self.turn_index).copied()
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.current_turn_id().and_then(|id| self.get(id))
    }

    /// The player combatant, if one joined.
    pub fn player(&self) -> Option<&Combatant> {
        self.participants
            .iter()
            .find(|c| c.kind() == CombatantKind::Player)
    }

    pub fn has_character(&self, character_id: CharacterId) -> bool {
        self.participants
            .iter()
            .any(|c| c.character_id() == Some(character_id))
    }

    /// Living combatants of the given kind.
    pub fn living(&self, kind: CombatantKind) -> impl Iterator<Item = &Combatant> {
        self.participants
            .iter()
            .filter(move |c| c.kind() == kind && c.is_alive())
    }

    pub fn any_alive(&self) -> bool {
        self.participants.iter().any(Combatant::is_alive)
    }

    pub fn push_log(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!(combat_id = %self.id, entry = %entry, "combat log");
        self.log.push(entry);
    }

    /// The last `n` log entries, oldest first.
    pub fn log_tail(&self, n: usize) -> &[String] {
        let start = self.log.len().saturating_sub(n);
        &self.log[start..]
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a single attack. Target HP has already been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attacker_id: CombatantId,
    pub attacker_name: String,
    pub target_id: CombatantId,
    pub target_name: String,
    pub weapon: String,
    pub hit: bool,
    pub critical: bool,
    /// The d20 face that counted.
    pub natural_roll: u32,
    /// Every d20 rolled; two with advantage.
    pub d20_rolls: Vec<u32>,
    pub attack_total: i32,
    pub target_ac: i32,
    pub damage: i32,
    pub target_hp: i32,
    pub target_max_hp: i32,
    /// The attack dropped the target to 0.
    pub is_fatal: bool,
    pub message: String,
}

/// How an encounter concluded on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatOutcome {
    Victory,
    Defeat,
    Draw,
}

impl CombatOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombatOutcome::Victory => "victory",
            CombatOutcome::Defeat => "defeat",
            CombatOutcome::Draw => "draw",
        }
    }
}

impl fmt::Display for CombatOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
