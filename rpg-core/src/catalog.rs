//! Enemy archetypes and their equipment.
//!
//! The catalog is consulted when an `EnemySpec` names an archetype. Lookups
//! never fail loudly: an unknown archetype simply resolves to `None` and the
//! engine falls back to configured defaults.

use crate::character::Weapon;
use crate::dice::DiceRoller;
use serde::{Deserialize, Serialize};

/// Identifier of the weapon handed to creatures with nothing better.
pub const NATURAL_WEAPON_ID: &str = "weapon_natural";

/// One equipment slot of an archetype's default loadout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoadoutSlot {
    /// Always this weapon.
    Fixed(String),
    /// One of these, picked at random per encounter.
    OneOf(Vec<String>),
}

/// A named template for generating NPC combatants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub max_hp: i32,
    pub armor_class: i32,
    pub attack_bonus: i32,
    #[serde(default)]
    pub initiative_bonus: i32,
    #[serde(default)]
    pub loadout: Vec<LoadoutSlot>,
}

/// What `search` reports for each match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&Archetype> for ArchetypeSummary {
    fn from(archetype: &Archetype) -> Self {
        Self {
            id: archetype.id.clone(),
            name: archetype.name.clone(),
            description: archetype.description.clone(),
        }
    }
}

/// Lookup interface for archetypes and weapons.
pub trait ArchetypeCatalog: Send + Sync {
    /// Resolve a free-form archetype reference.
    fn resolve(&self, reference: &str) -> Option<Archetype>;

    /// Case-insensitive containment search over ids and names.
    fn search(&self, query: &str) -> Vec<ArchetypeSummary>;

    /// Look up a weapon by id.
    fn weapon(&self, id: &str) -> Option<Weapon>;
}

impl Archetype {
    /// Roll this archetype's loadout into concrete weapons.
    ///
    /// Unknown weapon ids are skipped. If nothing remains, the catalog's
    /// natural weapon is used.
    pub fn equip(&self, catalog: &dyn ArchetypeCatalog, roller: &mut dyn DiceRoller) -> Vec<Weapon> {
        let mut weapons = Vec::new();
        for slot in &self.loadout {
            let id = match slot {
                LoadoutSlot::Fixed(id) => Some(id),
                LoadoutSlot::OneOf(choices) if choices.is_empty() => None,
                LoadoutSlot::OneOf(choices) => {
                    let pick = roller.roll_die(choices.len() as u32) as usize;
                    choices.get(pick.saturating_sub(1))
                }
            };
            match id.and_then(|id| catalog.weapon(id)) {
                Some(weapon) => weapons.push(weapon),
                None => tracing::debug!(archetype = %self.id, ?slot, "skipping unknown loadout entry"),
            }
        }

        if weapons.is_empty() {
            weapons.extend(catalog.weapon(NATURAL_WEAPON_ID));
        }
        weapons
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['_', '-'], " ")
}

// ============================================================================
// Built-in tables
// ============================================================================

fn slot(id: &str) -> LoadoutSlot {
    LoadoutSlot::Fixed(id.to_string())
}

fn one_of(ids: &[&str]) -> LoadoutSlot {
    LoadoutSlot::OneOf(ids.iter().map(|id| id.to_string()).collect())
}

#[allow(clippy::too_many_arguments)]
fn archetype(
    id: &str,
    name: &str,
    description: &str,
    max_hp: i32,
    armor_class: i32,
    attack_bonus: i32,
    initiative_bonus: i32,
    loadout: Vec<LoadoutSlot>,
) -> Archetype {
    Archetype {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        max_hp,
        armor_class,
        attack_bonus,
        initiative_bonus,
        loadout,
    }
}

lazy_static::lazy_static! {
    /// Weapons known to the built-in catalog.
    pub static ref WEAPONS: Vec<Weapon> = vec![
        Weapon::new(NATURAL_WEAPON_ID, "Natural Weapons", "1d4"),
        Weapon::new("weapon_club", "Club", "1d4"),
        Weapon::new("weapon_dagger", "Dagger", "1d4"),
        Weapon::new("weapon_scimitar", "Scimitar", "1d6"),
        Weapon::new("weapon_shortsword", "Shortsword", "1d6"),
        Weapon::new("weapon_shortbow", "Shortbow", "1d6"),
        Weapon::new("weapon_spear", "Spear", "1d6"),
        Weapon::new("weapon_mace", "Mace", "1d6"),
        Weapon::new("weapon_longsword", "Longsword", "1d8"),
        Weapon::new("weapon_greataxe", "Greataxe", "1d12"),
        Weapon::new("weapon_bite_wolf", "Bite", "2d4"),
        Weapon::new("weapon_bite_spider", "Venomous Bite", "1d8"),
        Weapon::new("weapon_sickle", "Ritual Sickle", "1d4"),
    ];

    /// Archetypes known to the built-in catalog.
    pub static ref ARCHETYPES: Vec<Archetype> = vec![
        archetype(
            "goblin_warrior",
            "Goblin Warrior",
            "A small, vicious humanoid that fights in packs.",
            7, 15, 4, 2,
            vec![one_of(&["weapon_scimitar", "weapon_shortsword"])],
        ),
        archetype(
            "goblin_archer",
            "Goblin Archer",
            "A goblin skirmisher that prefers to shoot from cover.",
            7, 13, 4, 2,
            vec![slot("weapon_shortbow"), slot("weapon_dagger")],
        ),
        archetype(
            "orc_raider",
            "Orc Raider",
            "A hulking marauder driven by fury.",
            15, 13, 5, 1,
            vec![one_of(&["weapon_greataxe", "weapon_spear"])],
        ),
        archetype(
            "wolf",
            "Wolf",
            "A cunning predator that hunts with its pack.",
            11, 13, 4, 2,
            vec![slot("weapon_bite_wolf")],
        ),
        archetype(
            "bandit",
            "Bandit",
            "A desperate outlaw preying on travelers.",
            11, 12, 3, 1,
            vec![one_of(&["weapon_scimitar", "weapon_mace", "weapon_club"])],
        ),
        archetype(
            "skeleton",
            "Skeleton",
            "Animated bones bound to an ancient command.",
            13, 13, 4, 2,
            vec![slot("weapon_shortsword")],
        ),
        archetype(
            "giant_spider",
            "Giant Spider",
            "A horse-sized spider lurking in webbed lairs.",
            26, 14, 5, 3,
            vec![slot("weapon_bite_spider")],
        ),
        archetype(
            "cultist",
            "Cultist",
            "A zealot sworn to a dark power.",
            9, 12, 3, 1,
            vec![one_of(&["weapon_sickle", "weapon_dagger"])],
        ),
    ];
}

/// Catalog backed by in-memory tables, the built-in ones by default.
#[derive(Debug, Clone)]
pub struct BuiltinCatalog {
    archetypes: Vec<Archetype>,
    weapons: Vec<Weapon>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self {
            archetypes: ARCHETYPES.clone(),
            weapons: WEAPONS.clone(),
        }
    }

    /// A catalog over caller-supplied tables.
    pub fn with_entries(archetypes: Vec<Archetype>, weapons: Vec<Weapon>) -> Self {
        Self {
            archetypes,
            weapons,
        }
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeCatalog for BuiltinCatalog {
    fn resolve(&self, reference: &str) -> Option<Archetype> {
        let wanted = normalize(reference);
        if wanted.is_empty() {
            return None;
        }

        // Exact id or name first, then an entry named inside the reference
        // ("goblin warrior scout"), then the reference inside an entry ("orc").
        let by_exact = || {
            self.archetypes
                .iter()
                .find(|a| normalize(&a.id) == wanted || normalize(&a.name) == wanted)
        };
        let by_entry_in_reference = || {
            self.archetypes
                .iter()
                .find(|a| wanted.contains(&normalize(&a.id)) || wanted.contains(&normalize(&a.name)))
        };
        let by_reference_in_entry = || {
            self.archetypes
                .iter()
                .find(|a| normalize(&a.id).contains(&wanted) || normalize(&a.name).contains(&wanted))
        };

        by_exact()
            .or_else(by_entry_in_reference)
            .or_else(by_reference_in_entry)
            .cloned()
    }

    fn search(&self, query: &str) -> Vec<ArchetypeSummary> {
        let query = query.trim().to_lowercase();
        self.archetypes
            .iter()
            .filter(|a| {
                a.id.to_lowercase().contains(&query) || a.name.to_lowercase().contains(&query)
            })
            .map(ArchetypeSummary::from)
            .collect()
    }

    fn weapon(&self, id: &str) -> Option<Weapon> {
        let id_lower = id.to_lowercase();
        self.weapons
            .iter()
            .find(|w| w.id.to_lowercase() == id_lower || w.name.to_lowercase() == id_lower)
            .cloned()
    }
}
