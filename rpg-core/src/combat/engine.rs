//! Combat state transitions.
//!
//! Each operation works on a caller-loaded [`CombatState`]. Operations that
//! change a player's hit points write them back through [`CharacterSync`]
//! before returning, so HP survives even if combat never formally ends.

use super::intent::{CombatIntent, EnemySpec};
use super::state::{
    AttackResult, CombatOutcome, CombatState, Combatant, CombatantId, CombatantKind,
    CombatantSource, Npc,
};
use super::summary::CombatSummary;
use super::CombatError;
use crate::catalog::ArchetypeCatalog;
use crate::character::Character;
use crate::config::CombatConfig;
use crate::dice::{roll_d20, DiceExpression, DiceRoller, DiceTerm, DieType};
use crate::sync::CharacterSync;
use std::sync::Arc;
use uuid::Uuid;

/// Situational inputs to a single attack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttackOptions {
    /// Flat bonus added to the attack roll only.
    pub attack_modifier: i32,
    pub advantage: bool,
}

/// Where direct damage came from. Only affects the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DamageSource {
    Attack,
    Effect(Option<String>),
}

impl DamageSource {
    fn label(&self) -> &str {
        match self {
            DamageSource::Attack => "Attack",
            DamageSource::Effect(Some(reason)) if !reason.trim().is_empty() => reason.trim(),
            DamageSource::Effect(_) => "Effect",
        }
    }
}

/// The combat rules engine.
pub struct CombatEngine {
    config: CombatConfig,
    catalog: Arc<dyn ArchetypeCatalog>,
    sync: CharacterSync,
}

impl CombatEngine {
    pub fn new(config: CombatConfig, catalog: Arc<dyn ArchetypeCatalog>, sync: CharacterSync) -> Self {
        Self {
            config,
            catalog,
            sync,
        }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    pub fn catalog(&self) -> &dyn ArchetypeCatalog {
        self.catalog.as_ref()
    }

    // ========================================================================
    // Start
    // ========================================================================

    /// Build a new encounter from an intent.
    ///
    /// Enemies join in intent order, then the player (if any). Malformed enemy
    /// entries are defaulted, never rejected; only an empty enemy list fails.
    pub fn start(
        &self,
        intent: &CombatIntent,
        player: Option<&Character>,
        roller: &mut dyn DiceRoller,
    ) -> Result<CombatState, CombatError> {
        if intent.enemies.is_empty() {
            return Err(CombatError::NoEnemies);
        }

        let mut participants: Vec<Combatant> = intent
            .enemies
            .iter()
            .map(|spec| self.build_npc(spec, roller))
            .collect();
        if let Some(character) = player {
            participants.push(player_combatant(character));
        }

        let description = intent
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("Combat encounter")
            .to_string();

        let mut state = CombatState {
            id: Uuid::new_v4(),
            description,
            participants,
            turn_order: Vec::new(),
            turn_index: 0,
            round_number: 1,
            is_active: true,
            log: Vec::new(),
        };

        let names: Vec<&str> = state
            .living(CombatantKind::Npc)
            .map(|c| c.name.as_str())
            .collect();
        let opening = format!(
            "Combat started: {}. Enemies: {}.",
            state.description,
            names.join(", ")
        );
        state.push_log(opening);

        self.roll_initiative(&mut state, roller);

        state.turn_index = state
            .turn_order
            .iter()
            .position(|id| state.get(*id).is_some_and(Combatant::is_alive))
            .unwrap_or(0);
        if let Some(first) = state.current_combatant() {
            let entry = format!("It is now {}'s turn.", first.name);
            state.push_log(entry);
        }

        tracing::info!(
            combat_id = %state.id,
            participants = state.participants.len(),
            "combat started"
        );
        Ok(state)
    }

    /// Add the player to an encounter that lacks them. Returns whether they joined.
    ///
    /// The newcomer acts last in the existing order.
    pub fn ensure_player_present(&self, state: &mut CombatState, character: &Character) -> bool {
        if state.has_character(character.id) {
            return false;
        }

        let combatant = player_combatant(character);
        let entry = format!("{} joins the fight.", combatant.name);
        state.turn_order.push(combatant.id);
        state.participants.push(combatant);
        state.push_log(entry);
        true
    }

    /// Translate one `EnemySpec` into an NPC combatant.
    ///
    /// Stats come from the enemy entry, then the archetype, then configured defaults.
    fn build_npc(&self, spec: &EnemySpec, roller: &mut dyn DiceRoller) -> Combatant {
        let name = spec.display_name();
        let archetype = spec.archetype.as_deref().and_then(|reference| {
            let resolved = self.catalog.resolve(reference);
            if resolved.is_none() {
                tracing::debug!(archetype = reference, enemy = %name, "archetype not found, using defaults");
            }
            resolved
        });

        let max_hp = spec
            .max_hp
            .or(spec.hp)
            .or(archetype.as_ref().map(|a| a.max_hp))
            .unwrap_or(self.config.default_npc_hp)
            .max(1);
        let current_hp = spec.hp.unwrap_or(max_hp).clamp(1, max_hp);
        let armor_class = spec
            .ac
            .or(archetype.as_ref().map(|a| a.armor_class))
            .unwrap_or(self.config.default_npc_ac);
        let attack_bonus = spec
            .attack_bonus
            .or(archetype.as_ref().map(|a| a.attack_bonus))
            .unwrap_or(self.config.default_npc_attack_bonus);
        let initiative_bonus = spec
            .initiative_bonus
            .or(archetype.as_ref().map(|a| a.initiative_bonus))
            .unwrap_or(0);

        let equipment = match &archetype {
            Some(a) => a.equip(self.catalog.as_ref(), roller),
            None => Vec::new(),
        };

        Combatant {
            id: CombatantId::new(),
            name,
            current_hp,
            max_hp,
            armor_class,
            attack_bonus,
            initiative_bonus,
            initiative: 0,
            weapon: equipment.first().cloned(),
            source: CombatantSource::Npc(Npc {
                archetype: archetype.map(|a| a.id),
                equipment,
            }),
        }
    }

    /// Roll `1d20 + bonus` for everyone and fix the turn order.
    ///
    /// Ties keep participant order.
    fn roll_initiative(&self, state: &mut CombatState, roller: &mut dyn DiceRoller) {
        let mut entries = Vec::with_capacity(state.participants.len());
        for combatant in &mut state.participants {
            let d20 = roller.roll_die(20) as i32;
            combatant.initiative = d20.saturating_add(combatant.initiative_bonus);
            entries.push(format!(
                "{} rolled {} ({}{}) for initiative.",
                combatant.name,
                combatant.initiative,
                d20,
                signed(combatant.initiative_bonus)
            ));
        }
        for entry in entries {
            state.push_log(entry);
        }

        let mut order: Vec<&Combatant> = state.participants.iter().collect();
        order.sort_by(|a, b| b.initiative.cmp(&a.initiative));
        state.turn_order = order.into_iter().map(|c| c.id).collect();
    }

    // ========================================================================
    // Attacks and hit points
    // ========================================================================

    /// Resolve one attack and apply its damage to the target.
    pub async fn execute_attack(
        &self,
        state: &mut CombatState,
        attacker_id: CombatantId,
        target_id: CombatantId,
        options: AttackOptions,
        roller: &mut dyn DiceRoller,
    ) -> Result<AttackResult, CombatError> {
        if !state.is_active {
            return Err(CombatError::NotActive);
        }
        let attacker = state
            .get(attacker_id)
            .cloned()
            .ok_or(CombatError::CombatantNotFound(attacker_id))?;
        let target = state
            .get(target_id)
            .cloned()
            .ok_or(CombatError::CombatantNotFound(target_id))?;

        if attacker.id == target.id {
            return Err(CombatError::InvalidCombatant(format!(
                "{} cannot attack themselves",
                attacker.name
            )));
        }
        if !attacker.is_alive() {
            return Err(CombatError::InvalidCombatant(format!(
                "{} is down and cannot act",
                attacker.name
            )));
        }
        if !target.is_alive() {
            return Err(CombatError::InvalidCombatant(format!(
                "{} is already defeated",
                target.name
            )));
        }

        let d20 = roll_d20(roller, options.advantage);
        let attack_total = (d20.natural as i32)
            .saturating_add(attacker.attack_bonus)
            .saturating_add(options.attack_modifier);
        let critical = d20.is_natural_20();
        let hit = critical || (!d20.is_natural_1() && attack_total >= target.armor_class);

        tracing::debug!(
            attacker = %attacker.name,
            target = %target.name,
            rolls = ?d20.rolls,
            attack_total,
            target_ac = target.armor_class,
            hit,
            critical,
            "attack roll"
        );

        let weapon_name = attacker
            .weapon
            .as_ref()
            .map(|w| w.name.clone())
            .unwrap_or_else(|| "Unarmed".to_string());

        let mut damage = 0;
        if hit {
            let expr = self.damage_expression(&attacker);
            let mut rolled = expr.roll_with(roller).total;
            if critical {
                rolled = rolled.saturating_add(expr.roll_dice_only(roller).total);
            }
            damage = rolled
                .saturating_add(attacker.attack_bonus)
                .max(self.config.minimum_hit_damage);
        }

        let target_hp = {
            let combatant = state
                .get_mut(target_id)
                .ok_or(CombatError::CombatantNotFound(target_id))?;
            combatant.set_hp(combatant.current_hp.saturating_sub(damage));
            combatant.current_hp
        };
        let is_fatal = hit && target_hp == 0;

        let message = if !hit {
            format!("Miss! {} missed {}.", attacker.name, target.name)
        } else {
            let prefix = if critical { "Critical Hit!" } else { "Hit!" };
            let mut message = format!(
                "{prefix} {} deals {damage} damage to {} using {weapon_name}.",
                attacker.name, target.name
            );
            if is_fatal {
                message.push_str(" Target defeated!");
            }
            message
        };
        state.push_log(message.clone());

        if hit {
            self.sync_if_player(state, target_id).await?;
            self.settle_turn(state);
        }

        Ok(AttackResult {
            attacker_id,
            attacker_name: attacker.name,
            target_id,
            target_name: target.name,
            weapon: weapon_name,
            hit,
            critical,
            natural_roll: d20.natural,
            d20_rolls: d20.rolls,
            attack_total,
            target_ac: target.armor_class,
            damage,
            target_hp,
            target_max_hp: target.max_hp,
            is_fatal,
            message,
        })
    }

    /// Apply damage that bypasses the attack roll (traps, spells, narration).
    pub async fn apply_direct_damage(
        &self,
        state: &mut CombatState,
        target_id: CombatantId,
        amount: i32,
        source: DamageSource,
    ) -> Result<Combatant, CombatError> {
        if !state.is_active {
            return Err(CombatError::NotActive);
        }
        let amount = amount.max(0);

        let (before, after) = {
            let target = state
                .get_mut(target_id)
                .ok_or(CombatError::CombatantNotFound(target_id))?;
            let before = target.clone();
            target.set_hp(target.current_hp.saturating_sub(amount));
            (before, target.clone())
        };

        state.push_log(format!(
            "{} took {} damage ({}). HP: {}/{}",
            after.name,
            amount,
            source.label(),
            after.current_hp,
            after.max_hp
        ));
        if before.is_alive() && !after.is_alive() {
            state.push_log(format!("{} has been defeated!", after.name));
        }

        self.sync_if_player(state, target_id).await?;
        self.settle_turn(state);
        Ok(after)
    }

    /// Restore hit points, up to the maximum.
    pub async fn heal(
        &self,
        state: &mut CombatState,
        target_id: CombatantId,
        amount: i32,
        reason: Option<&str>,
    ) -> Result<Combatant, CombatError> {
        if !state.is_active {
            return Err(CombatError::NotActive);
        }

        let (restored, after) = {
            let target = state
                .get_mut(target_id)
                .ok_or(CombatError::CombatantNotFound(target_id))?;
            let before = target.current_hp;
            target.set_hp(before.saturating_add(amount.max(0)));
            (target.current_hp - before, target.clone())
        };

        let source = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!(" ({reason})"),
            None => String::new(),
        };
        state.push_log(format!(
            "{} regains {} HP{}. HP: {}/{}",
            after.name, restored, source, after.current_hp, after.max_hp
        ));

        self.sync_if_player(state, target_id).await?;
        Ok(after)
    }

    fn damage_expression(&self, attacker: &Combatant) -> DiceExpression {
        let notation = attacker
            .weapon
            .as_ref()
            .map(|w| w.damage.as_str())
            .unwrap_or(self.config.default_damage.as_str());

        DiceExpression::parse(notation)
            .or_else(|err| {
                tracing::debug!(%notation, %err, "unusable damage notation, using default");
                DiceExpression::parse(&self.config.default_damage)
            })
            .unwrap_or_else(|_| DiceExpression {
                terms: vec![DiceTerm {
                    count: 1,
                    die_type: DieType::D6,
                }],
                modifier: 0,
                notation: "1d6".to_string(),
            })
    }

    async fn sync_if_player(
        &self,
        state: &CombatState,
        id: CombatantId,
    ) -> Result<(), CombatError> {
        if let Some(combatant) = state.get(id) {
            self.sync.sync_combatant(combatant).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Pass the turn to the next living combatant.
    ///
    /// Returns the new holder, or `None` when nobody is left standing (the
    /// pointer stays put).
    pub fn end_turn(&self, state: &mut CombatState) -> Result<Option<CombatantId>, CombatError> {
        if !state.is_active {
            return Err(CombatError::NotActive);
        }
        Ok(advance_turn(state))
    }

    /// Move the pointer off a dead holder.
    fn settle_turn(&self, state: &mut CombatState) {
        if !state.is_active {
            return;
        }
        let holder_alive = state.current_combatant().is_some_and(Combatant::is_alive);
        if !holder_alive {
            advance_turn(state);
        }
    }

    // ========================================================================
    // Ending
    // ========================================================================

    /// Whether one side has been wiped out. Never mutates.
    pub fn check_end(&self, state: &CombatState) -> Option<CombatOutcome> {
        let players_alive = state.living(CombatantKind::Player).next().is_some();
        let npcs_alive = state.living(CombatantKind::Npc).next().is_some();

        match (players_alive, npcs_alive) {
            (false, false) => Some(CombatOutcome::Draw),
            (false, true) => Some(CombatOutcome::Defeat),
            (true, false) => Some(CombatOutcome::Victory),
            (true, true) => None,
        }
    }

    /// Close the encounter and write every player's HP back.
    ///
    /// Returns `false` without touching anything if it was already closed.
    pub async fn end_combat(&self, state: &mut CombatState, reason: &str) -> Result<bool, CombatError> {
        if !state.is_active {
            return Ok(false);
        }

        state.is_active = false;
        state.push_log(format!("Combat ended: {reason}"));
        let synced = self.sync.sync_players(state).await?;

        tracing::info!(combat_id = %state.id, reason, synced, "combat ended");
        Ok(true)
    }

    pub fn summarize(&self, state: &CombatState) -> CombatSummary {
        CombatSummary::from_state(state, self.config.log_tail)
    }
}

/// A player combatant snapshotting the character's combat stats.
pub fn player_combatant(character: &Character) -> Combatant {
    let stats = &character.combat_stats;
    let max_hp = stats.max_hit_points.max(0);
    Combatant {
        id: CombatantId::new(),
        name: character.name.clone(),
        current_hp: stats.current_hit_points.clamp(0, max_hp),
        max_hp,
        armor_class: stats.armor_class,
        attack_bonus: stats.attack_bonus,
        initiative_bonus: character.initiative_bonus,
        initiative: 0,
        weapon: character.wielded_weapon().cloned(),
        source: CombatantSource::Player {
            character_id: character.id,
        },
    }
}

/// Render a bonus with an explicit sign, e.g. `+2` or `-1`.
fn signed(bonus: i32) -> String {
    if bonus < 0 {
        format!("-{}", bonus.unsigned_abs())
    } else {
        format!("+{bonus}")
    }
}

/// Step to the next living entry of the turn order, wrapping at most once.
fn advance_turn(state: &mut CombatState) -> Option<CombatantId> {
    let len = state.turn_order.len();
    if len == 0 {
        return None;
    }

    for step in 1..=len {
        let raw = state.turn_index + step;
        let index = raw % len;
        let id = state.turn_order[index];
        if !state.get(id).is_some_and(Combatant::is_alive) {
            continue;
        }

        let wrapped = raw >= len;
        state.turn_index = index;
        if wrapped {
            state.round_number += 1;
            let entry = format!("Round {} started.", state.round_number);
            state.push_log(entry);
        }
        if let Some(name) = state.get(id).map(|c| c.name.clone()) {
            state.push_log(format!("It is now {name}'s turn."));
        }
        tracing::debug!(round = state.round_number, holder = %id, "turn advanced");
        return Some(id);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::character::{create_sample_hero, CombatStats};
    use crate::store::{CharacterStore, InMemoryCharacterStore};
    use crate::testing::{FailingCharacterStore, ScriptedRoller};

    fn engine_with(store: Arc<dyn CharacterStore>) -> CombatEngine {
        CombatEngine::new(
            CombatConfig::default(),
            Arc::new(BuiltinCatalog::new()),
            CharacterSync::new(store),
        )
    }

    fn goblin() -> EnemySpec {
        EnemySpec::named("Goblin").with_hp(10).with_ac(12)
    }

    /// Unarmed hero with 20/20 HP, AC 15, +2 to hit.
    fn hero() -> Character {
        Character::new("Aria", CombatStats::new(20, 15, 2))
    }

    fn start_duel(engine: &CombatEngine, hero: &Character, init: [u32; 2]) -> CombatState {
        let mut roller = ScriptedRoller::new(init);
        engine
            .start(&CombatIntent::new(vec![goblin()]), Some(hero), &mut roller)
            .unwrap()
    }

    fn id_of(state: &CombatState, name: &str) -> CombatantId {
        state
            .participants
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
            .unwrap()
    }

    #[test]
    fn test_start_requires_enemies() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([]);
        let result = engine.start(&CombatIntent::default(), None, &mut roller);
        assert!(matches!(result, Err(CombatError::NoEnemies)));
    }

    #[test]
    fn test_start_defaults_unknown_enemy() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([10]);
        let intent = CombatIntent::new(vec![EnemySpec::named("Mystery Foe")]);
        let state = engine.start(&intent, None, &mut roller).unwrap();

        let foe = &state.participants[0];
        assert_eq!(foe.current_hp, 10);
        assert_eq!(foe.max_hp, 10);
        assert_eq!(foe.armor_class, 10);
        assert_eq!(foe.attack_bonus, 2);
        assert!(foe.weapon.is_none());
        assert_eq!(foe.kind(), CombatantKind::Npc);
    }

    #[test]
    fn test_start_uses_archetype_and_spec_overrides() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        // Loadout choice (shortsword), then initiative.
        let mut roller = ScriptedRoller::new([2, 10]);
        let intent = CombatIntent::new(vec![EnemySpec::named("Snik")
            .with_archetype("goblin_warrior")
            .with_ac(11)]);
        let state = engine.start(&intent, None, &mut roller).unwrap();

        let snik = &state.participants[0];
        assert_eq!(snik.max_hp, 7);
        assert_eq!(snik.armor_class, 11);
        assert_eq!(snik.attack_bonus, 4);
        assert_eq!(snik.initiative, 12);
        assert_eq!(snik.weapon.as_ref().unwrap().name, "Shortsword");
        assert!(matches!(
            &snik.source,
            CombatantSource::Npc(npc) if npc.archetype.as_deref() == Some("goblin_warrior")
        ));
    }

    #[test]
    fn test_start_hallucinated_archetype_falls_back() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([5]);
        let intent =
            CombatIntent::new(vec![EnemySpec::named("Unknown Entity").with_archetype("invalid_id_123")]);
        let state = engine.start(&intent, None, &mut roller).unwrap();
        assert_eq!(state.participants[0].max_hp, 10);
        assert_eq!(state.participants[0].armor_class, 10);
    }

    #[test]
    fn test_turn_order_descending_with_stable_ties() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([8, 15, 8]);
        let intent = CombatIntent::new(vec![
            EnemySpec::named("A"),
            EnemySpec::named("B"),
            EnemySpec::named("C"),
        ]);
        let state = engine.start(&intent, None, &mut roller).unwrap();

        let names: Vec<&str> = state
            .turn_order
            .iter()
            .map(|id| state.get(*id).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(state.turn_order.len(), state.participants.len());
        assert_eq!(state.round_number, 1);
        assert_eq!(state.turn_index, 0);
        assert!(state.log.contains(&"B rolled 15 (15+0) for initiative.".to_string()));
    }

    #[test]
    fn test_initiative_log_signs_and_saturates() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([15, 10]);
        let intent = CombatIntent::new(vec![
            EnemySpec::named("Slow").with_initiative_bonus(-1),
            EnemySpec::named("Blur").with_initiative_bonus(i32::MAX),
        ])
        .with_description("Fog on the moor");
        let state = engine.start(&intent, None, &mut roller).unwrap();

        assert_eq!(state.description, "Fog on the moor");
        assert!(state.log.contains(&"Slow rolled 14 (15-1) for initiative.".to_string()));
        assert_eq!(state.get(state.turn_order[0]).unwrap().initiative, i32::MAX);
        assert!(state.player().is_none());
        assert!(state.any_alive());
    }

    #[tokio::test]
    async fn test_huge_bonuses_saturate_instead_of_wrapping() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let engine = engine_with(store.clone());
        let hero = create_sample_hero("Aria");
        store.save(&hero).await.unwrap();

        let mut roller = ScriptedRoller::new([15, 5]);
        let intent = CombatIntent::new(vec![EnemySpec::named("Brute")
            .with_hp(30)
            .with_ac(12)
            .with_attack_bonus(i32::MAX)]);
        let mut state = engine.start(&intent, Some(&hero), &mut roller).unwrap();
        let brute = state.current_turn_id().unwrap();
        let aria = state.player().unwrap().id;

        // A huge modifier on top of a huge bonus is still a hit, and the
        // damage is capped rather than negative.
        roller.push([10, 3]);
        let options = AttackOptions {
            attack_modifier: i32::MAX,
            advantage: false,
        };
        let result = engine
            .execute_attack(&mut state, brute, aria, options, &mut roller)
            .await
            .unwrap();
        assert!(result.hit);
        assert_eq!(result.attack_total, i32::MAX);
        assert_eq!(result.damage, i32::MAX);
        assert_eq!(result.target_hp, 0);

        let healed = engine
            .heal(&mut state, aria, i32::MAX, Some("miracle"))
            .await
            .unwrap();
        assert_eq!(healed.current_hp, 20);
    }

    #[test]
    fn test_player_joins_last_and_snapshots_stats() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let hero = create_sample_hero("Aria");
        let state = start_duel(&engine, &hero, [5, 15]);

        let player = state.participants.last().unwrap();
        assert_eq!(player.kind(), CombatantKind::Player);
        assert_eq!(player.character_id(), Some(hero.id));
        assert_eq!(player.armor_class, 15);
        assert_eq!(player.initiative, 17);
        assert_eq!(state.current_combatant().unwrap().name, "Aria");
    }

    #[test]
    fn test_ensure_player_present_is_idempotent() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let hero = hero();
        let mut roller = ScriptedRoller::new([5]);
        let mut state = engine
            .start(&CombatIntent::new(vec![goblin()]), None, &mut roller)
            .unwrap();

        assert!(engine.ensure_player_present(&mut state, &hero));
        assert!(!engine.ensure_player_present(&mut state, &hero));
        assert_eq!(state.participants.len(), 2);
        assert_eq!(state.turn_order.len(), 2);
    }

    #[tokio::test]
    async fn test_hit_applies_damage_plus_bonus() {
        let hero = hero();
        let store = Arc::new(InMemoryCharacterStore::with_characters([hero.clone()]));
        let engine = engine_with(store);
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));

        // 15 + 2 vs AC 12, damage 4 + 2.
        let mut roller = ScriptedRoller::new([15, 4]);
        let result = engine
            .execute_attack(&mut state, aria, goblin, AttackOptions::default(), &mut roller)
            .await
            .unwrap();

        assert!(result.hit);
        assert!(!result.critical);
        assert_eq!(result.attack_total, 17);
        assert_eq!(result.damage, 6);
        assert_eq!(result.target_hp, 4);
        assert_eq!(result.message, "Hit! Aria deals 6 damage to Goblin using Unarmed.");
        assert_eq!(state.get(goblin).unwrap().current_hp, 4);
        assert_eq!(state.get(aria).unwrap().current_hp, 20);
    }

    #[tokio::test]
    async fn test_natural_one_always_misses() {
        let hero = hero();
        let engine = engine_with(Arc::new(InMemoryCharacterStore::with_characters([hero.clone()])));
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));

        let mut roller = ScriptedRoller::new([1]);
        let options = AttackOptions {
            attack_modifier: 50,
            advantage: false,
        };
        let result = engine
            .execute_attack(&mut state, aria, goblin, options, &mut roller)
            .await
            .unwrap();
        assert!(!result.hit);
        assert_eq!(result.damage, 0);
        assert_eq!(result.message, "Miss! Aria missed Goblin.");
        assert_eq!(state.get(goblin).unwrap().current_hp, 10);
    }

    #[tokio::test]
    async fn test_natural_twenty_crits_through_any_ac() {
        let hero = hero();
        let engine = engine_with(Arc::new(InMemoryCharacterStore::with_characters([hero.clone()])));
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));
        state.get_mut(goblin).unwrap().armor_class = 40;

        // nat 20, damage 3, crit die 5: 3 + 5 + 2.
        let mut roller = ScriptedRoller::new([20, 3, 5]);
        let result = engine
            .execute_attack(&mut state, aria, goblin, AttackOptions::default(), &mut roller)
            .await
            .unwrap();
        assert!(result.hit);
        assert!(result.critical);
        assert_eq!(result.damage, 10);
        assert!(result.is_fatal);
        assert!(result.message.starts_with("Critical Hit!"));
        assert!(result.message.ends_with("Target defeated!"));
        assert_eq!(state.get(goblin).unwrap().current_hp, 0);
    }

    #[tokio::test]
    async fn test_advantage_keeps_higher_roll() {
        let hero = hero();
        let engine = engine_with(Arc::new(InMemoryCharacterStore::with_characters([hero.clone()])));
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));

        let mut roller = ScriptedRoller::new([2, 14, 1]);
        let options = AttackOptions {
            attack_modifier: 0,
            advantage: true,
        };
        let result = engine
            .execute_attack(&mut state, aria, goblin, options, &mut roller)
            .await
            .unwrap();
        assert_eq!(result.d20_rolls, vec![2, 14]);
        assert_eq!(result.natural_roll, 14);
        assert!(result.hit);
        assert_eq!(result.damage, 3);
    }

    #[tokio::test]
    async fn test_attack_rejects_bad_participants() {
        let hero = hero();
        let engine = engine_with(Arc::new(InMemoryCharacterStore::with_characters([hero.clone()])));
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));
        let mut roller = ScriptedRoller::new([]);

        let missing = CombatantId::new();
        assert!(matches!(
            engine
                .execute_attack(&mut state, aria, missing, AttackOptions::default(), &mut roller)
                .await,
            Err(CombatError::CombatantNotFound(id)) if id == missing
        ));
        assert!(matches!(
            engine
                .execute_attack(&mut state, aria, aria, AttackOptions::default(), &mut roller)
                .await,
            Err(CombatError::InvalidCombatant(_))
        ));

        state.get_mut(goblin).unwrap().current_hp = 0;
        assert!(matches!(
            engine
                .execute_attack(&mut state, aria, goblin, AttackOptions::default(), &mut roller)
                .await,
            Err(CombatError::InvalidCombatant(_))
        ));
        assert!(matches!(
            engine
                .execute_attack(&mut state, goblin, aria, AttackOptions::default(), &mut roller)
                .await,
            Err(CombatError::InvalidCombatant(_))
        ));
    }

    #[tokio::test]
    async fn test_attack_on_player_syncs_character() {
        let hero = hero();
        let store = Arc::new(InMemoryCharacterStore::with_characters([hero.clone()]));
        let engine = engine_with(store.clone());
        let mut state = start_duel(&engine, &hero, [15, 5]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));

        let mut roller = ScriptedRoller::new([18, 6]);
        engine
            .execute_attack(&mut state, goblin, aria, AttackOptions::default(), &mut roller)
            .await
            .unwrap();

        assert_eq!(state.get(aria).unwrap().current_hp, 12);
        let saved = store.load(hero.id).await.unwrap();
        assert_eq!(saved.combat_stats.current_hit_points, 12);
    }

    #[tokio::test]
    async fn test_direct_damage_clamps_and_syncs() {
        let hero = hero();
        let store = Arc::new(InMemoryCharacterStore::with_characters([hero.clone()]));
        let engine = engine_with(store.clone());
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let aria = id_of(&state, "Aria");

        let after = engine
            .apply_direct_damage(&mut state, aria, 7, DamageSource::Effect(Some("Trap".into())))
            .await
            .unwrap();
        assert_eq!(after.current_hp, 13);
        assert_eq!(state.log.last().unwrap(), "Aria took 7 damage (Trap). HP: 13/20");
        assert_eq!(
            store.load(hero.id).await.unwrap().combat_stats.current_hit_points,
            13
        );

        let after = engine
            .apply_direct_damage(&mut state, aria, 100, DamageSource::Attack)
            .await
            .unwrap();
        assert_eq!(after.current_hp, 0);
        assert!(state.log.contains(&"Aria has been defeated!".to_string()));
        assert_eq!(state.log.last().unwrap(), "It is now Goblin's turn.");
    }

    #[tokio::test]
    async fn test_direct_damage_store_failure_is_hard_error() {
        let hero = hero();
        let engine = engine_with(Arc::new(FailingCharacterStore));
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let aria = id_of(&state, "Aria");

        let result = engine
            .apply_direct_damage(&mut state, aria, 3, DamageSource::Attack)
            .await;
        assert!(matches!(result, Err(CombatError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_heal_caps_at_max() {
        let hero = hero();
        let store = Arc::new(InMemoryCharacterStore::with_characters([hero.clone()]));
        let engine = engine_with(store.clone());
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let aria = id_of(&state, "Aria");

        engine
            .apply_direct_damage(&mut state, aria, 8, DamageSource::Attack)
            .await
            .unwrap();
        let after = engine
            .heal(&mut state, aria, 50, Some("Potion"))
            .await
            .unwrap();
        assert_eq!(after.current_hp, 20);
        assert_eq!(state.log.last().unwrap(), "Aria regains 8 HP (Potion). HP: 20/20");
        assert_eq!(
            store.load(hero.id).await.unwrap().combat_stats.current_hit_points,
            20
        );
    }

    #[test]
    fn test_end_turn_full_cycle_increments_round_once() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([3, 9, 17]);
        let intent = CombatIntent::new(vec![
            EnemySpec::named("A"),
            EnemySpec::named("B"),
            EnemySpec::named("C"),
        ]);
        let mut state = engine.start(&intent, None, &mut roller).unwrap();
        let first = state.current_turn_id();

        for _ in 0..3 {
            engine.end_turn(&mut state).unwrap();
        }
        assert_eq!(state.current_turn_id(), first);
        assert_eq!(state.round_number, 2);
        assert!(state.log.contains(&"Round 2 started.".to_string()));
    }

    #[test]
    fn test_end_turn_skips_the_dead() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([17, 9, 3]);
        let intent = CombatIntent::new(vec![
            EnemySpec::named("A"),
            EnemySpec::named("B"),
            EnemySpec::named("C"),
        ]);
        let mut state = engine.start(&intent, None, &mut roller).unwrap();
        let b = id_of(&state, "B");
        let c = id_of(&state, "C");
        state.get_mut(b).unwrap().current_hp = 0;

        assert_eq!(engine.end_turn(&mut state).unwrap(), Some(c));
        assert_eq!(state.log.last().unwrap(), "It is now C's turn.");
    }

    #[test]
    fn test_end_turn_with_nobody_alive_stays_put() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut roller = ScriptedRoller::new([4, 6]);
        let intent = CombatIntent::new(vec![EnemySpec::named("A"), EnemySpec::named("B")]);
        let mut state = engine.start(&intent, None, &mut roller).unwrap();
        for c in &mut state.participants {
            c.current_hp = 0;
        }
        let index = state.turn_index;

        assert_eq!(engine.end_turn(&mut state).unwrap(), None);
        assert_eq!(state.turn_index, index);
        assert_eq!(state.round_number, 1);
    }

    #[tokio::test]
    async fn test_death_of_holder_moves_pointer() {
        let hero = hero();
        let engine = engine_with(Arc::new(InMemoryCharacterStore::with_characters([hero.clone()])));
        let intent = CombatIntent::new(vec![EnemySpec::named("A"), EnemySpec::named("B")]);
        let mut roller = ScriptedRoller::new([18, 12, 6]);
        let mut state = engine.start(&intent, Some(&hero), &mut roller).unwrap();
        let a = id_of(&state, "A");
        let b = id_of(&state, "B");
        assert_eq!(state.current_turn_id(), Some(a));

        engine
            .apply_direct_damage(&mut state, a, 10, DamageSource::Effect(None))
            .await
            .unwrap();
        assert_eq!(state.current_turn_id(), Some(b));
        assert_eq!(state.round_number, 1);
    }

    #[tokio::test]
    async fn test_check_end_outcomes_and_purity() {
        let hero = hero();
        let engine = engine_with(Arc::new(InMemoryCharacterStore::with_characters([hero.clone()])));
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let (aria, goblin) = (id_of(&state, "Aria"), id_of(&state, "Goblin"));

        let snapshot = state.clone();
        assert_eq!(engine.check_end(&state), None);
        assert_eq!(engine.check_end(&state), None);
        assert_eq!(state, snapshot);

        state.get_mut(goblin).unwrap().current_hp = 0;
        assert_eq!(engine.check_end(&state), Some(CombatOutcome::Victory));

        state.get_mut(aria).unwrap().current_hp = 0;
        assert_eq!(engine.check_end(&state), Some(CombatOutcome::Draw));

        state.get_mut(goblin).unwrap().current_hp = 3;
        assert_eq!(engine.check_end(&state), Some(CombatOutcome::Defeat));
    }

    #[tokio::test]
    async fn test_end_combat_is_idempotent() {
        let hero = hero();
        let store = Arc::new(InMemoryCharacterStore::with_characters([hero.clone()]));
        let engine = engine_with(store.clone());
        let mut state = start_duel(&engine, &hero, [5, 15]);
        let aria = id_of(&state, "Aria");
        state.get_mut(aria).unwrap().current_hp = 9;

        assert!(engine.end_combat(&mut state, "fled").await.unwrap());
        assert!(!state.is_active);
        assert_eq!(state.log.last().unwrap(), "Combat ended: fled");
        assert_eq!(
            store.load(hero.id).await.unwrap().combat_stats.current_hit_points,
            9
        );

        let log_len = state.log.len();
        state.get_mut(aria).unwrap().current_hp = 1;
        assert!(!engine.end_combat(&mut state, "fled").await.unwrap());
        assert_eq!(state.log.len(), log_len);
        assert_eq!(
            store.load(hero.id).await.unwrap().combat_stats.current_hit_points,
            9
        );
    }

    #[test]
    fn test_bad_weapon_notation_uses_default_damage() {
        let engine = engine_with(Arc::new(InMemoryCharacterStore::new()));
        let mut attacker = player_combatant(&hero());
        attacker.weapon = Some(crate::character::Weapon::new("weapon_odd", "Odd Stick", "lots"));
        let expr = engine.damage_expression(&attacker);
        assert_eq!(expr.notation, "1d6");
    }
}
