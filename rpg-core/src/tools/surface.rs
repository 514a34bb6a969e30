//! Session adapter between the controlling agent and the combat engine.
//!
//! Every tool call is one load, mutate, save cycle against the session
//! store. Failures never escape as `Err`: they are logged and returned as
//! `{"error": "..."}` so the agent can retry with better input.

use super::matching::resolve_target;
use super::{
    ApplyDirectDamageArgs, ApplyHealingArgs, CheckCombatEndArgs, DeclareCombatStartArgs,
    EndCombatArgs, EndTurnArgs,
    ExecuteAttackArgs, GetCombatStatusArgs, SearchEnemyArchetypeArgs, StartCombatArgs,
    ToolDefinition, ToolError,
};
use crate::catalog::ArchetypeCatalog;
use crate::combat::{
    AttackOptions, CombatEngine, CombatIntent, CombatState, Combatant, CombatantId,
    CombatSummary, DamageSource,
};
use crate::config::CombatConfig;
use crate::dice::{DiceRoller, RandomRoller};
use crate::session::GameState;
use crate::store::{CharacterStore, SessionStore};
use crate::sync::CharacterSync;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The combat tools exposed to the controlling agent.
pub struct CombatTools {
    sessions: Arc<dyn SessionStore>,
    characters: Arc<dyn CharacterStore>,
    engine: CombatEngine,
    roller: Mutex<Box<dyn DiceRoller>>,
}

impl CombatTools {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        characters: Arc<dyn CharacterStore>,
        catalog: Arc<dyn ArchetypeCatalog>,
        config: CombatConfig,
    ) -> Self {
        let engine = CombatEngine::new(config, catalog, CharacterSync::new(characters.clone()));
        Self {
            sessions,
            characters,
            engine,
            roller: Mutex::new(Box::new(RandomRoller::from_entropy())),
        }
    }

    /// Replace the dice source, e.g. with a seeded or scripted roller.
    pub fn with_roller(mut self, roller: impl DiceRoller + 'static) -> Self {
        self.roller = Mutex::new(Box::new(roller));
        self
    }

    pub fn engine(&self) -> &CombatEngine {
        &self.engine
    }

    /// Definitions of every tool, for registration with the agent.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            DeclareCombatStartArgs::as_tool(),
            StartCombatArgs::as_tool(),
            ExecuteAttackArgs::as_tool(),
            ApplyDirectDamageArgs::as_tool(),
            ApplyHealingArgs::as_tool(),
            EndTurnArgs::as_tool(),
            CheckCombatEndArgs::as_tool(),
            EndCombatArgs::as_tool(),
            GetCombatStatusArgs::as_tool(),
            SearchEnemyArchetypeArgs::as_tool(),
        ]
    }

    /// Dispatch a tool call by name with raw JSON arguments.
    pub async fn call(&self, name: &str, input: Value) -> Value {
        render(name, self.dispatch(name, input).await)
    }

    async fn dispatch(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        match name {
            "declare_combat_start" => Ok(self.try_declare_combat_start(parse_args(name, input)?)),
            "start_combat" => self.try_start_combat(parse_args(name, input)?).await,
            "execute_attack" => self.try_execute_attack(parse_args(name, input)?).await,
            "apply_direct_damage" => self.try_apply_direct_damage(parse_args(name, input)?).await,
            "apply_healing" => self.try_apply_healing(parse_args(name, input)?).await,
            "end_turn" => {
                let _: EndTurnArgs = parse_args(name, input)?;
                self.try_end_turn().await
            }
            "check_combat_end" => {
                let _: CheckCombatEndArgs = parse_args(name, input)?;
                self.try_check_combat_end().await
            }
            "end_combat" => self.try_end_combat(parse_args(name, input)?).await,
            "get_combat_status" => {
                let _: GetCombatStatusArgs = parse_args(name, input)?;
                self.try_get_combat_status().await
            }
            "search_enemy_archetype" => Ok(self.try_search_enemy_archetype(parse_args(name, input)?)),
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    // ========================================================================
    // Typed entry points
    // ========================================================================

    pub fn declare_combat_start(&self, args: DeclareCombatStartArgs) -> Value {
        self.try_declare_combat_start(args)
    }

    pub async fn start_combat(&self, args: StartCombatArgs) -> Value {
        render(StartCombatArgs::tool_name(), self.try_start_combat(args).await)
    }

    pub async fn execute_attack(&self, args: ExecuteAttackArgs) -> Value {
        render(ExecuteAttackArgs::tool_name(), self.try_execute_attack(args).await)
    }

    pub async fn apply_direct_damage(&self, args: ApplyDirectDamageArgs) -> Value {
        render(
            ApplyDirectDamageArgs::tool_name(),
            self.try_apply_direct_damage(args).await,
        )
    }

    pub async fn apply_healing(&self, args: ApplyHealingArgs) -> Value {
        render(ApplyHealingArgs::tool_name(), self.try_apply_healing(args).await)
    }

    pub async fn end_turn(&self) -> Value {
        render(EndTurnArgs::tool_name(), self.try_end_turn().await)
    }

    pub async fn check_combat_end(&self) -> Value {
        render(CheckCombatEndArgs::tool_name(), self.try_check_combat_end().await)
    }

    pub async fn end_combat(&self, args: EndCombatArgs) -> Value {
        render(EndCombatArgs::tool_name(), self.try_end_combat(args).await)
    }

    pub async fn get_combat_status(&self) -> Value {
        render(GetCombatStatusArgs::tool_name(), self.try_get_combat_status().await)
    }

    pub fn search_enemy_archetype(&self, args: SearchEnemyArchetypeArgs) -> Value {
        self.try_search_enemy_archetype(args)
    }

    // ========================================================================
    // Tool bodies
    // ========================================================================

    /// Acknowledge a fight breaking out. Touches no state; the controller
    /// follows up with `start_combat`.
    fn try_declare_combat_start(&self, args: DeclareCombatStartArgs) -> Value {
        tracing::info!(tool = "declare_combat_start", description = %args.description, "tool called");

        json!({
            "status": "combat_declared",
            "message": "Combat declaration registered. Switching to Combat Engine.",
            "description": args.description,
        })
    }

    async fn try_start_combat(&self, args: StartCombatArgs) -> Result<Value, ToolError> {
        tracing::info!(tool = "start_combat", enemies = args.enemies.len(), "tool called");

        let mut game = self.load_game().await?;
        if game.active_combat().is_some() {
            return Err(ToolError::CombatAlreadyActive);
        }

        let player = match game.character_id {
            Some(id) => Some(self.characters.load(id).await?),
            None => None,
        };

        let enemy_count = args.enemies.len();
        let intent = CombatIntent {
            description: args.description,
            enemies: args.enemies,
        };
        let combat = {
            let mut roller = self.roller.lock().await;
            self.engine.start(&intent, player.as_ref(), &mut **roller)?
        };

        let summary = self.engine.summarize(&combat);
        game.enter_combat(combat);
        self.sessions.update_game_state(&game).await?;

        with_message(
            &summary,
            format!("Combat started! {enemy_count} enemies engaged."),
        )
    }

    async fn try_execute_attack(&self, args: ExecuteAttackArgs) -> Result<Value, ToolError> {
        tracing::info!(
            tool = "execute_attack",
            target = %args.target_name,
            modifier = ?args.attack_modifier,
            advantage = ?args.advantage,
            "tool called"
        );

        let mut game = self.load_game().await?;
        let mut combat = take_active_combat(&mut game)?;
        self.ensure_player(&game, &mut combat).await?;

        let attacker = combat
            .current_combatant()
            .filter(|c| c.is_alive())
            .cloned()
            .ok_or(ToolError::NoCurrentTurn)?;

        let candidates: Vec<&Combatant> = combat
            .participants
            .iter()
            .filter(|c| c.id != attacker.id && c.is_alive())
            .collect();
        if candidates.is_empty() {
            return Err(ToolError::NoValidTargets);
        }
        let opposing: Vec<&Combatant> = candidates
            .iter()
            .copied()
            .filter(|c| c.kind() != attacker.kind())
            .collect();
        let fallback = match opposing.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        let target = resolve_target(
            &candidates,
            &args.target_name,
            self.engine.config().fuzzy_threshold,
            fallback,
        )
        .ok_or_else(|| target_not_found(&args.target_name, &candidates))?;
        let (target_id, target_name) = (target.id, target.name.clone());

        let options = AttackOptions {
            attack_modifier: args.attack_modifier.unwrap_or(0),
            advantage: args.advantage.unwrap_or(false),
        };
        let result = {
            let mut roller = self.roller.lock().await;
            self.engine
                .execute_attack(&mut combat, attacker.id, target_id, options, &mut **roller)
                .await?
        };

        let (summary, auto_ended) = self.settle(&mut game, combat).await?;
        self.sessions.update_game_state(&game).await?;

        let mut details = serde_json::to_value(&result).map_err(internal)?;
        details["resolved_target_name"] = json!(target_name);

        Ok(json!({
            "message": result.message,
            "attack_details": details,
            "combat_state_summary": summary,
            "auto_ended": auto_ended,
        }))
    }

    async fn try_apply_direct_damage(
        &self,
        args: ApplyDirectDamageArgs,
    ) -> Result<Value, ToolError> {
        tracing::info!(
            tool = "apply_direct_damage",
            target = %args.target_id,
            amount = args.amount,
            "tool called"
        );
        if args.amount <= 0 {
            return Err(invalid_args(
                ApplyDirectDamageArgs::tool_name(),
                "amount must be a positive integer",
            ));
        }

        let mut game = self.load_game().await?;
        let mut combat = take_active_combat(&mut game)?;
        let target_id = self.resolve_any(&combat, &args.target_id)?;

        let source = if args.is_attack.unwrap_or(false) {
            DamageSource::Attack
        } else {
            DamageSource::Effect(args.reason.clone())
        };
        let target = self
            .engine
            .apply_direct_damage(&mut combat, target_id, args.amount, source)
            .await?;

        let (summary, auto_ended) = self.settle(&mut game, combat).await?;
        self.sessions.update_game_state(&game).await?;

        Ok(json!({
            "message": format!("Applied {} damage to {}.", args.amount, target.name),
            "combat_state_summary": summary,
            "auto_ended": auto_ended,
        }))
    }

    async fn try_apply_healing(&self, args: ApplyHealingArgs) -> Result<Value, ToolError> {
        tracing::info!(
            tool = "apply_healing",
            target = %args.target_name,
            amount = args.amount,
            "tool called"
        );
        if args.amount <= 0 {
            return Err(invalid_args(
                ApplyHealingArgs::tool_name(),
                "amount must be a positive integer",
            ));
        }

        let mut game = self.load_game().await?;
        let mut combat = take_active_combat(&mut game)?;
        let target_id = self.resolve_any(&combat, &args.target_name)?;

        let target = self
            .engine
            .heal(&mut combat, target_id, args.amount, args.reason.as_deref())
            .await?;

        let summary = self.engine.summarize(&combat);
        game.combat_state = Some(combat);
        self.sessions.update_game_state(&game).await?;

        Ok(json!({
            "message": format!(
                "{} is healed. HP: {}/{}.",
                target.name, target.current_hp, target.max_hp
            ),
            "combat_state_summary": summary,
        }))
    }

    async fn try_end_turn(&self) -> Result<Value, ToolError> {
        tracing::info!(tool = "end_turn", "tool called");

        let mut game = self.load_game().await?;
        let Some(mut combat) = game.combat_state.take().filter(|c| c.is_active) else {
            return Ok(json!({
                "status": "no_combat",
                "message": "No active combat found to end turn.",
            }));
        };

        self.engine.end_turn(&mut combat)?;
        let message = match combat.current_combatant() {
            Some(holder) if holder.is_alive() => {
                format!("Turn ended. It's now {}'s turn", holder.name)
            }
            _ => "Turn ended. No combatant is able to act.".to_string(),
        };

        let summary = self.engine.summarize(&combat);
        game.combat_state = Some(combat);
        self.sessions.update_game_state(&game).await?;

        Ok(json!({
            "combat_state_summary": summary,
            "message": message,
        }))
    }

    async fn try_check_combat_end(&self) -> Result<Value, ToolError> {
        tracing::info!(tool = "check_combat_end", "tool called");

        let mut game = self.load_game().await?;
        let Some(mut combat) = game.combat_state.take().filter(|c| c.is_active) else {
            let last = game.last_combat_result.as_ref();
            return Ok(json!({
                "combat_ended": true,
                "status": "no_combat",
                "message": "No active combat found.",
                "end_reason": last.map(|r| r.outcome.clone()),
                "summary": last.map(|r| &r.summary),
            }));
        };

        let Some(outcome) = self.engine.check_end(&combat) else {
            return Ok(json!({
                "combat_ended": false,
                "status": "ongoing",
                "message": "Combat ongoing",
            }));
        };

        self.engine.end_combat(&mut combat, outcome.as_str()).await?;
        let summary = self.engine.summarize(&combat);
        game.conclude_combat(outcome.as_str(), summary.clone());
        self.sessions.update_game_state(&game).await?;

        Ok(json!({
            "combat_ended": true,
            "status": "ended",
            "end_reason": outcome.as_str(),
            "message": format!("Combat ended: {outcome}"),
            "summary": summary,
        }))
    }

    async fn try_end_combat(&self, args: EndCombatArgs) -> Result<Value, ToolError> {
        tracing::info!(tool = "end_combat", reason = %args.reason, "tool called");

        let mut game = self.load_game().await?;
        let Some(mut combat) = game.combat_state.take() else {
            return Ok(json!({
                "status": "no_combat",
                "message": "No active combat found to end.",
            }));
        };

        let reason = match args.reason.trim() {
            "" => "ended",
            reason => reason,
        };
        self.engine.end_combat(&mut combat, reason).await?;
        let summary = self.engine.summarize(&combat);
        game.conclude_combat(reason, summary.clone());
        self.sessions.update_game_state(&game).await?;

        serde_json::to_value(&summary).map_err(internal)
    }

    async fn try_get_combat_status(&self) -> Result<Value, ToolError> {
        tracing::info!(tool = "get_combat_status", "tool called");

        let game = self.load_game().await?;
        match game.active_combat() {
            Some(combat) => serde_json::to_value(self.engine.summarize(combat)).map_err(internal),
            None => Ok(json!({
                "status": "no_combat",
                "is_active": false,
                "message": "No active combat.",
                "participants": [],
                "last_combat": game.last_combat_result.as_ref().map(|r| &r.summary),
            })),
        }
    }

    fn try_search_enemy_archetype(&self, args: SearchEnemyArchetypeArgs) -> Value {
        tracing::info!(tool = "search_enemy_archetype", query = %args.query, "tool called");

        let results = self.engine.catalog().search(&args.query);
        json!({
            "count": results.len(),
            "message": format!("Found {} archetypes matching '{}'.", results.len(), args.query),
            "results": results,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load_game(&self) -> Result<GameState, ToolError> {
        self.sessions
            .load_game_state()
            .await?
            .ok_or(ToolError::GameStateNotFound)
    }

    /// Bring the session's character into an encounter that lacks them.
    async fn ensure_player(&self, game: &GameState, combat: &mut CombatState) -> Result<(), ToolError> {
        if let Some(id) = game.character_id {
            if !combat.has_character(id) {
                let character = self.characters.load(id).await?;
                self.engine.ensure_player_present(combat, &character);
            }
        }
        Ok(())
    }

    /// Resolve a combatant id, falling back to a name among the living.
    fn resolve_any(&self, combat: &CombatState, reference: &str) -> Result<CombatantId, ToolError> {
        if let Some(id) = CombatantId::parse(reference).filter(|id| combat.get(*id).is_some()) {
            return Ok(id);
        }

        let candidates: Vec<&Combatant> =
            combat.participants.iter().filter(|c| c.is_alive()).collect();
        let fallback = match candidates.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        resolve_target(
            &candidates,
            reference,
            self.engine.config().fuzzy_threshold,
            fallback,
        )
        .map(|c| c.id)
        .ok_or_else(|| target_not_found(reference, &candidates))
    }

    /// Re-check the end condition after an HP change and close the encounter
    /// if a side is down. Reattaches the combat otherwise.
    async fn settle(
        &self,
        game: &mut GameState,
        mut combat: CombatState,
    ) -> Result<(CombatSummary, Value), ToolError> {
        match self.engine.check_end(&combat) {
            Some(outcome) => {
                self.engine.end_combat(&mut combat, outcome.as_str()).await?;
                let summary = self.engine.summarize(&combat);
                game.conclude_combat(outcome.as_str(), summary.clone());
                tracing::info!(combat_id = %combat.id, %outcome, "combat auto-ended");
                Ok((summary, json!({"ended": true, "reason": outcome.as_str()})))
            }
            None => {
                let summary = self.engine.summarize(&combat);
                game.combat_state = Some(combat);
                Ok((summary, Value::Null))
            }
        }
    }
}

/// Detach the running combat from the session for mutation.
fn take_active_combat(game: &mut GameState) -> Result<CombatState, ToolError> {
    game.combat_state
        .take()
        .filter(|c| c.is_active)
        .ok_or(ToolError::NoActiveCombat)
}

fn parse_args<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, ToolError> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|e| invalid_args(tool, e))
}

fn invalid_args(tool: &str, message: impl ToString) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

fn internal(err: serde_json::Error) -> ToolError {
    ToolError::Store(err.into())
}

fn target_not_found(name: &str, candidates: &[&Combatant]) -> ToolError {
    ToolError::TargetNotFound {
        name: name.to_string(),
        available: candidates.iter().map(|c| c.name.clone()).collect(),
    }
}

fn with_message<T: Serialize>(payload: &T, message: String) -> Result<Value, ToolError> {
    let mut value = serde_json::to_value(payload).map_err(internal)?;
    value["message"] = Value::String(message);
    Ok(value)
}

/// Turn a tool outcome into the payload handed back to the agent.
fn render(tool: &str, result: Result<Value, ToolError>) -> Value {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(tool, error = %err, "tool call failed");
            json!({ "error": err.to_string() })
        }
    }
}
