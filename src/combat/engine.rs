//! Combat engine
//!
//! Drives a battle from start to end. Each command loads the battle
//! snapshot for its scope, resolves the action in memory and writes the
//! result back in a single transaction, so a failing step leaves nothing
//! half applied.
//!
//! Turn policy:
//! - Only the participant whose turn it is may act
//! - Every resolved action advances the turn; wrapping the order starts a new round
//! - Status effects tick at the start of the afflicted participant's turn
//! - NPC turns resolve immediately after the player's action
//! - A side reaching zero health ends the battle

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::damage::{resolve_hit, sanity_transfer, HitContext, DEFEND_REDUCTION_PERCENT, FOCUS_BONUS};
use super::dice::{self, scale_expression, DieRoller, RollOutcome, ThreadRoller};
use super::effects::StatusEffect;
use super::report::{
    ActionReport, AttackReport, BattleOption, BattleOutcome, BattleSummary, HitReport, TurnEvent,
};
use super::state::{BattleView, Combatant, EndReason, ScopeKey};
use super::store::BattleStore;
use crate::catalog::{Affinity, Catalog, ItemEffect};
use crate::characters::{can_afford, CharacterLedger, Costs, Mastery, Progress};
use crate::error::{GameError, GameResult};
use crate::rating::{RatingResolver, Tier};

/// Experience per NPC level awarded on victory
pub const EXPERIENCE_PER_NPC_LEVEL: i64 = 10;

/// Upper bound on hits in one NPC attack chain
const MAX_CHAIN: i64 = 10;

/// Upper bound on turns resolved automatically after one command
const MAX_AUTO_TURNS: usize = 16;

/// Ledger writes that commit together with the battle
#[derive(Debug, Clone, PartialEq)]
enum LedgerOp {
    PerfectHit { character_id: i64, attack_id: i64 },
    Experience { character_id: i64, amount: i64 },
    ConsumeItem { character_id: i64, item: String },
}

#[derive(Debug, Default)]
struct Committed {
    mastery: Option<Mastery>,
    progress: Option<Progress>,
}

/// Battle lifecycle and action resolution
pub struct CombatEngine {
    store: BattleStore,
    ledger: CharacterLedger,
    catalog: Catalog,
    ratings: RatingResolver,
    roller: Mutex<Box<dyn DieRoller>>,
}

impl CombatEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_roller(pool, Box::new(ThreadRoller))
    }

    /// Engine drawing every die from the given roller
    pub fn with_roller(pool: SqlitePool, roller: Box<dyn DieRoller>) -> Self {
        Self {
            store: BattleStore::new(pool.clone()),
            ledger: CharacterLedger::new(pool.clone()),
            catalog: Catalog::new(pool.clone()),
            ratings: RatingResolver::new(pool),
            roller: Mutex::new(roller),
        }
    }

    /// Roll an expression with the engine's roller
    pub fn roll(&self, expression: &str) -> GameResult<RollOutcome> {
        let mut roller = self.roller.lock();
        dice::roll(expression, &mut **roller)
    }

    /// Start a battle between the owner's character and an NPC.
    /// The player always takes the first turn.
    pub async fn start_battle(
        &self,
        scope: &ScopeKey,
        owner_id: &str,
        opponent: &str,
    ) -> GameResult<BattleSummary> {
        if self.store.has_active(scope).await? {
            return Err(GameError::BattleAlreadyActive);
        }

        let character = self.ledger.resolve(owner_id, None).await?;
        let npc = self
            .catalog
            .npc(opponent)
            .await?
            .ok_or_else(|| GameError::OpponentNotFound(opponent.to_string()))?;

        let view = self.store.create(scope, &character, &npc).await?;
        Ok(BattleSummary::from_view(&view))
    }

    /// Attack with a named unlocked attack, or the first one unlocked.
    ///
    /// Characters outside the battle get a free-form roll that changes nothing.
    pub async fn attack(
        &self,
        scope: &ScopeKey,
        owner_id: &str,
        attack_name: Option<&str>,
    ) -> GameResult<AttackReport> {
        let mut view = self
            .store
            .find_active(scope)
            .await?
            .ok_or(GameError::NoActiveBattle)?;
        let character = self.ledger.resolve(owner_id, None).await?;

        let unlocked = self.ledger.unlocked_attacks(character.id).await?;
        if unlocked.is_empty() {
            return Err(GameError::NoAttacksUnlocked);
        }
        let chosen = match attack_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => unlocked
                .iter()
                .find(|u| u.attack.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| GameError::AttackNotUnlocked(name.to_string()))?,
            None => unlocked.first().ok_or(GameError::NoAttacksUnlocked)?,
        };
        let attack = &chosen.attack;
        let dice = scale_expression(&attack.base_damage_dice, character.level);

        let Some(actor_id) = view.by_character(character.id).map(|p| p.id) else {
            let roll = self.roll(&dice)?;
            let tier = Tier::classify(roll.total, roll.max_possible);
            let reference = self.ratings.reference(owner_id, tier).await?;
            return Ok(AttackReport {
                actor: character.name,
                attack: attack.name.clone(),
                dice,
                roll,
                tier,
                reference,
                hit: None,
                mastery: None,
                progress: None,
                events: Vec::new(),
                outcome: None,
                battle: BattleSummary::from_view(&view),
            });
        };
        ensure_turn(&view, actor_id)?;

        let round = view.battle.round;
        {
            let actor = participant(&view, actor_id)?;
            if let Some(ready_round) = actor.cooldown_until(attack.id, round) {
                return Err(GameError::AttackOnCooldown {
                    attack: attack.name.clone(),
                    ready_round,
                });
            }
            let costs = Costs {
                health: attack.health_cost,
                sanity: attack.sanity_cost,
            };
            can_afford(actor.health, actor.sanity, costs).map_err(
                |(resource, cost, available)| GameError::InsufficientResources {
                    attack: attack.name.clone(),
                    resource,
                    cost,
                    available,
                },
            )?;
        }

        let roll = self.roll(&dice)?;
        let tier = Tier::classify(roll.total, roll.max_possible);

        let actor = participant_mut(&mut view, actor_id)?;
        actor.take_damage(attack.health_cost);
        actor.adjust_sanity(-attack.sanity_cost);
        if attack.cooldown_rounds > 0 {
            actor
                .cooldowns
                .insert(attack.id, round + attack.cooldown_rounds + 1);
        }

        let mut ops = Vec::new();
        if tier == Tier::Perfect {
            ops.push(LedgerOp::PerfectHit {
                character_id: character.id,
                attack_id: attack.id,
            });
        }

        let hit = match view.first_target_of(actor_id) {
            Some(target_id) => Some(strike(
                &mut view,
                actor_id,
                target_id,
                &roll,
                attack.affinity.as_ref(),
            )?),
            None => None,
        };

        let mut events = Vec::new();
        let outcome = self.settle(&mut view, &mut events, &mut ops)?;
        let committed = self.commit(&view, ops).await?;
        let reference = self.ratings.reference(owner_id, tier).await?;

        info!(
            "Battle {}: '{}' used '{}' rolling {} ({})",
            view.battle.id, character.name, attack.name, roll.total, tier
        );

        Ok(AttackReport {
            actor: character.name,
            attack: attack.name.clone(),
            dice,
            roll,
            tier,
            reference,
            hit,
            mastery: committed.mastery,
            progress: committed.progress,
            events,
            outcome,
            battle: BattleSummary::from_view(&view),
        })
    }

    /// Resolve a non-attack option on the actor's turn
    pub async fn battle_action(
        &self,
        scope: &ScopeKey,
        owner_id: &str,
        option: BattleOption,
        dice: Option<&str>,
        text: Option<&str>,
    ) -> GameResult<ActionReport> {
        let mut view = self
            .store
            .find_active(scope)
            .await?
            .ok_or(GameError::NoActiveBattle)?;
        let character = self.ledger.resolve(owner_id, None).await?;
        let actor_id = view
            .by_character(character.id)
            .map(|p| p.id)
            .ok_or(GameError::NotParticipant)?;
        ensure_turn(&view, actor_id)?;

        let dice = dice.map(str::trim).filter(|d| !d.is_empty());
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let name = character.name.clone();

        let mut ops = Vec::new();
        let mut roll = None;
        let mut success = None;
        let mut outcome = None;

        let detail = match option {
            BattleOption::Runaway => {
                let rolled = self.roll(dice.ok_or(GameError::MissingDice("runaway"))?)?;
                let threshold = rolled.max_possible.div_euclid(2);
                let escaped = rolled.total > threshold;
                success = Some(escaped);

                let detail = if escaped {
                    view.battle.end(EndReason::Fled);
                    outcome = Some(BattleOutcome::Fled { name: name.clone() });
                    format!(
                        "{} rolled {} (needed more than {}) and escaped!",
                        name, rolled.total, threshold
                    )
                } else {
                    format!(
                        "{} rolled {} (needed more than {}) and could not get away.",
                        name, rolled.total, threshold
                    )
                };
                roll = Some(rolled);
                detail
            }
            BattleOption::Defend => {
                participant_mut(&mut view, actor_id)?.defending = true;
                success = Some(true);
                format!(
                    "{} braces for the next attack ({}% less damage).",
                    name, DEFEND_REDUCTION_PERCENT
                )
            }
            BattleOption::Focus => {
                let rolled = self.roll(dice.ok_or(GameError::MissingDice("focus"))?)?;
                success = Some(rolled.is_max_roll);

                let detail = if rolled.is_max_roll {
                    let actor = participant_mut(&mut view, actor_id)?;
                    actor.focus_bonus = FOCUS_BONUS;
                    actor.skip_next_turn = true;
                    format!(
                        "{} is perfectly focused: +{} on the next attack, but their next turn is skipped.",
                        name, FOCUS_BONUS
                    )
                } else {
                    format!("{} rolled {} and could not focus.", name, rolled.total)
                };
                roll = Some(rolled);
                detail
            }
            BattleOption::Item => {
                let wanted = text.ok_or(GameError::MissingDescription("item"))?;
                let entry = self
                    .ledger
                    .inventory(character.id)
                    .await?
                    .into_iter()
                    .find(|e| e.item.name.eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| GameError::ItemNotFound(wanted.to_string()))?;

                let actor = participant_mut(&mut view, actor_id)?;
                let detail = match entry.item.effect {
                    ItemEffect::Heal { amount } => {
                        let gained = actor.heal(amount);
                        format!("{} used {} and recovered {} health.", name, entry.item.name, gained)
                    }
                    ItemEffect::RestoreSanity { amount } => {
                        let gained = actor.adjust_sanity(amount);
                        format!("{} used {} and recovered {} sanity.", name, entry.item.name, gained)
                    }
                    ItemEffect::Cleanse => {
                        actor.effects.clear();
                        format!("{} used {} and shook off every effect.", name, entry.item.name)
                    }
                    ItemEffect::Inert => {
                        format!("{} used {}. Nothing happens.", name, entry.item.name)
                    }
                };

                ops.push(LedgerOp::ConsumeItem {
                    character_id: character.id,
                    item: entry.item.name,
                });
                success = Some(true);
                detail
            }
            BattleOption::Special => {
                let description = text.ok_or(GameError::MissingDescription("special move"))?;
                if let Some(expression) = dice {
                    roll = Some(self.roll(expression)?);
                }
                format!("{}: {}", name, description)
            }
        };

        let mut events = Vec::new();
        if outcome.is_none() {
            outcome = self.settle(&mut view, &mut events, &mut ops)?;
        }
        self.commit(&view, ops).await?;

        info!("Battle {}: '{}' chose {}", view.battle.id, name, option);

        Ok(ActionReport {
            actor: name,
            option,
            roll,
            success,
            detail,
            events,
            outcome,
            battle: BattleSummary::from_view(&view),
        })
    }

    /// Current state of the scope's battle. Read-only.
    pub async fn status(&self, scope: &ScopeKey) -> GameResult<BattleSummary> {
        let view = self
            .store
            .find_active(scope)
            .await?
            .ok_or(GameError::NoActiveBattle)?;
        Ok(BattleSummary::from_view(&view))
    }

    /// End the scope's battle. There is no way back.
    pub async fn end_battle(&self, scope: &ScopeKey) -> GameResult<BattleSummary> {
        let mut view = self
            .store
            .find_active(scope)
            .await?
            .ok_or(GameError::NoActiveBattle)?;

        view.battle.end(EndReason::Ended);
        self.commit(&view, Vec::new()).await?;

        info!("Battle {} in {} ended", view.battle.id, scope);
        Ok(BattleSummary::from_view(&view))
    }

    /// Advance turns until a player has to act or the battle is decided.
    /// Returns the outcome if the battle ended.
    fn settle(
        &self,
        view: &mut BattleView,
        events: &mut Vec<TurnEvent>,
        ops: &mut Vec<LedgerOp>,
    ) -> GameResult<Option<BattleOutcome>> {
        for _ in 0..MAX_AUTO_TURNS {
            if !view.battle.is_active() {
                return Ok(None);
            }
            if let Some(outcome) = decide(view, ops) {
                return Ok(Some(outcome));
            }

            let Some(next_id) = view.battle.advance_turn() else {
                return Ok(None);
            };

            let next = participant_mut(view, next_id)?;
            let tick = next.effects.tick_all();
            if tick.health_loss > 0 || tick.sanity_loss > 0 || !tick.expired.is_empty() {
                next.take_damage(tick.health_loss);
                next.adjust_sanity(-tick.sanity_loss);
                events.push(TurnEvent::StatusTick {
                    name: next.name().to_string(),
                    health_loss: tick.health_loss,
                    sanity_loss: tick.sanity_loss,
                    expired: tick.expired,
                });
            }

            if next.is_defeated() {
                continue;
            }
            if next.skip_next_turn {
                next.skip_next_turn = false;
                events.push(TurnEvent::Skipped {
                    name: next.name().to_string(),
                });
                continue;
            }
            if next.is_player {
                return Ok(None);
            }

            self.npc_turn(view, next_id, events)?;
        }

        debug!("Battle {} stopped auto-resolving turns", view.battle.id);
        Ok(decide(view, ops))
    }

    /// NPC attack: its chain of base dice, scaled by level, at the first standing player
    fn npc_turn(
        &self,
        view: &mut BattleView,
        npc_id: i64,
        events: &mut Vec<TurnEvent>,
    ) -> GameResult<()> {
        let (dice, chain) = match &participant(view, npc_id)?.combatant {
            Combatant::Npc {
                base_damage_dice,
                level,
                attack_chain_max,
                ..
            } => (
                scale_expression(base_damage_dice, *level),
                (*attack_chain_max).clamp(1, MAX_CHAIN),
            ),
            Combatant::Character { .. } => return Ok(()),
        };

        for _ in 0..chain {
            let Some(target_id) = view.first_target_of(npc_id) else {
                break;
            };
            let roll = self.roll(&dice)?;
            let hit = strike(view, npc_id, target_id, &roll, None)?;
            events.push(TurnEvent::Hit(hit));
        }
        Ok(())
    }

    /// Write the snapshot and ledger changes in one transaction
    async fn commit(&self, view: &BattleView, ops: Vec<LedgerOp>) -> GameResult<Committed> {
        let mut tx = self.store.pool().begin().await?;
        BattleStore::save_on(&mut tx, view).await?;

        let mut committed = Committed::default();
        for op in ops {
            match op {
                LedgerOp::PerfectHit {
                    character_id,
                    attack_id,
                } => {
                    committed.mastery = Some(
                        CharacterLedger::record_perfect_hit_on(&mut tx, character_id, attack_id)
                            .await?,
                    );
                }
                LedgerOp::Experience {
                    character_id,
                    amount,
                } => {
                    committed.progress = Some(
                        CharacterLedger::award_experience_on(&mut tx, character_id, amount).await?,
                    );
                }
                LedgerOp::ConsumeItem { character_id, item } => {
                    CharacterLedger::consume_item_on(&mut tx, character_id, &item, 1).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(committed)
    }
}

/// End the battle if a side has fallen, queueing victory experience
fn decide(view: &mut BattleView, ops: &mut Vec<LedgerOp>) -> Option<BattleOutcome> {
    let players_fell = view.fallen_side()?;

    if players_fell {
        let losers = view.players().map(|p| p.name().to_string()).collect();
        view.battle.end(EndReason::Defeat);
        info!("Battle {} lost", view.battle.id);
        return Some(BattleOutcome::Defeat { losers });
    }

    let experience: i64 = view
        .opponents()
        .map(|p| EXPERIENCE_PER_NPC_LEVEL * p.combatant.level().max(1))
        .sum();
    let mut winners = Vec::new();
    for p in view.players().filter(|p| !p.is_defeated()) {
        winners.push(p.name().to_string());
        if let Some(character_id) = p.combatant.character_id() {
            ops.push(LedgerOp::Experience {
                character_id,
                amount: experience,
            });
        }
    }

    view.battle.end(EndReason::Victory);
    info!("Battle {} won by {}", view.battle.id, winners.join(", "));
    Some(BattleOutcome::Victory {
        winners,
        experience,
    })
}

/// Resolve one hit from attacker to target and apply it
fn strike(
    view: &mut BattleView,
    attacker_id: i64,
    target_id: i64,
    roll: &RollOutcome,
    affinity: Option<&Affinity>,
) -> GameResult<HitReport> {
    let attacker = participant(view, attacker_id)?;
    let attacker_name = attacker.name().to_string();
    let attacker_effects = attacker.effects.clone();
    let focus_bonus = attacker.focus_bonus;
    let attacker_wounded = attacker.is_wounded();
    let target_defending = participant(view, target_id)?.defending;
    let effect = affinity.map(|a| &a.effect);

    let result = resolve_hit(&HitContext {
        rolled: roll.total,
        focus_bonus,
        attacker_effects: &attacker_effects,
        attacker_wounded,
        affinity: effect,
        round: view.battle.round,
        target_defending,
    });
    let transfer = sanity_transfer(effect, result.final_damage);

    let target = participant_mut(view, target_id)?;
    target.defending = false;
    let dealt = target.take_damage(result.final_damage);
    let sanity_loss = -target.adjust_sanity(-transfer.target_loss);

    let inflicted = affinity
        .and_then(|a| a.inflicted_status.map(|kind| (kind, a.status_duration)))
        .filter(|_| dealt > 0);
    if let Some((kind, turns)) = inflicted {
        target.effects.add(StatusEffect::inflicted(kind, turns));
    }

    let report = HitReport {
        attacker: attacker_name,
        target: target.name().to_string(),
        roll: roll.clone(),
        damage: dealt,
        modifiers: result.modifiers.iter().map(|m| m.to_string()).collect(),
        target_health: target.health,
        target_max_health: target.max_health,
        sanity_loss,
        sanity_gain: 0,
        inflicted: inflicted.map(|(kind, _)| kind),
        target_defeated: target.is_defeated(),
    };

    let attacker = participant_mut(view, attacker_id)?;
    attacker.focus_bonus = 0;
    let sanity_gain = attacker.adjust_sanity(transfer.attacker_gain);

    Ok(HitReport {
        sanity_gain,
        ..report
    })
}

fn ensure_turn(view: &BattleView, participant_id: i64) -> GameResult<()> {
    if view.battle.current_turn == Some(participant_id) {
        return Ok(());
    }
    let waiting_on = view
        .current()
        .map(|p| p.name().to_string())
        .unwrap_or_else(|| "nobody".to_string());
    Err(GameError::NotYourTurn(waiting_on))
}

fn participant(view: &BattleView, id: i64) -> GameResult<&super::state::Participant> {
    view.participant(id)
        .ok_or_else(|| GameError::Corrupt(format!("participant {} missing from battle", id)))
}

fn participant_mut(view: &mut BattleView, id: i64) -> GameResult<&mut super::state::Participant> {
    view.participant_mut(id)
        .ok_or_else(|| GameError::Corrupt(format!("participant {} missing from battle", id)))
}
