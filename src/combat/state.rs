//! Battle state
//!
//! In-memory snapshot of one battle and its participants:
//! - Battle lifecycle status and scope
//! - Turn order, current turn pointer and round counter
//! - Battle-scoped health/sanity pools per participant
//! - Transient participant state (defending, focus, skipped turn)
//!
//! A snapshot is loaded per command, mutated, then written back in one
//! transaction. Nothing here touches storage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use super::effects::ParticipantEffects;

/// Chat context a battle is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub guild_id: String,
    pub channel_id: String,
}

impl ScopeKey {
    pub fn new(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.guild_id, self.channel_id)
    }
}

/// Battle lifecycle. `Paused` is reserved and never entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    Active,
    Ended,
    Paused,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::Active => "active",
            BattleStatus::Ended => "ended",
            BattleStatus::Paused => "paused",
        }
    }
}

impl FromStr for BattleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BattleStatus::Active),
            "ended" => Ok(BattleStatus::Ended),
            "paused" => Ok(BattleStatus::Paused),
            other => Err(format!("unknown battle status '{}'", other)),
        }
    }
}

impl std::fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a battle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A player side participant dropped every opponent
    Victory,
    /// Every player side participant dropped
    Defeat,
    /// A player ran away
    Fled,
    /// Ended explicitly
    Ended,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Victory => "victory",
            EndReason::Defeat => "defeat",
            EndReason::Fled => "fled",
            EndReason::Ended => "ended",
        }
    }
}

impl FromStr for EndReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "victory" => Ok(EndReason::Victory),
            "defeat" => Ok(EndReason::Defeat),
            "fled" => Ok(EndReason::Fled),
            "ended" => Ok(EndReason::Ended),
            other => Err(format!("unknown end reason '{}'", other)),
        }
    }
}

/// Battle record
#[derive(Debug, Clone, Serialize)]
pub struct Battle {
    pub id: i64,
    pub scope: ScopeKey,
    pub status: BattleStatus,
    /// Participant ids in turn order
    pub turn_order: Vec<i64>,
    pub current_turn: Option<i64>,
    pub round: i64,
    /// Bumped on every write; guards against interleaved commands
    pub version: i64,
    pub end_reason: Option<EndReason>,
    pub created_at: String,
    pub last_activity: String,
}

impl Battle {
    pub fn is_active(&self) -> bool {
        self.status == BattleStatus::Active
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.current_turn?;
        self.turn_order.iter().position(|&id| id == current)
    }

    /// Move the turn pointer to the next participant.
    /// Wrapping past the end of the order starts a new round.
    pub fn advance_turn(&mut self) -> Option<i64> {
        if self.turn_order.is_empty() {
            self.current_turn = None;
            return None;
        }

        let next = match self.current_index() {
            Some(index) => index + 1,
            None => 0,
        };

        let next = if next >= self.turn_order.len() {
            self.round += 1;
            0
        } else {
            next
        };

        self.current_turn = Some(self.turn_order[next]);
        self.current_turn
    }

    /// Transition to `Ended`, dropping the turn pointer
    pub fn end(&mut self, reason: EndReason) {
        self.status = BattleStatus::Ended;
        self.end_reason = Some(reason);
        self.current_turn = None;
    }
}

/// What a participant stands in for
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Combatant {
    Character {
        id: i64,
        owner_id: String,
        name: String,
        avatar_url: String,
        level: i64,
    },
    Npc {
        id: i64,
        name: String,
        avatar_url: Option<String>,
        level: i64,
        base_damage_dice: String,
        attack_chain_max: i64,
        is_boss: bool,
    },
}

impl Combatant {
    pub fn name(&self) -> &str {
        match self {
            Combatant::Character { name, .. } | Combatant::Npc { name, .. } => name,
        }
    }

    pub fn level(&self) -> i64 {
        match self {
            Combatant::Character { level, .. } | Combatant::Npc { level, .. } => *level,
        }
    }

    pub fn avatar_url(&self) -> Option<&str> {
        match self {
            Combatant::Character { avatar_url, .. } if !avatar_url.is_empty() => Some(avatar_url),
            Combatant::Npc { avatar_url, .. } => avatar_url.as_deref(),
            _ => None,
        }
    }

    pub fn character_id(&self) -> Option<i64> {
        match self {
            Combatant::Character { id, .. } => Some(*id),
            Combatant::Npc { .. } => None,
        }
    }
}

/// A battle-scoped snapshot of a character or NPC
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: i64,
    pub combatant: Combatant,
    pub is_player: bool,
    pub health: i64,
    pub max_health: i64,
    pub sanity: i64,
    pub max_sanity: i64,
    /// Reduce the next incoming attack
    pub defending: bool,
    /// Added to the next outgoing hit
    pub focus_bonus: i64,
    pub skip_next_turn: bool,
    #[serde(skip)]
    pub effects: ParticipantEffects,
    /// Attack id -> first round the attack is usable again
    #[serde(skip)]
    pub cooldowns: HashMap<i64, i64>,
}

impl Participant {
    pub fn name(&self) -> &str {
        self.combatant.name()
    }

    pub fn is_defeated(&self) -> bool {
        self.health <= 0
    }

    pub fn is_wounded(&self) -> bool {
        self.health < self.max_health
    }

    /// Lose health, never below zero. Returns the health actually lost.
    pub fn take_damage(&mut self, amount: i64) -> i64 {
        let lost = amount.clamp(0, self.health);
        self.health -= lost;
        lost
    }

    /// Regain health, never above max. Returns the health actually gained.
    pub fn heal(&mut self, amount: i64) -> i64 {
        let gained = amount.clamp(0, self.max_health - self.health);
        self.health += gained;
        gained
    }

    /// Shift sanity by a delta, clamped into `[0, max_sanity]`
    pub fn adjust_sanity(&mut self, delta: i64) -> i64 {
        let before = self.sanity;
        self.sanity = (self.sanity.saturating_add(delta)).clamp(0, self.max_sanity);
        self.sanity - before
    }

    /// Round from which an attack is usable again, if it is still cooling down
    pub fn cooldown_until(&self, attack_id: i64, round: i64) -> Option<i64> {
        self.cooldowns
            .get(&attack_id)
            .copied()
            .filter(|&ready| ready > round)
    }
}

/// A battle together with all of its participants
#[derive(Debug, Clone)]
pub struct BattleView {
    pub battle: Battle,
    pub participants: Vec<Participant>,
}

impl BattleView {
    pub fn participant(&self, id: i64) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: i64) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// Participant standing in for a character
    pub fn by_character(&self, character_id: i64) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.combatant.character_id() == Some(character_id))
    }

    pub fn current(&self) -> Option<&Participant> {
        self.battle.current_turn.and_then(|id| self.participant(id))
    }

    pub fn players(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_player)
    }

    pub fn opponents(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.is_player)
    }

    /// First standing participant on the other side
    pub fn first_target_of(&self, participant_id: i64) -> Option<i64> {
        let is_player = self.participant(participant_id)?.is_player;
        self.participants
            .iter()
            .find(|p| p.is_player != is_player && !p.is_defeated())
            .map(|p| p.id)
    }

    /// The side that has been wiped out, if any: `Some(true)` when every
    /// player is down, `Some(false)` when every opponent is down.
    pub fn fallen_side(&self) -> Option<bool> {
        if self.players().all(|p| p.is_defeated()) {
            Some(true)
        } else if self.opponents().all(|p| p.is_defeated()) {
            Some(false)
        } else {
            None
        }
    }
}
