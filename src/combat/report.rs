//! Combat results and their presentation
//!
//! The engine returns structured reports; `to_embed` renders each one into
//! the payload handed to the chat renderer.

use serde::Serialize;

use super::effects::StatusKind;
use super::state::{BattleStatus, BattleView, EndReason, Participant};
use crate::characters::{Mastery, Progress};
use crate::combat::dice::RollOutcome;
use crate::embed::{colors, pool, Embed};
use crate::rating::Tier;

/// One participant's line in a battle summary
#[derive(Debug, Clone, Serialize)]
pub struct SideLine {
    pub name: String,
    pub health: i64,
    pub max_health: i64,
    pub sanity: i64,
    pub max_sanity: i64,
    pub defending: bool,
    pub effects: Vec<String>,
    #[serde(skip)]
    pub avatar_url: Option<String>,
}

impl SideLine {
    fn from_participant(p: &Participant) -> Self {
        Self {
            name: p.name().to_string(),
            health: p.health,
            max_health: p.max_health,
            sanity: p.sanity,
            max_sanity: p.max_sanity,
            defending: p.defending,
            effects: p
                .effects
                .active()
                .map(|e| format!("{} ({} turns)", e.kind, e.remaining_turns))
                .collect(),
            avatar_url: p.combatant.avatar_url().map(str::to_string),
        }
    }

    fn render(&self) -> String {
        let mut out = format!(
            "Health: {}\nSanity: {}",
            pool(self.health, self.max_health),
            pool(self.sanity, self.max_sanity)
        );
        if self.defending {
            out.push_str("\nDefending");
        }
        if !self.effects.is_empty() {
            out.push_str(&format!("\nEffects: {}", self.effects.join(", ")));
        }
        out
    }
}

/// Read-only picture of a battle
#[derive(Debug, Clone, Serialize)]
pub struct BattleSummary {
    pub battle_id: i64,
    pub round: i64,
    pub status: BattleStatus,
    pub players: Vec<SideLine>,
    pub opponents: Vec<SideLine>,
    pub current_turn: Option<String>,
    pub end_reason: Option<EndReason>,
}

impl BattleSummary {
    pub fn from_view(view: &BattleView) -> Self {
        Self {
            battle_id: view.battle.id,
            round: view.battle.round,
            status: view.battle.status,
            players: view.players().map(SideLine::from_participant).collect(),
            opponents: view.opponents().map(SideLine::from_participant).collect(),
            current_turn: view.current().map(|p| p.name().to_string()),
            end_reason: view.battle.end_reason,
        }
    }

    fn title(&self) -> String {
        let names = |side: &[SideLine]| {
            side.iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{} vs {}", names(&self.players), names(&self.opponents))
    }

    /// Append side and turn fields to an embed
    fn fields_into(&self, mut embed: Embed) -> Embed {
        for line in self.players.iter().chain(self.opponents.iter()) {
            embed = embed.field(&line.name, line.render(), true);
        }
        if let Some(current) = &self.current_turn {
            embed = embed.field("Turn", current, false);
        }
        embed.footer(format!("Battle #{}", self.battle_id))
    }

    pub fn to_embed(&self) -> Embed {
        let headline = match self.status {
            BattleStatus::Active => format!("Round {}", self.round),
            _ => format!("Battle over after {} rounds", self.round),
        };
        let embed = Embed::new(self.title())
            .description(headline)
            .color(colors::BATTLE)
            .thumbnail(self.opponents.first().and_then(|o| o.avatar_url.as_deref()));
        self.fields_into(embed)
    }
}

/// One resolved hit
#[derive(Debug, Clone, Serialize)]
pub struct HitReport {
    pub attacker: String,
    pub target: String,
    pub roll: RollOutcome,
    pub damage: i64,
    pub modifiers: Vec<String>,
    pub target_health: i64,
    pub target_max_health: i64,
    pub sanity_loss: i64,
    pub sanity_gain: i64,
    pub inflicted: Option<StatusKind>,
    pub target_defeated: bool,
}

impl HitReport {
    fn render(&self) -> String {
        let mut out = format!(
            "{} rolled {} ({}) and dealt {} damage to {} ({})",
            self.attacker,
            self.roll.total,
            self.roll.expression,
            self.damage,
            self.target,
            pool(self.target_health, self.target_max_health)
        );
        if !self.modifiers.is_empty() {
            out.push_str(&format!(" [{}]", self.modifiers.join(", ")));
        }
        if self.sanity_loss > 0 {
            out.push_str(&format!(", {} sanity lost", self.sanity_loss));
        }
        if let Some(status) = self.inflicted {
            out.push_str(&format!(", inflicted {}", status));
        }
        if self.target_defeated {
            out.push_str(&format!(". {} is down!", self.target));
        }
        out
    }
}

/// Something that happened while turns advanced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    StatusTick {
        name: String,
        health_loss: i64,
        sanity_loss: i64,
        expired: Vec<StatusKind>,
    },
    Skipped {
        name: String,
    },
    Hit(HitReport),
}

impl TurnEvent {
    fn render(&self) -> String {
        match self {
            TurnEvent::StatusTick {
                name,
                health_loss,
                sanity_loss,
                expired,
            } => {
                let mut parts = Vec::new();
                if *health_loss > 0 {
                    parts.push(format!("{} health", health_loss));
                }
                if *sanity_loss > 0 {
                    parts.push(format!("{} sanity", sanity_loss));
                }
                let mut out = if parts.is_empty() {
                    name.clone()
                } else {
                    format!("{} lost {} to status effects", name, parts.join(" and "))
                };
                if !expired.is_empty() {
                    let names: Vec<String> = expired.iter().map(|k| k.to_string()).collect();
                    out.push_str(&format!(" ({} wore off)", names.join(", ")));
                }
                out
            }
            TurnEvent::Skipped { name } => format!("{} skips this turn", name),
            TurnEvent::Hit(hit) => hit.render(),
        }
    }
}

/// How a battle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BattleOutcome {
    Victory { winners: Vec<String>, experience: i64 },
    Defeat { losers: Vec<String> },
    Fled { name: String },
}

impl BattleOutcome {
    fn render(&self) -> String {
        match self {
            BattleOutcome::Victory {
                winners,
                experience,
            } => format!("{} won and earned {} experience!", winners.join(", "), experience),
            BattleOutcome::Defeat { losers } => format!("{} fell in battle.", losers.join(", ")),
            BattleOutcome::Fled { name } => format!("{} got away safely.", name),
        }
    }
}

fn with_events(mut embed: Embed, events: &[TurnEvent], outcome: Option<&BattleOutcome>) -> Embed {
    if !events.is_empty() {
        let lines: Vec<String> = events.iter().map(TurnEvent::render).collect();
        embed = embed.field("Then", lines.join("\n"), false);
    }
    if let Some(outcome) = outcome {
        embed = embed.field("Result", outcome.render(), false);
    }
    embed
}

/// Result of an attack
#[derive(Debug, Clone, Serialize)]
pub struct AttackReport {
    pub actor: String,
    pub attack: String,
    /// Damage dice after level scaling
    pub dice: String,
    pub roll: RollOutcome,
    pub tier: Tier,
    /// Cosmetic reference for the tier
    pub reference: String,
    /// None for a free-form roll outside the fight
    pub hit: Option<HitReport>,
    pub mastery: Option<Mastery>,
    pub progress: Option<Progress>,
    pub events: Vec<TurnEvent>,
    pub outcome: Option<BattleOutcome>,
    pub battle: BattleSummary,
}

impl AttackReport {
    pub fn to_embed(&self) -> Embed {
        let color = match self.tier {
            Tier::Perfect => colors::SUCCESS,
            Tier::Great | Tier::Good => colors::INFO,
            Tier::Deflected => colors::WARNING,
        };

        let rolls: Vec<String> = self.roll.rolls.iter().map(|r| r.to_string()).collect();
        let mut embed = Embed::new(format!("{} uses {}", self.actor, self.attack))
            .description(self.tier.headline())
            .color(color)
            .image(&self.reference)
            .field("Dice", &self.dice, true)
            .field("Rolls", format!("[{}]", rolls.join(", ")), true)
            .field("Total", self.roll.total.to_string(), true);

        if let Some(hit) = &self.hit {
            embed = embed.field("Hit", hit.render(), false);
        }
        if let Some(mastery) = &self.mastery {
            let text = if mastery.leveled_up {
                format!("{} reached mastery level {}!", self.attack, mastery.level)
            } else {
                format!("Perfect hits: {}", mastery.perfect_hits)
            };
            embed = embed.field("Mastery", text, false);
        }
        if let Some(progress) = &self.progress {
            if progress.levels_gained > 0 {
                embed = embed.field(
                    "Level Up",
                    format!("{} is now level {}", self.actor, progress.level),
                    false,
                );
            }
        }

        embed = with_events(embed, &self.events, self.outcome.as_ref());
        self.battle.fields_into(embed)
    }
}

/// Non-attack battle options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleOption {
    Runaway,
    Defend,
    Focus,
    Item,
    Special,
}

impl std::str::FromStr for BattleOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "runaway" | "run" | "flee" => Ok(BattleOption::Runaway),
            "defend" => Ok(BattleOption::Defend),
            "focus" => Ok(BattleOption::Focus),
            "item" => Ok(BattleOption::Item),
            "special" => Ok(BattleOption::Special),
            other => Err(format!("unknown battle option '{}'", other)),
        }
    }
}

impl std::fmt::Display for BattleOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BattleOption::Runaway => "runaway",
            BattleOption::Defend => "defend",
            BattleOption::Focus => "focus",
            BattleOption::Item => "item",
            BattleOption::Special => "special",
        };
        write!(f, "{}", s)
    }
}

/// Result of a battle option
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub actor: String,
    pub option: BattleOption,
    pub roll: Option<RollOutcome>,
    /// None when the option has no success condition
    pub success: Option<bool>,
    pub detail: String,
    pub events: Vec<TurnEvent>,
    pub outcome: Option<BattleOutcome>,
    pub battle: BattleSummary,
}

impl ActionReport {
    pub fn to_embed(&self) -> Embed {
        let color = match self.success {
            Some(true) => colors::SUCCESS,
            Some(false) => colors::WARNING,
            None => colors::INFO,
        };
        let title = match self.option {
            BattleOption::Runaway => format!("{} tries to run away", self.actor),
            BattleOption::Defend => format!("{} defends", self.actor),
            BattleOption::Focus => format!("{} focuses", self.actor),
            BattleOption::Item => format!("{} uses an item", self.actor),
            BattleOption::Special => format!("{} does something special", self.actor),
        };

        let mut embed = Embed::new(title).description(&self.detail).color(color);
        if let Some(roll) = &self.roll {
            embed = embed
                .field("Dice", &roll.expression, true)
                .field("Total", roll.total.to_string(), true);
        }

        embed = with_events(embed, &self.events, self.outcome.as_ref());
        self.battle.fields_into(embed)
    }
}
