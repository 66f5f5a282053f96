//! Global game catalog
//!
//! Reference data shared by every character and battle:
//! - Attack types (Slash, Pierce, Blunt, Magic)
//! - Affinities with their structured combat effect
//! - Attack definitions
//! - Items and their use effects
//! - NPC opponents

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::combat::dice::parse_dice;
use crate::combat::effects::StatusKind;
use crate::error::{GameError, GameResult};

/// Combat modifier carried by an affinity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AffinityEffect {
    /// Outgoing damage multiplied while the attacker is wounded
    DamageMultiplier { multiplier: f64 },
    /// Divides the opponent's dice
    DiceDivision { divisor: f64 },
    /// Target loses one sanity per point of damage dealt
    SanityReductionPerDamage,
    /// Moves sanity from the target to the attacker on every hit
    SanitySteal { amount: i64 },
    /// Grows stronger as the battle drags on
    BattleScaling,
    /// Reflects damage after losing half the health bar
    DamageReflection,
    /// Locks one of the opponent's attacks
    AttackLock,
}

impl AffinityEffect {
    /// Short label for sheets and embeds
    pub fn label(&self) -> &'static str {
        match self {
            AffinityEffect::DamageMultiplier { .. } => "damage multiplier",
            AffinityEffect::DiceDivision { .. } => "dice division",
            AffinityEffect::SanityReductionPerDamage => "sanity reduction per damage",
            AffinityEffect::SanitySteal { .. } => "sanity steal",
            AffinityEffect::BattleScaling => "battle scaling",
            AffinityEffect::DamageReflection => "damage reflection",
            AffinityEffect::AttackLock => "attack lock",
        }
    }
}

/// What happens when an item is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemEffect {
    Heal { amount: i64 },
    RestoreSanity { amount: i64 },
    /// Removes every status effect
    Cleanse,
    /// Flavor only
    Inert,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttackType {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Affinity {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub effect: AffinityEffect,
    pub inflicted_status: Option<StatusKind>,
    /// Turns the inflicted status lasts
    pub status_duration: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attack {
    pub id: i64,
    pub name: String,
    pub type_name: String,
    pub affinity: Option<Affinity>,
    pub description: String,
    pub base_damage_dice: String,
    pub effect_description: String,
    pub health_cost: i64,
    pub sanity_cost: i64,
    /// Rounds before the attack can be used again
    pub cooldown_rounds: i64,
}

/// Input for defining a new attack
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAttack {
    pub name: String,
    pub type_name: String,
    pub affinity: Option<String>,
    #[serde(default)]
    pub description: String,
    pub base_damage_dice: String,
    #[serde(default)]
    pub effect_description: String,
    #[serde(default)]
    pub health_cost: i64,
    #[serde(default)]
    pub sanity_cost: i64,
    #[serde(default)]
    pub cooldown_rounds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub item_type: String,
    pub rarity: String,
    pub description: String,
    pub effect: ItemEffect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub item_type: String,
    pub rarity: String,
    #[serde(default)]
    pub description: String,
    pub effect: ItemEffect,
}

#[derive(Debug, Clone, Serialize)]
pub struct Npc {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub avatar_url: Option<String>,
    pub health_max: i64,
    pub sanity_max: i64,
    pub level: i64,
    pub base_damage_dice: String,
    pub attack_chain_max: i64,
    pub is_boss: bool,
    pub rarity: String,
}

const ATTACK_SELECT: &str = r#"
    SELECT a.id, a.name, t.name AS type_name, a.description, a.base_damage_dice,
           a.effect_description, a.health_cost, a.sanity_cost, a.cooldown_rounds,
           f.id AS affinity_id, f.name AS affinity_name, f.description AS affinity_description,
           f.effect AS affinity_effect, f.inflicted_status, f.status_duration
    FROM attacks a
    JOIN attack_types t ON a.type_id = t.id
    LEFT JOIN affinities f ON a.affinity_id = f.id
"#;

const NPC_SELECT: &str = r#"
    SELECT id, name, description, avatar_url, health_max, sanity_max, level,
           base_damage_dice, attack_chain_max, is_boss, rarity
    FROM npcs
"#;

/// Catalog access over the shared pool
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Define a new attack. Names are globally unique (case-insensitive).
    pub async fn create_attack(&self, new: &NewAttack) -> GameResult<Attack> {
        parse_dice(&new.base_damage_dice)?;

        let type_id = self.attack_type(&new.type_name).await?.id;
        let affinity_id = match &new.affinity {
            Some(name) => Some(self.affinity(name).await?.id),
            None => None,
        };

        let result = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO attacks (name, type_id, affinity_id, description, base_damage_dice,
                                 effect_description, health_cost, sanity_cost, cooldown_rounds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new.name)
        .bind(type_id)
        .bind(affinity_id)
        .bind(&new.description)
        .bind(new.base_damage_dice.trim())
        .bind(&new.effect_description)
        .bind(new.health_cost.max(0))
        .bind(new.sanity_cost.max(0))
        .bind(new.cooldown_rounds.max(0))
        .fetch_one(&self.pool)
        .await;

        let (id,) = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(GameError::DuplicateName {
                    kind: "attack",
                    name: new.name.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        info!("Defined attack '{}' ({})", new.name, id);
        self.attack_by_id(id)
            .await?
            .ok_or_else(|| GameError::Corrupt(format!("attack {} vanished after insert", id)))
    }

    pub async fn attack_by_id(&self, id: i64) -> GameResult<Option<Attack>> {
        let row = sqlx::query(&format!("{} WHERE a.id = ?", ATTACK_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| attack_from_row(&r)).transpose()
    }

    /// Look up an attack by name (case-insensitive)
    pub async fn attack_by_name(&self, name: &str) -> GameResult<Option<Attack>> {
        let row = sqlx::query(&format!("{} WHERE a.name = ? COLLATE NOCASE", ATTACK_SELECT))
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| attack_from_row(&r)).transpose()
    }

    /// All attacks in catalog order
    pub async fn attacks(&self) -> GameResult<Vec<Attack>> {
        let rows = sqlx::query(&format!("{} ORDER BY a.id", ATTACK_SELECT))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(attack_from_row).collect()
    }

    pub async fn attack_type(&self, name: &str) -> GameResult<AttackType> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, description FROM attack_types WHERE name = ?")
                .bind(name.trim())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(id, name, description)| AttackType {
            id,
            name,
            description,
        })
        .ok_or_else(|| GameError::UnknownCatalogEntry {
            kind: "attack type",
            name: name.to_string(),
        })
    }

    pub async fn attack_types(&self) -> GameResult<Vec<AttackType>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, description FROM attack_types ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, description)| AttackType {
                id,
                name,
                description,
            })
            .collect())
    }

    pub async fn affinity(&self, name: &str) -> GameResult<Affinity> {
        let row = sqlx::query(
            "SELECT id, name, description, effect, inflicted_status, status_duration
             FROM affinities WHERE name = ?",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => affinity_from_row(&r),
            None => Err(GameError::UnknownCatalogEntry {
                kind: "affinity",
                name: name.to_string(),
            }),
        }
    }

    pub async fn affinities(&self) -> GameResult<Vec<Affinity>> {
        let rows = sqlx::query(
            "SELECT id, name, description, effect, inflicted_status, status_duration
             FROM affinities ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(affinity_from_row).collect()
    }

    pub async fn create_item(&self, new: &NewItem) -> GameResult<Item> {
        let effect = serde_json::to_string(&new.effect)?;
        let result = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO items (name, item_type, rarity, description, effect)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new.name)
        .bind(&new.item_type)
        .bind(&new.rarity)
        .bind(&new.description)
        .bind(&effect)
        .fetch_one(&self.pool)
        .await;

        let (id,) = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(GameError::DuplicateName {
                    kind: "item",
                    name: new.name.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Item {
            id,
            name: new.name.clone(),
            item_type: new.item_type.clone(),
            rarity: new.rarity.clone(),
            description: new.description.clone(),
            effect: new.effect,
        })
    }

    /// Look up an item by name (case-insensitive)
    pub async fn item(&self, name: &str) -> GameResult<Option<Item>> {
        let row = sqlx::query(
            "SELECT id, name, item_type, rarity, description, effect FROM items WHERE name = ?",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| item_from_row(&r)).transpose()
    }

    /// Look up an NPC by exact name
    pub async fn npc(&self, name: &str) -> GameResult<Option<Npc>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", NPC_SELECT))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| npc_from_row(&r)).transpose()
    }

    pub async fn npcs(&self) -> GameResult<Vec<Npc>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", NPC_SELECT))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(npc_from_row).collect()
    }
}

pub(crate) fn attack_from_row(row: &SqliteRow) -> GameResult<Attack> {
    let affinity = match row.try_get::<Option<i64>, _>("affinity_id")? {
        Some(id) => Some(Affinity {
            id,
            name: row.try_get("affinity_name")?,
            description: row.try_get("affinity_description")?,
            effect: serde_json::from_str(&row.try_get::<String, _>("affinity_effect")?)?,
            inflicted_status: parse_status(row.try_get("inflicted_status")?),
            status_duration: row.try_get("status_duration")?,
        }),
        None => None,
    };

    Ok(Attack {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        type_name: row.try_get("type_name")?,
        affinity,
        description: row.try_get("description")?,
        base_damage_dice: row.try_get("base_damage_dice")?,
        effect_description: row.try_get("effect_description")?,
        health_cost: row.try_get("health_cost")?,
        sanity_cost: row.try_get("sanity_cost")?,
        cooldown_rounds: row.try_get("cooldown_rounds")?,
    })
}

fn affinity_from_row(row: &SqliteRow) -> GameResult<Affinity> {
    Ok(Affinity {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        effect: serde_json::from_str(&row.try_get::<String, _>("effect")?)?,
        inflicted_status: parse_status(row.try_get("inflicted_status")?),
        status_duration: row.try_get("status_duration")?,
    })
}

pub(crate) fn item_from_row(row: &SqliteRow) -> GameResult<Item> {
    Ok(Item {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        item_type: row.try_get("item_type")?,
        rarity: row.try_get("rarity")?,
        description: row.try_get("description")?,
        effect: serde_json::from_str(&row.try_get::<String, _>("effect")?)?,
    })
}

fn npc_from_row(row: &SqliteRow) -> GameResult<Npc> {
    Ok(Npc {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        avatar_url: row.try_get("avatar_url")?,
        health_max: row.try_get("health_max")?,
        sanity_max: row.try_get("sanity_max")?,
        level: row.try_get("level")?,
        base_damage_dice: row.try_get("base_damage_dice")?,
        attack_chain_max: row.try_get("attack_chain_max")?,
        is_boss: row.try_get("is_boss")?,
        rarity: row.try_get("rarity")?,
    })
}

fn parse_status(raw: Option<String>) -> Option<StatusKind> {
    raw.and_then(|s| s.parse().ok())
}
