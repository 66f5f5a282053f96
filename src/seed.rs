//! Database initialization and default catalog
//!
//! Provides the one-time setup used by the multilands_seed tool. Seeding is
//! idempotent: rows that already exist are left untouched.

use std::path::Path;

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::catalog::{AffinityEffect, ItemEffect};
use crate::combat::StatusKind;
use crate::db::Database;

struct AffinitySeed {
    name: &'static str,
    description: &'static str,
    effect: AffinityEffect,
    inflicted_status: StatusKind,
}

struct NpcSeed {
    name: &'static str,
    description: &'static str,
    avatar_url: &'static str,
    health_max: i64,
    sanity_max: i64,
    level: i64,
    base_damage_dice: &'static str,
    attack_chain_max: i64,
    is_boss: bool,
    rarity: &'static str,
}

const AFFINITIES: &[AffinitySeed] = &[
    AffinitySeed {
        name: "Wrath",
        description: "Extra damage on the next attack after you take damage.",
        effect: AffinityEffect::DamageMultiplier { multiplier: 1.5 },
        inflicted_status: StatusKind::Fire,
    },
    AffinitySeed {
        name: "Lust",
        description: "Divides your opponent's dice by 1.5x.",
        effect: AffinityEffect::DiceDivision { divisor: 1.5 },
        inflicted_status: StatusKind::Bleed,
    },
    AffinitySeed {
        name: "Sloth",
        description: "Reduces your opponent's sanity by 1 every 1 damage in an attack. Stacks.",
        effect: AffinityEffect::SanityReductionPerDamage,
        inflicted_status: StatusKind::Slowness,
    },
    AffinitySeed {
        name: "Gluttony",
        description: "\"Steals\" 5 sanity every attack you do.",
        effect: AffinityEffect::SanitySteal { amount: 5 },
        inflicted_status: StatusKind::Electrified,
    },
    AffinitySeed {
        name: "Greed",
        description: "Gets stronger the more the battle goes on for.",
        effect: AffinityEffect::BattleScaling,
        inflicted_status: StatusKind::Weakness,
    },
    AffinitySeed {
        name: "Pride",
        description: "Reflects damage if you take more than half your health bar.",
        effect: AffinityEffect::DamageReflection,
        inflicted_status: StatusKind::Blindness,
    },
    AffinitySeed {
        name: "Envy",
        description: "Can \"lock\" an attack from an enemy.",
        effect: AffinityEffect::AttackLock,
        inflicted_status: StatusKind::Poison,
    },
];

const ATTACK_TYPES: &[(&str, &str)] = &[
    ("Slash", "Clean, precise, fast. Low-damage yet fast weapon."),
    ("Pierce", "Calculated, surgical, deadly. Jack-of-all-trades, master-of-none weapon."),
    ("Blunt", "Crushing, chaotic, stunning. Slow yet damaging weapon."),
    ("Magic", "Weird, wild, do whatever you want. Balanced."),
];

const NPCS: &[NpcSeed] = &[
    NpcSeed {
        name: "Water Bottle",
        description: "A water bottle",
        avatar_url: "https://i.imgur.com/exampleSpider.png",
        health_max: 45,
        sanity_max: 30,
        level: 2,
        base_damage_dice: "1d6",
        attack_chain_max: 1,
        is_boss: false,
        rarity: "Common",
    },
    NpcSeed {
        name: "GOOFY NEBULA",
        description: "nebulas inner demon",
        avatar_url: "https://i.imgur.com/exampleNebula.png",
        health_max: 500,
        sanity_max: 300,
        level: 20,
        base_damage_dice: "4d12+10",
        attack_chain_max: 3,
        is_boss: true,
        rarity: "Boss",
    },
    NpcSeed {
        name: "Wingslompson",
        description: "eldsnackldson brother",
        avatar_url: "https://i.imgur.com/exampleSpider.png",
        health_max: 45,
        sanity_max: 30,
        level: 2,
        base_damage_dice: "1d6",
        attack_chain_max: 1,
        is_boss: false,
        rarity: "Common",
    },
];

/// Insert the default catalog. Safe to run repeatedly.
pub async fn seed_defaults(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    for affinity in AFFINITIES {
        sqlx::query(
            "INSERT OR IGNORE INTO affinities (name, description, effect, inflicted_status)
             VALUES (?, ?, ?, ?)",
        )
        .bind(affinity.name)
        .bind(affinity.description)
        .bind(serde_json::to_string(&affinity.effect)?)
        .bind(affinity.inflicted_status.to_string())
        .execute(&mut *tx)
        .await?;
    }

    for (name, description) in ATTACK_TYPES {
        sqlx::query("INSERT OR IGNORE INTO attack_types (name, description) VALUES (?, ?)")
            .bind(*name)
            .bind(*description)
            .execute(&mut *tx)
            .await?;
    }

    for npc in NPCS {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO npcs (name, description, avatar_url, health_max, sanity_max, level,
                                        base_damage_dice, attack_chain_max, is_boss, rarity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(npc.name)
        .bind(npc.description)
        .bind(npc.avatar_url)
        .bind(npc.health_max)
        .bind(npc.sanity_max)
        .bind(npc.level)
        .bind(npc.base_damage_dice)
        .bind(npc.attack_chain_max)
        .bind(npc.is_boss)
        .bind(npc.rarity)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT OR IGNORE INTO items (name, item_type, rarity, description, effect)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind("Starter Potion")
    .bind("consumable")
    .bind("Common")
    .bind("A small vial that restores 20 health.")
    .bind(serde_json::to_string(&ItemEffect::Heal { amount: 20 })?)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Seeded {} affinities, {} attack types, {} NPCs",
        AFFINITIES.len(),
        ATTACK_TYPES.len(),
        NPCS.len()
    );
    Ok(())
}

/// Create (or upgrade) a database file and seed the default catalog
pub async fn init_database(path: &Path) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Invalid database path: {}", path.display()))?;

    if path.exists() {
        info!("Migrating existing database at {}", path.display());
    } else {
        info!("Creating new database at {}", path.display());
    }

    let db = Database::new(Some(path_str)).await?;
    seed_defaults(db.pool()).await?;

    info!("Database initialization complete");
    Ok(())
}
