//! Character ledger
//!
//! Owns player characters and everything hanging off them:
//! - Identity and descriptive sheet fields
//! - Health/sanity pools, level and experience
//! - Unlocked attacks with per-character mastery
//! - Inventory
//! - The per-owner selected character

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::catalog::{attack_from_row, item_from_row, Attack, Item};
use crate::error::{GameError, GameResult};

/// Perfect hits needed to raise an attack's level
pub const PERFECT_HITS_PER_LEVEL: i64 = 5;

/// Experience needed per character level
pub const EXPERIENCE_PER_LEVEL: i64 = 100;

/// Largest single health/sanity delta considered; bigger values clamp anyway
const MAX_DELTA: i64 = 1_000_000;

const CHARACTER_COLUMNS: &str = r#"
    id, owner_id, name, avatar_url, gender, age, species, occupation, appearance_url,
    sanity_increase_desc, sanity_decrease_desc, health_current, health_max,
    sanity_current, sanity_max, level, experience, attack_chain_max, created_at
"#;

/// A player-owned persona
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Character {
    pub id: i64,
    pub owner_id: String,
    pub name: String,
    pub avatar_url: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub species: Option<String>,
    pub occupation: Option<String>,
    pub appearance_url: Option<String>,
    pub sanity_increase_desc: Option<String>,
    pub sanity_decrease_desc: Option<String>,
    pub health_current: i64,
    pub health_max: i64,
    pub sanity_current: i64,
    pub sanity_max: i64,
    pub level: i64,
    pub experience: i64,
    pub attack_chain_max: i64,
    pub created_at: String,
}

/// Fields for creating a character
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCharacter {
    pub name: String,
    #[serde(default)]
    pub avatar_url: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub species: Option<String>,
    pub occupation: Option<String>,
    pub appearance_url: Option<String>,
    pub sanity_increase_desc: Option<String>,
    pub sanity_decrease_desc: Option<String>,
    /// Defaults to 100
    pub health_max: Option<i64>,
    /// Defaults to 100
    pub sanity_max: Option<i64>,
}

/// Partial sheet update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterUpdate {
    pub avatar_url: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub species: Option<String>,
    pub occupation: Option<String>,
    pub appearance_url: Option<String>,
    pub sanity_increase_desc: Option<String>,
    pub sanity_decrease_desc: Option<String>,
}

/// Post-adjustment health and sanity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Vitals {
    pub health_current: i64,
    pub health_max: i64,
    pub sanity_current: i64,
    pub sanity_max: i64,
}

/// An attack the character has learned
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedAttack {
    pub attack: Attack,
    pub level: i64,
    pub perfect_hits: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryEntry {
    pub item: Item,
    pub quantity: i64,
}

/// Attack mastery after recording a perfect hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mastery {
    pub level: i64,
    pub perfect_hits: i64,
    pub leveled_up: bool,
}

/// Character progression after an experience award
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub level: i64,
    pub experience: i64,
    pub levels_gained: i64,
}

/// Resource cost of an action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Costs {
    pub health: i64,
    pub sanity: i64,
}

/// Check a cost against current pools.
///
/// Health costs must leave at least one health; sanity costs may spend it all.
/// On failure returns the resource name, the cost and what is available.
pub fn can_afford(
    health_current: i64,
    sanity_current: i64,
    costs: Costs,
) -> Result<(), (&'static str, i64, i64)> {
    if costs.health > 0 && health_current <= costs.health {
        return Err(("health", costs.health, health_current));
    }
    if costs.sanity > 0 && sanity_current < costs.sanity {
        return Err(("sanity", costs.sanity, sanity_current));
    }
    Ok(())
}

/// Character storage and mutation
#[derive(Clone)]
pub struct CharacterLedger {
    pool: SqlitePool,
}

impl CharacterLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a character. Names are unique per owner.
    pub async fn create(&self, owner_id: &str, new: &NewCharacter) -> GameResult<Character> {
        let health_max = new.health_max.unwrap_or(100).max(1);
        let sanity_max = new.sanity_max.unwrap_or(100).max(1);

        let result = sqlx::query_as::<_, Character>(&format!(
            r#"
            INSERT INTO characters (owner_id, name, avatar_url, gender, age, species, occupation,
                                    appearance_url, sanity_increase_desc, sanity_decrease_desc,
                                    health_current, health_max, sanity_current, sanity_max)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            CHARACTER_COLUMNS
        ))
        .bind(owner_id)
        .bind(new.name.trim())
        .bind(&new.avatar_url)
        .bind(&new.gender)
        .bind(new.age)
        .bind(&new.species)
        .bind(&new.occupation)
        .bind(&new.appearance_url)
        .bind(&new.sanity_increase_desc)
        .bind(&new.sanity_decrease_desc)
        .bind(health_max)
        .bind(health_max)
        .bind(sanity_max)
        .bind(sanity_max)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(character) => {
                info!(
                    "Created character '{}' ({}) for {}",
                    character.name, character.id, owner_id
                );
                Ok(character)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(GameError::DuplicateName {
                    kind: "character",
                    name: new.name.trim().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, owner_id: &str, name: &str) -> GameResult<Option<Character>> {
        let character = sqlx::query_as::<_, Character>(&format!(
            "SELECT {} FROM characters WHERE owner_id = ? AND name = ?",
            CHARACTER_COLUMNS
        ))
        .bind(owner_id)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(character)
    }

    pub async fn get_by_id(&self, id: i64) -> GameResult<Option<Character>> {
        let character = sqlx::query_as::<_, Character>(&format!(
            "SELECT {} FROM characters WHERE id = ?",
            CHARACTER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(character)
    }

    /// The owner's most recently created character
    pub async fn latest(&self, owner_id: &str) -> GameResult<Option<Character>> {
        let character = sqlx::query_as::<_, Character>(&format!(
            "SELECT {} FROM characters WHERE owner_id = ? ORDER BY id DESC LIMIT 1",
            CHARACTER_COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(character)
    }

    pub async fn list(&self, owner_id: &str) -> GameResult<Vec<Character>> {
        let characters = sqlx::query_as::<_, Character>(&format!(
            "SELECT {} FROM characters WHERE owner_id = ? ORDER BY id",
            CHARACTER_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(characters)
    }

    /// Resolve the character a command acts as.
    /// Priority: explicit name > selected character > latest character.
    pub async fn resolve(&self, owner_id: &str, name: Option<&str>) -> GameResult<Character> {
        if let Some(name) = name {
            return self
                .get(owner_id, name)
                .await?
                .ok_or_else(|| GameError::CharacterNotFound(name.to_string()));
        }

        if let Some(selected) = self.selected(owner_id).await? {
            return Ok(selected);
        }

        self.latest(owner_id).await?.ok_or(GameError::NoCharacter)
    }

    /// Apply a partial update to a character's sheet
    pub async fn update(
        &self,
        owner_id: &str,
        name: &str,
        update: &CharacterUpdate,
    ) -> GameResult<Character> {
        let character = sqlx::query_as::<_, Character>(&format!(
            r#"
            UPDATE characters SET
                avatar_url = COALESCE(?, avatar_url),
                gender = COALESCE(?, gender),
                age = COALESCE(?, age),
                species = COALESCE(?, species),
                occupation = COALESCE(?, occupation),
                appearance_url = COALESCE(?, appearance_url),
                sanity_increase_desc = COALESCE(?, sanity_increase_desc),
                sanity_decrease_desc = COALESCE(?, sanity_decrease_desc)
            WHERE owner_id = ? AND name = ?
            RETURNING {}
            "#,
            CHARACTER_COLUMNS
        ))
        .bind(&update.avatar_url)
        .bind(&update.gender)
        .bind(update.age)
        .bind(&update.species)
        .bind(&update.occupation)
        .bind(&update.appearance_url)
        .bind(&update.sanity_increase_desc)
        .bind(&update.sanity_decrease_desc)
        .bind(owner_id)
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        character.ok_or_else(|| GameError::CharacterNotFound(name.to_string()))
    }

    /// Delete a character; unlocks, inventory and selection go with it.
    /// A character still fighting in a battle cannot be deleted.
    pub async fn delete(&self, owner_id: &str, name: &str) -> GameResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM characters
            WHERE owner_id = ? AND name = ?
              AND NOT EXISTS (
                  SELECT 1 FROM battle_participants p
                  JOIN battles b ON p.battle_id = b.id
                  WHERE p.character_id = characters.id AND b.status <> 'ended'
              )
            "#,
        )
        .bind(owner_id)
        .bind(name.trim())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(owner_id, name).await? {
                Some(character) => Err(GameError::CharacterInBattle(character.name)),
                None => Err(GameError::CharacterNotFound(name.to_string())),
            };
        }

        info!("Deleted character '{}' for {}", name, owner_id);
        Ok(())
    }

    /// Shift health and sanity by the given deltas, clamping each into `[0, max]`.
    /// Out-of-range deltas clamp silently; the update is a single statement.
    pub async fn adjust_vitals(
        &self,
        character_id: i64,
        health_delta: i64,
        sanity_delta: i64,
    ) -> GameResult<Vitals> {
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            UPDATE characters SET
                health_current = MAX(0, MIN(health_max, health_current + ?)),
                sanity_current = MAX(0, MIN(sanity_max, sanity_current + ?))
            WHERE id = ?
            RETURNING health_current, health_max, sanity_current, sanity_max
            "#,
        )
        .bind(health_delta.clamp(-MAX_DELTA, MAX_DELTA))
        .bind(sanity_delta.clamp(-MAX_DELTA, MAX_DELTA))
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await?;

        let (health_current, health_max, sanity_current, sanity_max) =
            row.ok_or_else(|| GameError::CharacterNotFound(format!("#{}", character_id)))?;

        Ok(Vitals {
            health_current,
            health_max,
            sanity_current,
            sanity_max,
        })
    }

    /// Unlock an attack for a character. Re-learning keeps existing mastery.
    pub async fn learn_attack(&self, character_id: i64, attack_id: i64) -> GameResult<()> {
        sqlx::query(
            r#"
            INSERT INTO character_attacks (character_id, attack_id, is_unlocked, level, perfect_hits)
            VALUES (?, ?, 1, 0, 0)
            ON CONFLICT(character_id, attack_id) DO UPDATE SET is_unlocked = 1
            "#,
        )
        .bind(character_id)
        .bind(attack_id)
        .execute(&self.pool)
        .await?;

        debug!("Character {} learned attack {}", character_id, attack_id);
        Ok(())
    }

    /// Unlocked attacks in ascending attack id order
    pub async fn unlocked_attacks(&self, character_id: i64) -> GameResult<Vec<UnlockedAttack>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.name, t.name AS type_name, a.description, a.base_damage_dice,
                   a.effect_description, a.health_cost, a.sanity_cost, a.cooldown_rounds,
                   f.id AS affinity_id, f.name AS affinity_name,
                   f.description AS affinity_description, f.effect AS affinity_effect,
                   f.inflicted_status, f.status_duration,
                   ca.level AS attack_level, ca.perfect_hits
            FROM character_attacks ca
            JOIN attacks a ON ca.attack_id = a.id
            JOIN attack_types t ON a.type_id = t.id
            LEFT JOIN affinities f ON a.affinity_id = f.id
            WHERE ca.character_id = ? AND ca.is_unlocked = 1
            ORDER BY a.id
            "#,
        )
        .bind(character_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(UnlockedAttack {
                    attack: attack_from_row(row)?,
                    level: row.try_get("attack_level")?,
                    perfect_hits: row.try_get("perfect_hits")?,
                })
            })
            .collect()
    }

    pub async fn record_perfect_hit(&self, character_id: i64, attack_id: i64) -> GameResult<Mastery> {
        let mut conn = self.pool.acquire().await?;
        Self::record_perfect_hit_on(&mut conn, character_id, attack_id).await
    }

    /// Count a perfect execution; every few of them raise the attack's level
    pub(crate) async fn record_perfect_hit_on(
        conn: &mut SqliteConnection,
        character_id: i64,
        attack_id: i64,
    ) -> GameResult<Mastery> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            UPDATE character_attacks SET
                level = level + (perfect_hits + 1) / ?1,
                perfect_hits = (perfect_hits + 1) % ?1
            WHERE character_id = ?2 AND attack_id = ?3
            RETURNING level, perfect_hits
            "#,
        )
        .bind(PERFECT_HITS_PER_LEVEL)
        .bind(character_id)
        .bind(attack_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (level, perfect_hits) =
            row.ok_or_else(|| GameError::AttackNotUnlocked(format!("#{}", attack_id)))?;

        Ok(Mastery {
            level,
            perfect_hits,
            leveled_up: perfect_hits == 0,
        })
    }

    pub async fn award_experience(&self, character_id: i64, amount: i64) -> GameResult<Progress> {
        let mut conn = self.pool.acquire().await?;
        Self::award_experience_on(&mut conn, character_id, amount).await
    }

    /// Add experience; the level follows `1 + experience / EXPERIENCE_PER_LEVEL`
    /// and never drops.
    pub(crate) async fn award_experience_on(
        conn: &mut SqliteConnection,
        character_id: i64,
        amount: i64,
    ) -> GameResult<Progress> {
        let before: Option<(i64,)> = sqlx::query_as("SELECT level FROM characters WHERE id = ?")
            .bind(character_id)
            .fetch_optional(&mut *conn)
            .await?;
        let (old_level,) =
            before.ok_or_else(|| GameError::CharacterNotFound(format!("#{}", character_id)))?;

        let (level, experience): (i64, i64) = sqlx::query_as(
            r#"
            UPDATE characters SET
                experience = experience + ?1,
                level = MAX(level, 1 + (experience + ?1) / ?2)
            WHERE id = ?3
            RETURNING level, experience
            "#,
        )
        .bind(amount.max(0))
        .bind(EXPERIENCE_PER_LEVEL)
        .bind(character_id)
        .fetch_one(&mut *conn)
        .await?;

        if level > old_level {
            info!("Character {} reached level {}", character_id, level);
        }

        Ok(Progress {
            level,
            experience,
            levels_gained: level - old_level,
        })
    }

    /// Add items to an inventory; returns the new quantity
    pub async fn grant_item(
        &self,
        character_id: i64,
        item_name: &str,
        quantity: i64,
    ) -> GameResult<i64> {
        if quantity < 1 {
            return Err(GameError::InvalidQuantity(quantity));
        }
        let item_id = self.item_id(item_name).await?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO character_items (character_id, item_id, quantity) VALUES (?, ?, ?)
            ON CONFLICT(character_id, item_id) DO UPDATE SET quantity = quantity + excluded.quantity
            RETURNING quantity
            "#,
        )
        .bind(character_id)
        .bind(item_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            "Granted {} x '{}' to character {} (now {})",
            quantity, item_name, character_id, total
        );
        Ok(total)
    }

    pub async fn consume_item(
        &self,
        character_id: i64,
        item_name: &str,
        quantity: i64,
    ) -> GameResult<(Item, i64)> {
        let mut tx = self.pool.begin().await?;
        let result = Self::consume_item_on(&mut tx, character_id, item_name, quantity).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Remove items from an inventory; the row disappears at zero.
    /// Returns the item and the remaining quantity.
    pub(crate) async fn consume_item_on(
        conn: &mut SqliteConnection,
        character_id: i64,
        item_name: &str,
        quantity: i64,
    ) -> GameResult<(Item, i64)> {
        if quantity < 1 {
            return Err(GameError::InvalidQuantity(quantity));
        }

        let row = sqlx::query(
            r#"
            SELECT i.id, i.name, i.item_type, i.rarity, i.description, i.effect, ci.quantity
            FROM character_items ci
            JOIN items i ON ci.item_id = i.id
            WHERE ci.character_id = ? AND i.name = ?
            "#,
        )
        .bind(character_id)
        .bind(item_name.trim())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| GameError::ItemNotFound(item_name.to_string()))?;

        let item = item_from_row(&row)?;
        let have: i64 = row.try_get("quantity")?;
        let insufficient = || GameError::InsufficientQuantity {
            item: item.name.clone(),
            wanted: quantity,
            have,
        };

        if quantity > have {
            return Err(insufficient());
        }

        let affected = if quantity == have {
            sqlx::query(
                "DELETE FROM character_items WHERE character_id = ? AND item_id = ? AND quantity = ?",
            )
            .bind(character_id)
            .bind(item.id)
            .bind(quantity)
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                "UPDATE character_items SET quantity = quantity - ?
                 WHERE character_id = ? AND item_id = ? AND quantity > ?",
            )
            .bind(quantity)
            .bind(character_id)
            .bind(item.id)
            .bind(quantity)
            .execute(&mut *conn)
            .await?
        };

        if affected.rows_affected() == 0 {
            return Err(insufficient());
        }

        Ok((item, have - quantity))
    }

    pub async fn inventory(&self, character_id: i64) -> GameResult<Vec<InventoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.name, i.item_type, i.rarity, i.description, i.effect, ci.quantity
            FROM character_items ci
            JOIN items i ON ci.item_id = i.id
            WHERE ci.character_id = ?
            ORDER BY i.id
            "#,
        )
        .bind(character_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(InventoryEntry {
                    item: item_from_row(row)?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    /// Make a character the owner's default for commands without a name
    pub async fn select(&self, owner_id: &str, name: &str) -> GameResult<Character> {
        let character = self
            .get(owner_id, name)
            .await?
            .ok_or_else(|| GameError::CharacterNotFound(name.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO user_settings (owner_id, selected_character_id, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(owner_id) DO UPDATE SET
                selected_character_id = excluded.selected_character_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(owner_id)
        .bind(character.id)
        .execute(&self.pool)
        .await?;

        info!("{} selected character '{}'", owner_id, character.name);
        Ok(character)
    }

    pub async fn selected(&self, owner_id: &str) -> GameResult<Option<Character>> {
        let character = sqlx::query_as::<_, Character>(&format!(
            r#"
            SELECT {} FROM characters
            WHERE id = (SELECT selected_character_id FROM user_settings WHERE owner_id = ?)
              AND owner_id = ?
            "#,
            CHARACTER_COLUMNS
        ))
        .bind(owner_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(character)
    }

    /// Forget the selection. Returns true if one was set.
    pub async fn clear_selection(&self, owner_id: &str) -> GameResult<bool> {
        let result = sqlx::query(
            "UPDATE user_settings SET selected_character_id = NULL, updated_at = datetime('now')
             WHERE owner_id = ? AND selected_character_id IS NOT NULL",
        )
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn item_id(&self, name: &str) -> GameResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM items WHERE name = ?")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(id,)| id)
            .ok_or_else(|| GameError::ItemNotFound(name.to_string()))
    }
}
