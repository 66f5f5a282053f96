//! Battle persistence
//!
//! Loads a [`BattleView`] snapshot and writes it back. Every write goes
//! through one transaction whose first statement bumps the battle version,
//! so two commands racing on the same battle cannot both commit.

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info};

use super::effects::{ParticipantEffects, StatusEffect, StatusKind};
use super::state::{
    Battle, BattleStatus, BattleView, Combatant, EndReason, Participant, ScopeKey,
};
use crate::catalog::Npc;
use crate::characters::Character;
use crate::error::{GameError, GameResult};

#[derive(sqlx::FromRow)]
struct BattleRow {
    id: i64,
    guild_id: String,
    channel_id: String,
    status: String,
    current_turn_participant_id: Option<i64>,
    turn_order: String,
    round_number: i64,
    version: i64,
    end_reason: Option<String>,
    created_at: String,
    last_activity: String,
}

impl BattleRow {
    fn into_battle(self) -> GameResult<Battle> {
        let status = self.status.parse::<BattleStatus>().map_err(GameError::Corrupt)?;
        let end_reason = self
            .end_reason
            .map(|r| r.parse::<EndReason>())
            .transpose()
            .map_err(GameError::Corrupt)?;

        Ok(Battle {
            id: self.id,
            scope: ScopeKey::new(self.guild_id, self.channel_id),
            status,
            turn_order: serde_json::from_str(&self.turn_order)?,
            current_turn: self.current_turn_participant_id,
            round: self.round_number,
            version: self.version,
            end_reason,
            created_at: self.created_at,
            last_activity: self.last_activity,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: i64,
    character_id: Option<i64>,
    npc_id: Option<i64>,
    current_health: i64,
    max_health: i64,
    current_sanity: i64,
    max_sanity: i64,
    is_player: bool,
    defending: bool,
    focus_bonus: i64,
    skip_next_turn: bool,
    owner_id: Option<String>,
    character_name: Option<String>,
    character_avatar: Option<String>,
    character_level: Option<i64>,
    npc_name: Option<String>,
    npc_avatar: Option<String>,
    npc_level: Option<i64>,
    npc_dice: Option<String>,
    npc_chain: Option<i64>,
    npc_boss: Option<bool>,
}

impl ParticipantRow {
    fn into_participant(self) -> GameResult<Participant> {
        let missing = |what: &str| {
            GameError::Corrupt(format!("participant {} is missing its {}", self.id, what))
        };

        let combatant = match (self.character_id, self.npc_id) {
            (Some(id), None) => Combatant::Character {
                id,
                owner_id: self.owner_id.clone().ok_or_else(|| missing("owner"))?,
                name: self.character_name.clone().ok_or_else(|| missing("character"))?,
                avatar_url: self.character_avatar.clone().unwrap_or_default(),
                level: self.character_level.unwrap_or(1),
            },
            (None, Some(id)) => Combatant::Npc {
                id,
                name: self.npc_name.clone().ok_or_else(|| missing("npc"))?,
                avatar_url: self.npc_avatar.clone(),
                level: self.npc_level.unwrap_or(1),
                base_damage_dice: self.npc_dice.clone().unwrap_or_else(|| "1d4".to_string()),
                attack_chain_max: self.npc_chain.unwrap_or(1),
                is_boss: self.npc_boss.unwrap_or(false),
            },
            _ => return Err(missing("combatant")),
        };

        Ok(Participant {
            id: self.id,
            combatant,
            is_player: self.is_player,
            health: self.current_health,
            max_health: self.max_health,
            sanity: self.current_sanity,
            max_sanity: self.max_sanity,
            defending: self.defending,
            focus_bonus: self.focus_bonus,
            skip_next_turn: self.skip_next_turn,
            effects: ParticipantEffects::new(),
            cooldowns: HashMap::new(),
        })
    }
}

const BATTLE_COLUMNS: &str = r#"
    id, guild_id, channel_id, status, current_turn_participant_id, turn_order,
    round_number, version, end_reason, created_at, last_activity
"#;

/// Battle storage over the shared pool
#[derive(Clone)]
pub struct BattleStore {
    pool: SqlitePool,
}

impl BattleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load the active battle for a scope with all participants
    pub async fn find_active(&self, scope: &ScopeKey) -> GameResult<Option<BattleView>> {
        let row: Option<BattleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM battles WHERE guild_id = ? AND channel_id = ? AND status = 'active'",
            BATTLE_COLUMNS
        ))
        .bind(&scope.guild_id)
        .bind(&scope.channel_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let battle = row.into_battle()?;
        let participants = self.load_participants(battle.id).await?;

        Ok(Some(BattleView {
            battle,
            participants,
        }))
    }

    /// Whether a scope currently has an active battle
    pub async fn has_active(&self, scope: &ScopeKey) -> GameResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM battles WHERE guild_id = ? AND channel_id = ? AND status = 'active'",
        )
        .bind(&scope.guild_id)
        .bind(&scope.channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn load_participants(&self, battle_id: i64) -> GameResult<Vec<Participant>> {
        let rows: Vec<ParticipantRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.character_id, p.npc_id, p.current_health, p.max_health,
                   p.current_sanity, p.max_sanity, p.is_player, p.defending,
                   p.focus_bonus, p.skip_next_turn,
                   c.owner_id, c.name AS character_name, c.avatar_url AS character_avatar,
                   c.level AS character_level,
                   n.name AS npc_name, n.avatar_url AS npc_avatar, n.level AS npc_level,
                   n.base_damage_dice AS npc_dice, n.attack_chain_max AS npc_chain,
                   n.is_boss AS npc_boss
            FROM battle_participants p
            LEFT JOIN characters c ON p.character_id = c.id
            LEFT JOIN npcs n ON p.npc_id = n.id
            WHERE p.battle_id = ?
            ORDER BY p.id
            "#,
        )
        .bind(battle_id)
        .fetch_all(&self.pool)
        .await?;

        let mut participants = rows
            .into_iter()
            .map(ParticipantRow::into_participant)
            .collect::<GameResult<Vec<_>>>()?;

        let effects: Vec<(i64, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT e.participant_id, e.status, e.remaining_turns, e.magnitude
            FROM participant_effects e
            JOIN battle_participants p ON e.participant_id = p.id
            WHERE p.battle_id = ?
            "#,
        )
        .bind(battle_id)
        .fetch_all(&self.pool)
        .await?;

        for (participant_id, status, turns, magnitude) in effects {
            let kind = status
                .parse::<StatusKind>()
                .map_err(|_| GameError::Corrupt(format!("unknown status '{}'", status)))?;
            if let Some(p) = participants.iter_mut().find(|p| p.id == participant_id) {
                p.effects.add(StatusEffect::new(kind, turns, magnitude));
            }
        }

        let cooldowns: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT c.participant_id, c.attack_id, c.ready_round
            FROM participant_cooldowns c
            JOIN battle_participants p ON c.participant_id = p.id
            WHERE p.battle_id = ?
            "#,
        )
        .bind(battle_id)
        .fetch_all(&self.pool)
        .await?;

        for (participant_id, attack_id, ready_round) in cooldowns {
            if let Some(p) = participants.iter_mut().find(|p| p.id == participant_id) {
                p.cooldowns.insert(attack_id, ready_round);
            }
        }

        Ok(participants)
    }

    /// Create a battle between a character and an NPC.
    ///
    /// The player goes first. Both sides start at full health and sanity.
    /// A concurrent start in the same scope loses on the unique index and
    /// reports `BattleAlreadyActive`.
    pub async fn create(
        &self,
        scope: &ScopeKey,
        player: &Character,
        npc: &Npc,
    ) -> GameResult<BattleView> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO battles (guild_id, channel_id, status, round_number, created_at, last_activity)
            VALUES (?, ?, 'active', 1, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&scope.guild_id)
        .bind(&scope.channel_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await;

        let battle_id = match inserted {
            Ok((id,)) => id,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(GameError::BattleAlreadyActive)
            }
            Err(e) => return Err(e.into()),
        };

        let (player_pid,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO battle_participants
                (battle_id, character_id, current_health, max_health, current_sanity, max_sanity, is_player)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            RETURNING id
            "#,
        )
        .bind(battle_id)
        .bind(player.id)
        .bind(player.health_max)
        .bind(player.health_max)
        .bind(player.sanity_max)
        .bind(player.sanity_max)
        .fetch_one(&mut *tx)
        .await?;

        let (npc_pid,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO battle_participants
                (battle_id, npc_id, current_health, max_health, current_sanity, max_sanity, is_player)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            RETURNING id
            "#,
        )
        .bind(battle_id)
        .bind(npc.id)
        .bind(npc.health_max)
        .bind(npc.health_max)
        .bind(npc.sanity_max)
        .bind(npc.sanity_max)
        .fetch_one(&mut *tx)
        .await?;

        let turn_order = serde_json::to_string(&[player_pid, npc_pid])?;
        sqlx::query(
            "UPDATE battles SET turn_order = ?, current_turn_participant_id = ? WHERE id = ?",
        )
        .bind(&turn_order)
        .bind(player_pid)
        .bind(battle_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Battle {} started in {}: '{}' vs '{}'",
            battle_id, scope, player.name, npc.name
        );

        self.find_active(scope)
            .await?
            .ok_or_else(|| GameError::Corrupt(format!("battle {} vanished after insert", battle_id)))
    }

    /// Write a mutated snapshot back.
    ///
    /// Fails with `StaleBattle` if the battle was written since the snapshot
    /// was loaded, or is no longer active. Ending a battle removes its
    /// participants along with their effects and cooldowns.
    pub async fn save_on(conn: &mut SqliteConnection, view: &BattleView) -> GameResult<()> {
        let battle = &view.battle;
        let now = Utc::now().to_rfc3339();
        let turn_order = if battle.is_active() {
            serde_json::to_string(&battle.turn_order)?
        } else {
            "[]".to_string()
        };

        let result = sqlx::query(
            r#"
            UPDATE battles SET
                status = ?, current_turn_participant_id = ?, turn_order = ?, round_number = ?,
                end_reason = ?, last_activity = ?, version = version + 1
            WHERE id = ? AND version = ? AND status = 'active'
            "#,
        )
        .bind(battle.status.as_str())
        .bind(battle.current_turn)
        .bind(&turn_order)
        .bind(battle.round)
        .bind(battle.end_reason.map(|r| r.as_str()))
        .bind(&now)
        .bind(battle.id)
        .bind(battle.version)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GameError::StaleBattle);
        }

        if !battle.is_active() {
            sqlx::query("DELETE FROM battle_participants WHERE battle_id = ?")
                .bind(battle.id)
                .execute(&mut *conn)
                .await?;
            debug!("Battle {} closed, participants removed", battle.id);
            return Ok(());
        }

        for p in &view.participants {
            sqlx::query(
                r#"
                UPDATE battle_participants SET
                    current_health = ?, current_sanity = ?, defending = ?,
                    focus_bonus = ?, skip_next_turn = ?
                WHERE id = ?
                "#,
            )
            .bind(p.health)
            .bind(p.sanity)
            .bind(p.defending)
            .bind(p.focus_bonus)
            .bind(p.skip_next_turn)
            .bind(p.id)
            .execute(&mut *conn)
            .await?;

            sqlx::query("DELETE FROM participant_effects WHERE participant_id = ?")
                .bind(p.id)
                .execute(&mut *conn)
                .await?;
            for effect in p.effects.active() {
                sqlx::query(
                    "INSERT INTO participant_effects (participant_id, status, remaining_turns, magnitude)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(p.id)
                .bind(effect.kind.to_string())
                .bind(effect.remaining_turns)
                .bind(effect.magnitude)
                .execute(&mut *conn)
                .await?;
            }

            sqlx::query("DELETE FROM participant_cooldowns WHERE participant_id = ?")
                .bind(p.id)
                .execute(&mut *conn)
                .await?;
            for (attack_id, ready_round) in &p.cooldowns {
                if *ready_round <= battle.round {
                    continue;
                }
                sqlx::query(
                    "INSERT INTO participant_cooldowns (participant_id, attack_id, ready_round)
                     VALUES (?, ?, ?)",
                )
                .bind(p.id)
                .bind(*attack_id)
                .bind(*ready_round)
                .execute(&mut *conn)
                .await?;
            }
        }

        Ok(())
    }
}
