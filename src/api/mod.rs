//! HTTP API module - command dispatch over JSON
//!
//! Each endpoint takes already-typed parameters plus the actor and scope
//! identities, calls into the ledger or the combat engine, and answers with
//! an [`Embed`] for the chat renderer.

mod battle;
mod characters;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::catalog::{Catalog, NewAttack};
use crate::characters::CharacterLedger;
use crate::combat::CombatEngine;
use crate::db::Database;
use crate::embed::{colors, Embed};
use crate::error::GameError;
use crate::rating::{RatingResolver, Tier};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub ledger: CharacterLedger,
    pub catalog: Catalog,
    pub ratings: RatingResolver,
    pub engine: Arc<CombatEngine>,
}

/// Build the API router
pub fn router(db: Arc<Database>) -> Router {
    let engine = Arc::new(CombatEngine::new(db.pool().clone()));
    router_with_engine(db, engine)
}

/// Build the API router around a preconfigured engine
pub fn router_with_engine(db: Arc<Database>, engine: Arc<CombatEngine>) -> Router {
    let pool = db.pool().clone();
    let state = AppState {
        ledger: CharacterLedger::new(pool.clone()),
        catalog: Catalog::new(pool.clone()),
        ratings: RatingResolver::new(pool),
        engine,
        db,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .route("/dice/roll", post(roll_dice))
        .route("/attacks", get(list_attacks).post(create_attack))
        .route("/affinities", get(list_affinities))
        .route("/npcs", get(list_npcs))
        .merge(characters::router())
        .merge(battle::router())
        .with_state(state)
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// A game error on its way out as HTTP
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GameError::NoCharacter
            | GameError::CharacterNotFound(_)
            | GameError::OpponentNotFound(_)
            | GameError::NoActiveBattle
            | GameError::ItemNotFound(_)
            | GameError::UnknownCatalogEntry { .. } => StatusCode::NOT_FOUND,
            GameError::DuplicateName { .. }
            | GameError::BattleAlreadyActive
            | GameError::CharacterInBattle(_)
            | GameError::StaleBattle
            | GameError::NotYourTurn(_) => StatusCode::CONFLICT,
            GameError::NotParticipant => StatusCode::FORBIDDEN,
            GameError::Storage(_) | GameError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !self.0.is_domain() {
            error!("Request failed: {}", self.0);
        }
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.0.user_message(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult = Result<Json<Embed>, ApiError>;

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "multilands",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                database: "error",
            }),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

#[derive(Debug, Deserialize)]
struct RollRequest {
    expression: String,
}

/// POST /dice/roll
async fn roll_dice(State(state): State<AppState>, Json(req): Json<RollRequest>) -> ApiResult {
    let outcome = state.engine.roll(&req.expression)?;
    let tier = Tier::classify(outcome.total, outcome.max_possible);
    let rolls: Vec<String> = outcome.rolls.iter().map(|r| r.to_string()).collect();

    Ok(Json(
        Embed::new(format!("Rolling {}", outcome.expression))
            .description(tier.headline())
            .field("Rolls", format!("[{}]", rolls.join(", ")), true)
            .field("Total", outcome.total.to_string(), true)
            .field("Max", outcome.max_possible.to_string(), true),
    ))
}

/// GET /attacks
async fn list_attacks(State(state): State<AppState>) -> ApiResult {
    let mut embed = Embed::new("Attacks");
    for attack in state.catalog.attacks().await? {
        let affinity = attack
            .affinity
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("None");
        embed = embed.field(
            &attack.name,
            format!(
                "{} | {} | Affinity: {}",
                attack.type_name, attack.base_damage_dice, affinity
            ),
            false,
        );
    }
    Ok(Json(embed))
}

/// POST /attacks
async fn create_attack(
    State(state): State<AppState>,
    Json(req): Json<NewAttack>,
) -> Result<(StatusCode, Json<Embed>), ApiError> {
    let attack = state.catalog.create_attack(&req).await?;

    let mut embed = Embed::new(format!("New Attack: {}", attack.name))
        .color(colors::SUCCESS)
        .field("Type", &attack.type_name, true)
        .field("Damage", &attack.base_damage_dice, true);
    if let Some(affinity) = &attack.affinity {
        embed = embed.field("Affinity", &affinity.name, true);
    }
    if attack.health_cost > 0 || attack.sanity_cost > 0 {
        embed = embed.field(
            "Cost",
            format!("{} health, {} sanity", attack.health_cost, attack.sanity_cost),
            true,
        );
    }
    if attack.cooldown_rounds > 0 {
        embed = embed.field("Cooldown", format!("{} rounds", attack.cooldown_rounds), true);
    }
    if !attack.description.is_empty() {
        embed = embed.description(&attack.description);
    }
    Ok((StatusCode::CREATED, Json(embed)))
}

/// GET /affinities
async fn list_affinities(State(state): State<AppState>) -> ApiResult {
    let mut embed = Embed::new("Affinities");
    for affinity in state.catalog.affinities().await? {
        let status = affinity
            .inflicted_status
            .map(|s| format!(" Inflicts {}.", s))
            .unwrap_or_default();
        embed = embed.field(
            &affinity.name,
            format!("{}{}", affinity.description, status),
            false,
        );
    }
    Ok(Json(embed))
}

/// GET /npcs
async fn list_npcs(State(state): State<AppState>) -> ApiResult {
    let mut embed = Embed::new("Opponents");
    for npc in state.catalog.npcs().await? {
        let boss = if npc.is_boss { " (Boss)" } else { "" };
        embed = embed.field(
            format!("{}{}", npc.name, boss),
            format!(
                "Level {} | Health {} | Sanity {} | {}",
                npc.level, npc.health_max, npc.sanity_max, npc.rarity
            ),
            false,
        );
    }
    Ok(Json(embed))
}
