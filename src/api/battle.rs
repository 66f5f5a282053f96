//! Battle API - one active battle per guild channel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::combat::{BattleOption, ScopeKey};
use crate::embed::Embed;

/// Build the battle router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/battles/{guild}/{channel}",
            post(start_battle).get(battle_status).delete(end_battle),
        )
        .route("/battles/{guild}/{channel}/attack", post(attack))
        .route("/battles/{guild}/{channel}/action", post(battle_action))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    owner_id: String,
    opponent: String,
}

/// POST /battles/{guild}/{channel}
async fn start_battle(
    State(state): State<AppState>,
    Path((guild, channel)): Path<(String, String)>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<Embed>), ApiError> {
    let scope = ScopeKey::new(guild, channel);
    let summary = state
        .engine
        .start_battle(&scope, &req.owner_id, req.opponent.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(summary.to_embed())))
}

/// GET /battles/{guild}/{channel}
async fn battle_status(
    State(state): State<AppState>,
    Path((guild, channel)): Path<(String, String)>,
) -> ApiResult {
    let summary = state.engine.status(&ScopeKey::new(guild, channel)).await?;
    Ok(Json(summary.to_embed()))
}

/// DELETE /battles/{guild}/{channel}
async fn end_battle(
    State(state): State<AppState>,
    Path((guild, channel)): Path<(String, String)>,
) -> ApiResult {
    let summary = state
        .engine
        .end_battle(&ScopeKey::new(guild, channel))
        .await?;
    Ok(Json(summary.to_embed()))
}

#[derive(Debug, Deserialize)]
struct AttackRequest {
    owner_id: String,
    attack: Option<String>,
}

/// POST /battles/{guild}/{channel}/attack
async fn attack(
    State(state): State<AppState>,
    Path((guild, channel)): Path<(String, String)>,
    Json(req): Json<AttackRequest>,
) -> ApiResult {
    let report = state
        .engine
        .attack(
            &ScopeKey::new(guild, channel),
            &req.owner_id,
            req.attack.as_deref(),
        )
        .await?;
    Ok(Json(report.to_embed()))
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    owner_id: String,
    option: BattleOption,
    dice: Option<String>,
    text: Option<String>,
}

/// POST /battles/{guild}/{channel}/action
async fn battle_action(
    State(state): State<AppState>,
    Path((guild, channel)): Path<(String, String)>,
    Json(req): Json<ActionRequest>,
) -> ApiResult {
    let report = state
        .engine
        .battle_action(
            &ScopeKey::new(guild, channel),
            &req.owner_id,
            req.option,
            req.dice.as_deref(),
            req.text.as_deref(),
        )
        .await?;
    Ok(Json(report.to_embed()))
}
