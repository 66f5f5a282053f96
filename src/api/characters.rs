//! Character API - sheets, vitals, attacks, inventory, selection, ratings

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::characters::{Character, CharacterUpdate, NewCharacter};
use crate::embed::{colors, pool, Embed};
use crate::error::GameError;
use crate::rating::Tier;

/// Build the character router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/characters/{owner}",
            get(list_characters).post(create_character),
        )
        .route(
            "/characters/{owner}/{name}",
            get(show_character)
                .patch(update_character)
                .delete(delete_character),
        )
        .route("/characters/{owner}/{name}/vitals", post(adjust_vitals))
        .route(
            "/characters/{owner}/{name}/attacks",
            get(list_attacks).post(learn_attack),
        )
        .route(
            "/characters/{owner}/{name}/items",
            get(inventory).post(grant_item),
        )
        .route("/characters/{owner}/{name}/items/use", post(consume_item))
        .route(
            "/selection/{owner}",
            get(show_selection).put(select).delete(clear_selection),
        )
        .route(
            "/ratings/{owner}/{tier}",
            get(show_rating).put(set_rating).delete(clear_rating),
        )
}

fn sheet(character: &Character) -> Embed {
    let mut embed = Embed::new(&character.name)
        .color(colors::INFO)
        .thumbnail(Some(character.avatar_url.as_str()))
        .field("Level", character.level.to_string(), true)
        .field("Experience", character.experience.to_string(), true)
        .field(
            "Health",
            pool(character.health_current, character.health_max),
            true,
        )
        .field(
            "Sanity",
            pool(character.sanity_current, character.sanity_max),
            true,
        );

    let optional = [
        ("Gender", character.gender.clone()),
        ("Age", character.age.map(|a| a.to_string())),
        ("Species", character.species.clone()),
        ("Occupation", character.occupation.clone()),
        ("Sanity Up", character.sanity_increase_desc.clone()),
        ("Sanity Down", character.sanity_decrease_desc.clone()),
    ];
    for (name, value) in optional {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            embed = embed.field(name, value, true);
        }
    }
    if let Some(url) = character.appearance_url.as_deref().filter(|u| !u.is_empty()) {
        embed = embed.image(url);
    }
    embed.footer(format!("Character #{}", character.id))
}

async fn find(state: &AppState, owner: &str, name: &str) -> Result<Character, ApiError> {
    Ok(state
        .ledger
        .get(owner, name)
        .await?
        .ok_or_else(|| GameError::CharacterNotFound(name.to_string()))?)
}

/// POST /characters/{owner}
async fn create_character(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(req): Json<NewCharacter>,
) -> Result<(StatusCode, Json<Embed>), ApiError> {
    let character = state.ledger.create(&owner, &req).await?;
    let embed = sheet(&character)
        .color(colors::SUCCESS)
        .description("Character created!");
    Ok((StatusCode::CREATED, Json(embed)))
}

/// GET /characters/{owner}
async fn list_characters(State(state): State<AppState>, Path(owner): Path<String>) -> ApiResult {
    let characters = state.ledger.list(&owner).await?;
    let selected = state.ledger.selected(&owner).await?.map(|c| c.id);

    let mut embed = Embed::new("Your Characters");
    if characters.is_empty() {
        embed = embed.description("You have no characters yet.");
    }
    for c in &characters {
        let marker = if Some(c.id) == selected { " (selected)" } else { "" };
        embed = embed.field(
            format!("{}{}", c.name, marker),
            format!(
                "Level {} | Health {} | Sanity {}",
                c.level,
                pool(c.health_current, c.health_max),
                pool(c.sanity_current, c.sanity_max)
            ),
            false,
        );
    }
    Ok(Json(embed))
}

/// GET /characters/{owner}/{name}
async fn show_character(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    Ok(Json(sheet(&character)))
}

/// PATCH /characters/{owner}/{name}
async fn update_character(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<CharacterUpdate>,
) -> ApiResult {
    let character = state.ledger.update(&owner, &name, &req).await?;
    Ok(Json(sheet(&character).description("Character updated.")))
}

/// DELETE /characters/{owner}/{name}
async fn delete_character(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult {
    state.ledger.delete(&owner, &name).await?;
    Ok(Json(
        Embed::new("Character Deleted")
            .color(colors::DANGER)
            .description(format!("{} is gone.", name)),
    ))
}

#[derive(Debug, Deserialize)]
struct VitalsRequest {
    #[serde(default)]
    health: i64,
    #[serde(default)]
    sanity: i64,
}

/// POST /characters/{owner}/{name}/vitals
async fn adjust_vitals(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<VitalsRequest>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    let vitals = state
        .ledger
        .adjust_vitals(character.id, req.health, req.sanity)
        .await?;

    Ok(Json(
        Embed::new(&character.name)
            .field("Health", pool(vitals.health_current, vitals.health_max), true)
            .field("Sanity", pool(vitals.sanity_current, vitals.sanity_max), true),
    ))
}

#[derive(Debug, Deserialize)]
struct LearnRequest {
    attack: String,
}

/// POST /characters/{owner}/{name}/attacks
async fn learn_attack(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<LearnRequest>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    let attack = state
        .catalog
        .attack_by_name(&req.attack)
        .await?
        .ok_or_else(|| GameError::UnknownCatalogEntry {
            kind: "attack",
            name: req.attack.clone(),
        })?;
    state.ledger.learn_attack(character.id, attack.id).await?;

    Ok(Json(
        Embed::new("Attack Learned")
            .color(colors::SUCCESS)
            .description(format!("{} learned {}!", character.name, attack.name)),
    ))
}

/// GET /characters/{owner}/{name}/attacks
async fn list_attacks(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    let unlocked = state.ledger.unlocked_attacks(character.id).await?;

    let mut embed = Embed::new(format!("{}'s Attacks", character.name));
    if unlocked.is_empty() {
        embed = embed.description("No attacks unlocked yet.");
    }
    for u in &unlocked {
        embed = embed.field(
            &u.attack.name,
            format!(
                "{} | Level {} | Perfect hits {}",
                u.attack.base_damage_dice, u.level, u.perfect_hits
            ),
            false,
        );
    }
    Ok(Json(embed))
}

#[derive(Debug, Deserialize)]
struct ItemRequest {
    item: String,
    #[serde(default = "one")]
    quantity: i64,
}

fn one() -> i64 {
    1
}

/// POST /characters/{owner}/{name}/items
async fn grant_item(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<ItemRequest>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    let total = state
        .ledger
        .grant_item(character.id, &req.item, req.quantity)
        .await?;

    Ok(Json(
        Embed::new("Item Received")
            .color(colors::SUCCESS)
            .description(format!("{} now has {} x {}", character.name, total, req.item)),
    ))
}

/// POST /characters/{owner}/{name}/items/use
async fn consume_item(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<ItemRequest>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    let (item, left) = state
        .ledger
        .consume_item(character.id, &req.item, req.quantity)
        .await?;

    Ok(Json(
        Embed::new("Item Used")
            .description(format!("{} used {} x {}", character.name, req.quantity, item.name))
            .field("Remaining", left.to_string(), true),
    ))
}

/// GET /characters/{owner}/{name}/items
async fn inventory(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> ApiResult {
    let character = find(&state, &owner, &name).await?;
    let entries = state.ledger.inventory(character.id).await?;

    let mut embed = Embed::new(format!("{}'s Inventory", character.name));
    if entries.is_empty() {
        embed = embed.description("Empty.");
    }
    for entry in &entries {
        embed = embed.field(
            &entry.item.name,
            format!("x{} | {} | {}", entry.quantity, entry.item.item_type, entry.item.rarity),
            true,
        );
    }
    Ok(Json(embed))
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    name: String,
}

/// GET /selection/{owner}
async fn show_selection(State(state): State<AppState>, Path(owner): Path<String>) -> ApiResult {
    match state.ledger.selected(&owner).await? {
        Some(character) => Ok(Json(sheet(&character))),
        None => Ok(Json(
            Embed::new("No Character Selected")
                .description("Commands use your most recently created character."),
        )),
    }
}

/// PUT /selection/{owner}
async fn select(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(req): Json<SelectRequest>,
) -> ApiResult {
    let character = state.ledger.select(&owner, &req.name).await?;
    Ok(Json(
        Embed::new("Character Selected")
            .color(colors::SUCCESS)
            .description(format!("Now playing as {}.", character.name)),
    ))
}

/// DELETE /selection/{owner}
async fn clear_selection(State(state): State<AppState>, Path(owner): Path<String>) -> ApiResult {
    let cleared = state.ledger.clear_selection(&owner).await?;
    let description = if cleared {
        "Selection cleared."
    } else {
        "No character was selected."
    };
    Ok(Json(Embed::new("Selection").description(description)))
}

fn parse_tier(raw: &str) -> Result<Tier, ApiError> {
    raw.parse::<Tier>().map_err(|_| {
        ApiError::from(GameError::UnknownCatalogEntry {
            kind: "rating tier",
            name: raw.to_string(),
        })
    })
}

#[derive(Debug, Deserialize)]
struct RatingRequest {
    url: String,
}

/// GET /ratings/{owner}/{tier}
async fn show_rating(
    State(state): State<AppState>,
    Path((owner, tier)): Path<(String, String)>,
) -> ApiResult {
    let tier = parse_tier(&tier)?;
    let reference = state.ratings.reference(&owner, tier).await?;
    Ok(Json(
        Embed::new(tier.headline())
            .image(reference)
            .footer(tier.to_string()),
    ))
}

/// PUT /ratings/{owner}/{tier}
async fn set_rating(
    State(state): State<AppState>,
    Path((owner, tier)): Path<(String, String)>,
    Json(req): Json<RatingRequest>,
) -> ApiResult {
    let tier = parse_tier(&tier)?;
    state.ratings.set_reference(&owner, tier, req.url.trim()).await?;
    Ok(Json(
        Embed::new("Rating Updated")
            .color(colors::SUCCESS)
            .description(format!("Your {} rolls now show this.", tier))
            .image(req.url.trim()),
    ))
}

/// DELETE /ratings/{owner}/{tier}
async fn clear_rating(
    State(state): State<AppState>,
    Path((owner, tier)): Path<(String, String)>,
) -> ApiResult {
    let tier = parse_tier(&tier)?;
    let cleared = state.ratings.clear_reference(&owner, tier).await?;
    let description = if cleared {
        format!("Your {} rolls are back to the default.", tier)
    } else {
        format!("Your {} rolls already use the default.", tier)
    };
    Ok(Json(Embed::new("Rating Reset").description(description)))
}
