//! HTTP dispatch scenario tests
//!
//! Drive the router in-process and check status codes and embed payloads.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::harness::{field, TestGame};

#[tokio::test]
async fn test_health_and_root() {
    let game = TestGame::start(&[1]).await;

    let (status, body) = game.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "ok");

    let (status, body) = game.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "multilands");
}

#[tokio::test]
async fn test_roll_endpoint() {
    let game = TestGame::start(&[4]).await;

    let (status, body) = game.post("/dice/roll", json!({"expression": "1d4"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "Total"), Some("4"));
    assert_eq!(field(&body, "Max"), Some("4"));

    let (status, body) = game
        .post("/dice/roll", json!({"expression": "banana"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("banana"));
}

#[tokio::test]
async fn test_character_endpoints() {
    let game = TestGame::start(&[1]).await;

    let (status, body) = game
        .post("/characters/u1", json!({"name": "Ada", "species": "Human"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Ada");
    assert_eq!(field(&body, "Health"), Some("100/100"));
    assert_eq!(field(&body, "Species"), Some("Human"));

    let (status, _) = game.post("/characters/u1", json!({"name": "Ada"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = game
        .post("/characters/u1/Ada/vitals", json!({"sanity": -160}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "Sanity"), Some("0/100"));

    let (status, body) = game
        .request(
            Method::PATCH,
            "/characters/u1/Ada",
            Some(json!({"occupation": "Cartographer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "Occupation"), Some("Cartographer"));

    let (status, _) = game.get("/characters/u1/Nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = game
        .request(Method::DELETE, "/characters/u1/Ada", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = game.get("/characters/u1/Ada").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inventory_endpoints() {
    let game = TestGame::start(&[1]).await;
    game.post("/characters/u1", json!({"name": "Ada"})).await;

    let (status, _) = game
        .post(
            "/characters/u1/Ada/items",
            json!({"item": "Starter Potion", "quantity": 2}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = game
        .post("/characters/u1/Ada/items/use", json!({"item": "Starter Potion"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "Remaining"), Some("1"));

    let (status, _) = game
        .post(
            "/characters/u1/Ada/items/use",
            json!({"item": "Starter Potion", "quantity": 5}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = game.get("/characters/u1/Ada/items").await;
    assert_eq!(status, StatusCode::OK);
    assert!(field(&body, "Starter Potion").unwrap().starts_with("x1"));
}

#[tokio::test]
async fn test_rating_override() {
    let game = TestGame::start(&[1]).await;

    let (status, _) = game
        .request(
            Method::PUT,
            "/ratings/u1/perfect",
            Some(json!({"url": "https://gifs.test/yes.gif"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = game.get("/ratings/u1/perfect").await;
    assert_eq!(body["image"], "https://gifs.test/yes.gif");

    let (status, _) = game.get("/ratings/u1/legendary").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_battle_endpoints() {
    let game = TestGame::start(&[3]).await;
    game.post("/characters/u1", json!({"name": "Ada"})).await;

    let (status, body) = game
        .post(
            "/attacks",
            json!({"name": "Jab", "type_name": "Slash", "base_damage_dice": "1d4"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(field(&body, "Damage"), Some("1d4"));

    let (status, _) = game
        .post("/characters/u1/Ada/attacks", json!({"attack": "Jab"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = game
        .post(
            "/battles/guild1/chan1",
            json!({"owner_id": "u1", "opponent": "Water Bottle"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Ada vs Water Bottle");
    assert_eq!(body["description"], "Round 1");
    assert_eq!(field(&body, "Turn"), Some("Ada"));

    let (status, _) = game
        .post(
            "/battles/guild1/chan1",
            json!({"owner_id": "u1", "opponent": "Water Bottle"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = game
        .request(Method::DELETE, "/characters/u1/Ada", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("still in a battle"));

    let (status, _) = game
        .post("/battles/guild1/chan1/attack", json!({"owner_id": "u1"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = game
        .post(
            "/battles/guild1/chan1/action",
            json!({"owner_id": "u1", "option": "runaway", "dice": "1d4"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = game.get("/battles/guild1/chan1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    // Free to go once the battle is over
    let (status, _) = game
        .request(Method::DELETE, "/characters/u1/Ada", None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
