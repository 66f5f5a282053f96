//! Integration Test Harness
//!
//! `TestGame` wires a seeded in-memory database, a combat engine fed by a
//! fixed die sequence, and the HTTP router driven in-process through
//! `tower::ServiceExt::oneshot`.
//!
//! # Example
//!
//! ```rust,ignore
//! let game = TestGame::start(&[4]).await;
//! let (status, body) = game.post("/dice/roll", json!({"expression": "1d4"})).await;
//! assert_eq!(status, StatusCode::OK);
//! ```

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use multilands::catalog::{Catalog, NewAttack};
use multilands::characters::{Character, CharacterLedger, NewCharacter};
use multilands::combat::{CombatEngine, FixedDice};
use multilands::db::Database;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

/// Scope used by most scenarios
pub const GUILD: &str = "guild1";
pub const CHANNEL: &str = "chan1";

pub struct TestGame {
    pub db: Arc<Database>,
    pub engine: Arc<CombatEngine>,
    router: Router,
}

impl TestGame {
    /// In-memory game whose dice replay `faces`
    pub async fn start(faces: &[u32]) -> Self {
        let db = Database::new(None).await.expect("Failed to create database");
        Self::with_database(db, faces).await
    }

    /// File-backed game, for tests that need several connections writing at once
    pub async fn start_at(path: &Path, faces: &[u32]) -> Self {
        let db = Database::new(Some(path.to_str().expect("utf-8 path")))
            .await
            .expect("Failed to create database");
        Self::with_database(db, faces).await
    }

    async fn with_database(db: Database, faces: &[u32]) -> Self {
        multilands::seed::seed_defaults(db.pool())
            .await
            .expect("Failed to seed database");

        let db = Arc::new(db);
        let engine = Arc::new(CombatEngine::with_roller(
            db.pool().clone(),
            Box::new(FixedDice::new(faces.to_vec())),
        ));
        let router = multilands::api::router_with_engine(db.clone(), engine.clone());

        Self { db, engine, router }
    }

    pub fn pool(&self) -> SqlitePool {
        self.db.pool().clone()
    }

    pub fn ledger(&self) -> CharacterLedger {
        CharacterLedger::new(self.pool())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.pool())
    }

    /// Create a character for `owner` and teach it a new attack
    pub async fn character_with_attack(&self, owner: &str, name: &str, dice: &str) -> Character {
        let character = self
            .ledger()
            .create(
                owner,
                &NewCharacter {
                    name: name.to_string(),
                    health_max: Some(100),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create character");

        let attack_name = format!("{} Jab", name);
        let attack = self
            .catalog()
            .create_attack(&NewAttack {
                name: attack_name,
                type_name: "Slash".to_string(),
                base_damage_dice: dice.to_string(),
                ..Default::default()
            })
            .await
            .expect("Failed to create attack");
        self.ledger()
            .learn_attack(character.id, attack.id)
            .await
            .expect("Failed to learn attack");

        character
    }

    pub async fn battle_rows(&self) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM battles")
            .fetch_one(self.db.pool())
            .await
            .expect("count battles");
        n
    }

    /// Send one request through the router, returning status and JSON body
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(body)).await
    }
}

/// Value of the embed field called `name`
pub fn field<'a>(embed: &'a Value, name: &str) -> Option<&'a str> {
    embed["fields"]
        .as_array()?
        .iter()
        .find(|f| f["name"] == name)
        .and_then(|f| f["value"].as_str())
}
