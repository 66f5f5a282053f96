//! Character ledger scenario tests

use multilands::characters::NewCharacter;
use multilands::error::GameError;

use crate::harness::TestGame;

#[tokio::test]
async fn test_sanity_clamps_at_zero() {
    let game = TestGame::start(&[1]).await;
    let ledger = game.ledger();
    let ada = ledger
        .create(
            "u1",
            &NewCharacter {
                name: "Ada".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let vitals = ledger.adjust_vitals(ada.id, 0, -60).await.unwrap();
    assert_eq!(vitals.sanity_current, 40);

    let vitals = ledger.adjust_vitals(ada.id, 0, -60).await.unwrap();
    assert_eq!(vitals.sanity_current, 0);
    assert_eq!(vitals.health_current, 100);
}

#[tokio::test]
async fn test_selection_drives_battles() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.character_with_attack("u1", "Cid", "1d4").await;

    // Latest created is the default
    let resolved = game.ledger().resolve("u1", None).await.unwrap();
    assert_eq!(resolved.name, "Cid");

    game.ledger().select("u1", "Ada").await.unwrap();
    let summary = game
        .engine
        .start_battle(
            &multilands::combat::ScopeKey::new("g", "c"),
            "u1",
            "Water Bottle",
        )
        .await
        .unwrap();
    assert_eq!(summary.players[0].name, "Ada");
}

#[tokio::test]
async fn test_unknown_attack_rejected() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    let scope = multilands::combat::ScopeKey::new("g", "c");
    game.engine
        .start_battle(&scope, "u1", "Water Bottle")
        .await
        .unwrap();

    let err = game
        .engine
        .attack(&scope, "u1", Some("Fireball"))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AttackNotUnlocked(_)));
}

#[tokio::test]
async fn test_no_attacks_unlocked() {
    let game = TestGame::start(&[1]).await;
    game.ledger()
        .create(
            "u1",
            &NewCharacter {
                name: "Ada".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let scope = multilands::combat::ScopeKey::new("g", "c");
    game.engine
        .start_battle(&scope, "u1", "Water Bottle")
        .await
        .unwrap();

    let err = game.engine.attack(&scope, "u1", None).await.unwrap_err();
    assert!(matches!(err, GameError::NoAttacksUnlocked));

    // Naming an attack does not change the answer when nothing is learned
    let err = game
        .engine
        .attack(&scope, "u1", Some("Fireball"))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NoAttacksUnlocked));
}
