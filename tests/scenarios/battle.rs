//! Battle scenario tests
//!
//! Start, attack, flee and finish battles through the combat engine with
//! fixed dice.

use multilands::catalog::NewAttack;
use multilands::characters::NewCharacter;
use multilands::combat::{
    BattleOption, BattleOutcome, BattleStatus, EndReason, ScopeKey, StatusKind, TurnEvent,
};
use multilands::error::GameError;
use multilands::rating::Tier;
use tempfile::TempDir;

use crate::harness::{TestGame, CHANNEL, GUILD};

fn scope() -> ScopeKey {
    ScopeKey::new(GUILD, CHANNEL)
}

/// Add `attack` to the catalog and teach it to character `character_id`
async fn learn(game: &TestGame, character_id: i64, attack: NewAttack) {
    let attack = game.catalog().create_attack(&attack).await.unwrap();
    game.ledger()
        .learn_attack(character_id, attack.id)
        .await
        .unwrap();
}

fn special(name: &str) -> NewAttack {
    NewAttack {
        name: name.to_string(),
        type_name: "Blunt".to_string(),
        base_damage_dice: "1d4".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_start_battle_player_first() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;

    let summary = game
        .engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    assert_eq!(summary.round, 1);
    assert_eq!(summary.status, BattleStatus::Active);
    assert_eq!(summary.current_turn.as_deref(), Some("Ada"));
    assert_eq!(summary.players[0].health, 100);
    assert_eq!(summary.opponents[0].name, "Water Bottle");
    assert_eq!(summary.opponents[0].health, 45);
}

#[tokio::test]
async fn test_one_battle_per_scope() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;

    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();
    let err = game
        .engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap_err();

    assert!(matches!(err, GameError::BattleAlreadyActive));
    assert_eq!(game.battle_rows().await, 1);

    // Another channel in the same guild is a separate scope
    game.engine
        .start_battle(&ScopeKey::new(GUILD, "chan2"), "u1", "Wingslompson")
        .await
        .unwrap();
    assert_eq!(game.battle_rows().await, 2);
}

#[tokio::test]
async fn test_start_requires_character_and_opponent() {
    let game = TestGame::start(&[1]).await;

    let err = game
        .engine
        .start_battle(&scope(), "nobody", "Water Bottle")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NoCharacter));

    game.character_with_attack("u1", "Ada", "1d4").await;
    let err = game
        .engine
        .start_battle(&scope(), "u1", "Dragon")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::OpponentNotFound(_)));
    assert_eq!(game.battle_rows().await, 0);
}

#[tokio::test]
async fn test_max_roll_is_perfect() {
    let game = TestGame::start(&[4]).await;

    let outcome = game.engine.roll("1d4").unwrap();
    assert!(outcome.is_max_roll);
    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.max_possible, 4);
    assert_eq!(Tier::classify(outcome.total, outcome.max_possible), Tier::Perfect);
}

#[tokio::test]
async fn test_attack_round_trip() {
    // Every die lands on 5: the player's 1d4 scales to 1d5, the NPC's 1d6 to 1d8
    let game = TestGame::start(&[5]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game.engine.attack(&scope(), "u1", None).await.unwrap();

    assert_eq!(report.dice, "1d5");
    assert_eq!(report.tier, Tier::Perfect);
    let hit = report.hit.as_ref().unwrap();
    assert_eq!(hit.damage, 5);
    assert_eq!(hit.target_health, 40);
    assert_eq!(report.mastery.unwrap().perfect_hits, 1);

    // The NPC answered before control came back
    let npc_hits: Vec<_> = report
        .events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Hit(hit) => Some(hit),
            _ => None,
        })
        .collect();
    assert_eq!(npc_hits.len(), 1);
    assert_eq!(npc_hits[0].target, "Ada");
    assert_eq!(npc_hits[0].damage, 5);

    assert!(report.outcome.is_none());
    assert_eq!(report.battle.round, 2);
    assert_eq!(report.battle.current_turn.as_deref(), Some("Ada"));
    assert_eq!(report.battle.players[0].health, 95);

    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.opponents[0].health, 40);
    assert_eq!(status.round, 2);
}

#[tokio::test]
async fn test_victory_awards_experience() {
    let game = TestGame::start(&[5]).await;
    let ada = game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    // 45 health at 5 per hit
    let mut last = None;
    for _ in 0..9 {
        last = Some(game.engine.attack(&scope(), "u1", None).await.unwrap());
    }
    let report = last.unwrap();

    match report.outcome {
        Some(BattleOutcome::Victory {
            ref winners,
            experience,
        }) => {
            assert_eq!(winners, &vec!["Ada".to_string()]);
            assert_eq!(experience, 20);
        }
        ref other => panic!("expected victory, got {:?}", other),
    }
    assert_eq!(report.progress.unwrap().experience, 20);
    assert_eq!(report.battle.status, BattleStatus::Ended);
    assert_eq!(report.battle.end_reason, Some(EndReason::Victory));

    let stored = game.ledger().get_by_id(ada.id).await.unwrap().unwrap();
    assert_eq!(stored.experience, 20);

    let err = game.engine.status(&scope()).await.unwrap_err();
    assert!(matches!(err, GameError::NoActiveBattle));
}

#[tokio::test]
async fn test_runaway_success_ends_battle() {
    let game = TestGame::start(&[3]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Runaway, Some("1d4"), None)
        .await
        .unwrap();

    let roll = report.roll.as_ref().unwrap();
    assert_eq!(roll.total, 3);
    assert_eq!(roll.max_possible, 4);
    assert_eq!(report.success, Some(true));
    assert!(report.detail.contains("escaped"));
    assert!(matches!(report.outcome, Some(BattleOutcome::Fled { .. })));
    assert_eq!(report.battle.status, BattleStatus::Ended);

    // The scope is free again
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_runaway_failure_keeps_fighting() {
    let game = TestGame::start(&[2]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Runaway, Some("1d4"), None)
        .await
        .unwrap();

    assert_eq!(report.success, Some(false));
    assert!(report.outcome.is_none());
    assert_eq!(report.battle.status, BattleStatus::Active);
    // The NPC took its turn: 1d8 showing 2
    assert_eq!(report.battle.players[0].health, 98);
}

#[tokio::test]
async fn test_action_validation() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.character_with_attack("u2", "Bea", "1d6").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let err = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Runaway, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::MissingDice(_)));

    let err = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Special, Some("1d20"), Some("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::MissingDescription(_)));

    let err = game
        .engine
        .battle_action(&scope(), "u2", BattleOption::Defend, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NotParticipant));

    // Nothing was committed by the rejected actions
    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.round, 1);
    assert_eq!(status.current_turn.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_bystander_attack_is_free_roll() {
    let game = TestGame::start(&[6]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.character_with_attack("u2", "Bea", "1d6").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game.engine.attack(&scope(), "u2", None).await.unwrap();
    assert!(report.hit.is_none());
    assert!(report.mastery.is_none());
    assert_eq!(report.roll.total, 6);

    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.opponents[0].health, 45);
    assert_eq!(status.round, 1);
}

#[tokio::test]
async fn test_defend_then_item() {
    // NPC rolls 1d8 showing 5
    let game = TestGame::start(&[5]).await;
    let ada = game.character_with_attack("u1", "Ada", "1d4").await;
    game.ledger()
        .grant_item(ada.id, "Starter Potion", 1)
        .await
        .unwrap();
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Defend, None, None)
        .await
        .unwrap();
    // 5 less 20% = 4
    assert_eq!(report.battle.players[0].health, 96);

    let report = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Item, None, Some("starter potion"))
        .await
        .unwrap();
    assert_eq!(report.success, Some(true));
    // Healed back to full, then hit for 5
    assert_eq!(report.battle.players[0].health, 95);
    assert!(game.ledger().inventory(ada.id).await.unwrap().is_empty());

    let err = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Item, None, Some("Starter Potion"))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::ItemNotFound(_)));
}

#[tokio::test]
async fn test_end_battle() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let summary = game.engine.end_battle(&scope()).await.unwrap();
    assert_eq!(summary.status, BattleStatus::Ended);
    assert_eq!(summary.end_reason, Some(EndReason::Ended));

    let err = game.engine.end_battle(&scope()).await.unwrap_err();
    assert!(matches!(err, GameError::NoActiveBattle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_starts_create_one_battle() {
    let temp_dir = TempDir::new().unwrap();
    let game = TestGame::start_at(&temp_dir.path().join("race.db"), &[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.character_with_attack("u2", "Bea", "1d4").await;

    let scope = scope();
    let (first, second) = tokio::join!(
        game.engine.start_battle(&scope, "u1", "Water Bottle"),
        game.engine.start_battle(&scope, "u2", "Wingslompson"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(GameError::BattleAlreadyActive))));
    assert_eq!(game.battle_rows().await, 1);
}

#[tokio::test]
async fn test_perfect_focus_boosts_next_hit_and_skips_a_turn() {
    // Every die shows 4: focus 1d4 is a max roll, the NPC's 1d8 hits for 4
    let game = TestGame::start(&[4]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Focus, Some("1d4"), None)
        .await
        .unwrap();
    assert_eq!(report.success, Some(true));

    // NPC hits, Ada's turn is skipped, NPC hits again
    assert_eq!(report.events.len(), 3);
    assert!(matches!(&report.events[0], TurnEvent::Hit(hit) if hit.target == "Ada"));
    assert!(matches!(&report.events[1], TurnEvent::Skipped { name } if name == "Ada"));
    assert!(matches!(&report.events[2], TurnEvent::Hit(hit) if hit.target == "Ada"));
    assert_eq!(report.battle.round, 3);
    assert_eq!(report.battle.current_turn.as_deref(), Some("Ada"));
    assert_eq!(report.battle.players[0].health, 92);

    // 1d5 showing 4, plus the focus bonus
    let report = game.engine.attack(&scope(), "u1", None).await.unwrap();
    let hit = report.hit.as_ref().unwrap();
    assert_eq!(hit.damage, 6);
    assert_eq!(hit.target_health, 39);
    assert!(hit.modifiers.iter().any(|m| m == "+2 focus"));

    // The bonus is spent
    let report = game.engine.attack(&scope(), "u1", None).await.unwrap();
    assert_eq!(report.hit.as_ref().unwrap().damage, 4);
}

#[tokio::test]
async fn test_affinity_status_ticks_on_target_turn() {
    let game = TestGame::start(&[3]).await;
    let ada = game.character_with_attack("u1", "Ada", "1d4").await;
    learn(
        &game,
        ada.id,
        NewAttack {
            affinity: Some("Envy".to_string()),
            ..special("Envy Fang")
        },
    )
    .await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game
        .engine
        .attack(&scope(), "u1", Some("Envy Fang"))
        .await
        .unwrap();

    let hit = report.hit.as_ref().unwrap();
    assert_eq!(hit.damage, 3);
    assert_eq!(hit.inflicted, Some(StatusKind::Poison));

    // Poison bites as the NPC's turn starts, before it swings
    match &report.events[0] {
        TurnEvent::StatusTick {
            name,
            health_loss,
            sanity_loss,
            expired,
        } => {
            assert_eq!(name, "Water Bottle");
            assert_eq!(*health_loss, 2);
            assert_eq!(*sanity_loss, 0);
            assert!(expired.is_empty());
        }
        other => panic!("expected a status tick, got {:?}", other),
    }
    assert!(matches!(&report.events[1], TurnEvent::Hit(_)));

    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.opponents[0].health, 40);
    assert_eq!(status.opponents[0].effects, vec!["Poison (1 turns)".to_string()]);

    // A hit without an affinity lets the last turn run out
    let report = game.engine.attack(&scope(), "u1", Some("Ada Jab")).await.unwrap();
    assert!(report.hit.as_ref().unwrap().inflicted.is_none());
    assert!(report.events.iter().any(|e| matches!(
        e,
        TurnEvent::StatusTick { expired, .. } if expired == &vec![StatusKind::Poison]
    )));
    assert!(report.battle.opponents[0].effects.is_empty());
    assert_eq!(report.battle.opponents[0].health, 35);
}

#[tokio::test]
async fn test_unaffordable_attack_commits_nothing() {
    let game = TestGame::start(&[1]).await;
    let ada = game.character_with_attack("u1", "Ada", "1d4").await;
    learn(
        &game,
        ada.id,
        NewAttack {
            health_cost: 100,
            ..special("Blood Pact")
        },
    )
    .await;
    learn(
        &game,
        ada.id,
        NewAttack {
            sanity_cost: 500,
            ..special("Mind Burn")
        },
    )
    .await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    // Health costs must leave at least one point
    let err = game
        .engine
        .attack(&scope(), "u1", Some("Blood Pact"))
        .await
        .unwrap_err();
    match err {
        GameError::InsufficientResources {
            attack,
            resource,
            cost,
            available,
        } => {
            assert_eq!(attack, "Blood Pact");
            assert_eq!(resource, "health");
            assert_eq!(cost, 100);
            assert_eq!(available, 100);
        }
        other => panic!("unexpected {:?}", other),
    }

    let err = game
        .engine
        .attack(&scope(), "u1", Some("Mind Burn"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GameError::InsufficientResources { resource: "sanity", .. }
    ));

    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.round, 1);
    assert_eq!(status.current_turn.as_deref(), Some("Ada"));
    assert_eq!(status.players[0].health, 100);
    assert_eq!(status.players[0].sanity, 100);
    assert_eq!(status.opponents[0].health, 45);
}

#[tokio::test]
async fn test_cooldown_blocks_reuse_until_ready() {
    let game = TestGame::start(&[1]).await;
    let ada = game.character_with_attack("u1", "Ada", "1d4").await;
    learn(
        &game,
        ada.id,
        NewAttack {
            cooldown_rounds: 2,
            ..special("Heavy Swing")
        },
    )
    .await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    game.engine
        .attack(&scope(), "u1", Some("Heavy Swing"))
        .await
        .unwrap();

    // Round 2: cooling down until round 4
    let err = game
        .engine
        .attack(&scope(), "u1", Some("heavy swing"))
        .await
        .unwrap_err();
    match err {
        GameError::AttackOnCooldown {
            attack,
            ready_round,
        } => {
            assert_eq!(attack, "Heavy Swing");
            assert_eq!(ready_round, 4);
        }
        other => panic!("unexpected {:?}", other),
    }

    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.round, 2);
    assert_eq!(status.current_turn.as_deref(), Some("Ada"));
    assert_eq!(status.opponents[0].health, 44);
    assert_eq!(status.players[0].health, 99);

    // Other attacks stay available while it cools down
    game.engine.attack(&scope(), "u1", Some("Ada Jab")).await.unwrap();
    let err = game
        .engine
        .attack(&scope(), "u1", Some("Heavy Swing"))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AttackOnCooldown { ready_round: 4, .. }));
    game.engine.attack(&scope(), "u1", Some("Ada Jab")).await.unwrap();

    let report = game
        .engine
        .attack(&scope(), "u1", Some("Heavy Swing"))
        .await
        .unwrap();
    assert_eq!(report.hit.unwrap().target_health, 41);
}

#[tokio::test]
async fn test_acting_out_of_turn_is_rejected() {
    let game = TestGame::start(&[1]).await;
    game.character_with_attack("u1", "Ada", "1d4").await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    // Leave the turn pointer on the NPC, as if its turn never resolved
    sqlx::query(
        "UPDATE battles SET current_turn_participant_id =
            (SELECT id FROM battle_participants WHERE is_player = 0)",
    )
    .execute(&game.pool())
    .await
    .unwrap();

    let err = game.engine.attack(&scope(), "u1", None).await.unwrap_err();
    assert!(matches!(err, GameError::NotYourTurn(ref name) if name == "Water Bottle"));

    let err = game
        .engine
        .battle_action(&scope(), "u1", BattleOption::Defend, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NotYourTurn(ref name) if name == "Water Bottle"));

    let status = game.engine.status(&scope()).await.unwrap();
    assert_eq!(status.round, 1);
    assert_eq!(status.current_turn.as_deref(), Some("Water Bottle"));
    assert!(!status.players[0].defending);
    assert_eq!(status.opponents[0].health, 45);
}

#[tokio::test]
async fn test_fallen_player_ends_in_defeat() {
    // The NPC's 1d8 shows 8, more than Ada can take
    let game = TestGame::start(&[8]).await;
    let ada = game
        .ledger()
        .create(
            "u1",
            &NewCharacter {
                name: "Ada".to_string(),
                health_max: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    learn(&game, ada.id, special("Last Stand")).await;
    game.engine
        .start_battle(&scope(), "u1", "Water Bottle")
        .await
        .unwrap();

    let report = game.engine.attack(&scope(), "u1", None).await.unwrap();

    match report.outcome {
        Some(BattleOutcome::Defeat { ref losers }) => {
            assert_eq!(losers, &vec!["Ada".to_string()]);
        }
        ref other => panic!("expected defeat, got {:?}", other),
    }
    assert!(report.events.iter().any(|e| matches!(
        e,
        TurnEvent::Hit(hit) if hit.target == "Ada" && hit.target_defeated
    )));
    assert_eq!(report.battle.status, BattleStatus::Ended);
    assert_eq!(report.battle.end_reason, Some(EndReason::Defeat));
    assert!(report.progress.is_none());

    let stored = game.ledger().get_by_id(ada.id).await.unwrap().unwrap();
    assert_eq!(stored.experience, 0);

    let err = game.engine.status(&scope()).await.unwrap_err();
    assert!(matches!(err, GameError::NoActiveBattle));
}
