//! Game error taxonomy
//!
//! Every domain rejection maps to exactly one variant with a short,
//! human-readable message. Storage failures are wrapped separately so the
//! dispatch layer can log them and answer with a generic retry message.

use thiserror::Error;

/// Errors raised by the dice engine, ledger, catalog and combat engine
#[derive(Debug, Error)]
pub enum GameError {
    #[error("invalid dice notation \"{0}\" (use a format like 1d4 or 2d6+3)")]
    InvalidExpression(String),

    #[error("a {kind} named \"{name}\" already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("you need to create a character first")]
    NoCharacter,

    #[error("character \"{0}\" not found")]
    CharacterNotFound(String),

    #[error("{0} is still in a battle, end it before deleting them")]
    CharacterInBattle(String),

    #[error("opponent \"{0}\" not found")]
    OpponentNotFound(String),

    #[error("attack \"{0}\" is not unlocked or does not exist")]
    AttackNotUnlocked(String),

    #[error("your character has no unlocked attacks to use")]
    NoAttacksUnlocked,

    #[error("a battle is already active in this channel")]
    BattleAlreadyActive,

    #[error("no active battle found in this channel")]
    NoActiveBattle,

    #[error("it is not your turn, waiting on {0}")]
    NotYourTurn(String),

    #[error("your character is not part of this battle")]
    NotParticipant,

    #[error("not enough {resource} to use {attack} (needs {cost}, has {available})")]
    InsufficientResources {
        attack: String,
        resource: &'static str,
        cost: i64,
        available: i64,
    },

    #[error("{attack} is on cooldown until round {ready_round}")]
    AttackOnCooldown { attack: String, ready_round: i64 },

    #[error("the battle changed while you were acting, please try again")]
    StaleBattle,

    #[error("quantity must be at least 1 (got {0})")]
    InvalidQuantity(i64),

    #[error("item \"{0}\" not found")]
    ItemNotFound(String),

    #[error("not enough \"{item}\" (wanted {wanted}, have {have})")]
    InsufficientQuantity { item: String, wanted: i64, have: i64 },

    #[error("please provide dice notation for {0} (e.g. 1d4)")]
    MissingDice(&'static str),

    #[error("please provide a description for your {0}")]
    MissingDescription(&'static str),

    #[error("unknown {kind} \"{name}\"")]
    UnknownCatalogEntry { kind: &'static str, name: String },

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl GameError {
    /// True for rejections the player caused, false for infrastructure failures
    pub fn is_domain(&self) -> bool {
        !matches!(self, GameError::Storage(_) | GameError::Corrupt(_))
    }

    /// Message safe to show the player
    pub fn user_message(&self) -> String {
        if self.is_domain() {
            self.to_string()
        } else {
            "Something went wrong, please try again.".to_string()
        }
    }
}

impl From<serde_json::Error> for GameError {
    fn from(e: serde_json::Error) -> Self {
        GameError::Corrupt(e.to_string())
    }
}

pub type GameResult<T> = Result<T, GameError>;
