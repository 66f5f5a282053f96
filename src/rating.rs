//! Roll rating tiers and cosmetic references
//!
//! Presentation only: a tier never changes battle state.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use crate::error::GameResult;

/// Qualitative bucket for an attack roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Perfect,
    Great,
    Good,
    Deflected,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Perfect, Tier::Great, Tier::Good, Tier::Deflected];

    /// Classify a roll. First match wins: max total, then 3+, then exactly 2.
    pub fn classify(total: i64, max_possible: i64) -> Tier {
        if total == max_possible {
            Tier::Perfect
        } else if total >= 3 {
            Tier::Great
        } else if total == 2 {
            Tier::Good
        } else {
            Tier::Deflected
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Tier::Perfect => "AMAZING!!!!! (Perfect hit!)",
            Tier::Great => "GREAT!!!",
            Tier::Good => "GOOD!!",
            Tier::Deflected => "bleh... (Attack deflected)",
        }
    }

    /// Reference used when the player has not customized this tier
    pub fn default_reference(&self) -> &'static str {
        match self {
            Tier::Perfect => "https://example.com/amazing.gif",
            Tier::Great => "https://example.com/great.gif",
            Tier::Good => "https://example.com/good.gif",
            Tier::Deflected => "https://example.com/deflected.gif",
        }
    }
}

impl FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "perfect" | "amazing" => Ok(Tier::Perfect),
            "great" => Ok(Tier::Great),
            "good" => Ok(Tier::Good),
            "deflected" | "fail" => Ok(Tier::Deflected),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Perfect => "perfect",
            Tier::Great => "great",
            Tier::Good => "good",
            Tier::Deflected => "deflected",
        };
        write!(f, "{}", s)
    }
}

/// Per-owner cosmetic references for each tier
#[derive(Clone)]
pub struct RatingResolver {
    pool: SqlitePool,
}

impl RatingResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The owner's reference for a tier, or the tier default
    pub async fn reference(&self, owner_id: &str, tier: Tier) -> GameResult<String> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT url FROM user_rating_refs WHERE owner_id = ? AND tier = ?")
                .bind(owner_id)
                .bind(tier.to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .map(|(url,)| url)
            .unwrap_or_else(|| tier.default_reference().to_string()))
    }

    pub async fn set_reference(&self, owner_id: &str, tier: Tier, url: &str) -> GameResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_rating_refs (owner_id, tier, url) VALUES (?, ?, ?)
            ON CONFLICT(owner_id, tier) DO UPDATE SET url = excluded.url
            "#,
        )
        .bind(owner_id)
        .bind(tier.to_string())
        .bind(url)
        .execute(&self.pool)
        .await?;

        debug!("Set {} reference for {}", tier, owner_id);
        Ok(())
    }

    /// Revert a tier to its default. Returns true if a custom reference existed.
    pub async fn clear_reference(&self, owner_id: &str, tier: Tier) -> GameResult<bool> {
        let result = sqlx::query("DELETE FROM user_rating_refs WHERE owner_id = ? AND tier = ?")
            .bind(owner_id)
            .bind(tier.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
