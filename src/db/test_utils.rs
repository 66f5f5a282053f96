//! Shared test utilities for database operations
//!
//! Provides a common test_pool() function that creates an in-memory
//! database with the full schema, so unit tests run against the same
//! schema as production.

use sqlx::SqlitePool;

use super::Database;

/// Create an in-memory test database pool with full schema
pub async fn test_pool() -> SqlitePool {
    let db = Database::new(None)
        .await
        .expect("Failed to create test database");
    db.pool().clone()
}

/// Create an in-memory test pool with the default catalog seeded
pub async fn seeded_pool() -> SqlitePool {
    let pool = test_pool().await;
    crate::seed::seed_defaults(&pool)
        .await
        .expect("Failed to seed test database");
    pool
}
