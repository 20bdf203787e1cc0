//! Shared test utilities for database operations
//!
//! Provides a common test_store() function that creates an in-memory
//! database with the full schema, so tests run against the same schema
//! as production.

use super::SqliteStore;

/// Create an in-memory store with all migrations applied
pub async fn test_store() -> SqliteStore {
    SqliteStore::new(None)
        .await
        .expect("Failed to create test database")
}
