//! SQLite adapters for the eventcore engine.

pub mod connection;
pub mod definition_store;
pub mod migrations;

pub use connection::{create_memory_pool, create_pool, verify_connection, ConnectionError};
pub use definition_store::SqliteDefinitionStore;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("Failed to start store runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
