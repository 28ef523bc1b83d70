use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod store;

use crate::error::DeployError;
pub use store::SqlMappingStore;

/// Opens (creating if needed) the mapping database and brings its schema up to date
pub async fn init_db(db_path: impl AsRef<Path>) -> Result<SqlitePool, DeployError> {
    let db_path = db_path.as_ref();

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DeployError::DatabaseError(format!("Failed to create database directory: {}", e))
        })?;
    }

    info!("Opening mapping database at {}", db_path.display());
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| DeployError::ConfigError(format!("Failed to connect to database: {}", e)))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Runs the embedded `repos` migrations
pub async fn migrate(pool: &SqlitePool) -> Result<(), DeployError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DeployError::ConfigError(format!("Failed to run migrations: {}", e)))
}
