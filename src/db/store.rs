use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::error::DeployError;
use crate::mapping::{MappingStore, NewMapping, RepoMapping};

// Helper struct to map DB row to RepoMapping struct
#[derive(FromRow)]
struct RepoRow {
    id: i64,
    name: String,
    branch: String,
    app: String,
    created_at: String,
}

impl TryFrom<RepoRow> for RepoMapping {
    type Error = DeployError;

    fn try_from(row: RepoRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                DeployError::DatabaseError(format!(
                    "Invalid created_at '{}' for repo {}: {}",
                    row.created_at, row.id, e
                ))
            })?;

        Ok(RepoMapping {
            id: row.id,
            name: row.name,
            branch: row.branch,
            app: row.app,
            created_at,
        })
    }
}

/// Persistent mapping storage using SQLite
#[derive(Clone)]
pub struct SqlMappingStore {
    pool: SqlitePool,
}

impl SqlMappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for SqlMappingStore {
    /// Get the mapping for a repository branch
    async fn get(&self, name: &str, branch: &str) -> Result<Option<RepoMapping>, DeployError> {
        let row = sqlx::query_as::<_, RepoRow>(
            r#"
            SELECT id, name, branch, app, created_at
            FROM repos
            WHERE name = ? AND branch = ?
            "#,
        )
        .bind(name)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DeployError::DatabaseError(format!("Failed to fetch repo: {}", e)))?;

        row.map(RepoMapping::try_from).transpose()
    }

    /// Get all mappings, oldest first
    async fn list(&self) -> Result<Vec<RepoMapping>, DeployError> {
        let rows = sqlx::query_as::<_, RepoRow>(
            "SELECT id, name, branch, app, created_at FROM repos ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeployError::DatabaseError(format!("Failed to fetch repos: {}", e)))?;

        rows.into_iter().map(RepoMapping::try_from).collect()
    }

    /// Create a new mapping record
    async fn create(&self, mapping: NewMapping) -> Result<RepoMapping, DeployError> {
        let mapping = mapping.with_default_branch();
        let created_at = Utc::now();

        let result = sqlx::query("INSERT INTO repos (name, branch, app, created_at) VALUES (?, ?, ?, ?)")
            .bind(&mapping.name)
            .bind(&mapping.branch)
            .bind(&mapping.app)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db_err) if db_err.is_unique_violation() => DeployError::DuplicateMapping {
                    name: mapping.name.clone(),
                    branch: mapping.branch.clone(),
                },
                _ => DeployError::DatabaseError(format!("Failed to create repo: {}", e)),
            })?;

        Ok(RepoMapping {
            id: result.last_insert_rowid(),
            name: mapping.name,
            branch: mapping.branch,
            app: mapping.app,
            created_at,
        })
    }
}
