//! Repository/branch to application mappings

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{DeployError, Result};

/// Branch assumed when a mapping is created without one
pub const DEFAULT_BRANCH: &str = "master";

/// A stored association from `(name, branch)` to a deployable app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoMapping {
    pub id: i64,
    /// Repository full name, e.g. `acme/widget`
    pub name: String,
    pub branch: String,
    /// Application identifier understood by the job runner
    pub app: String,
    pub created_at: DateTime<Utc>,
}

/// Input to the administrative write path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMapping {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub app: String,
}

impl NewMapping {
    /// Returns a copy with an empty branch replaced by [`DEFAULT_BRANCH`].
    pub fn with_default_branch(mut self) -> Self {
        if self.branch.trim().is_empty() {
            self.branch = DEFAULT_BRANCH.to_string();
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.app.trim().is_empty()
    }
}

/// Lookup service for mappings, shared by every request task.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Exact-match lookup. `Ok(None)` when nothing is mapped.
    async fn get(&self, name: &str, branch: &str) -> Result<Option<RepoMapping>>;

    async fn list(&self) -> Result<Vec<RepoMapping>>;

    /// Inserts a mapping, failing with [`DeployError::DuplicateMapping`]
    /// when `(name, branch)` already exists.
    async fn create(&self, mapping: NewMapping) -> Result<RepoMapping>;
}

#[derive(Debug, Deserialize)]
struct MappingsFile {
    #[serde(default)]
    repo: Vec<NewMapping>,
}

/// Read-only mappings loaded once from a TOML file:
///
/// ```toml
/// [[repo]]
/// name = "acme/widget"
/// branch = "main"
/// app = "app-42"
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticMappingStore {
    mappings: HashMap<(String, String), RepoMapping>,
}

impl StaticMappingStore {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: MappingsFile = toml::from_str(content)?;
        let loaded_at = Utc::now();
        let mut mappings = HashMap::new();

        for (idx, entry) in file.repo.into_iter().enumerate() {
            if !entry.is_complete() {
                return Err(DeployError::ConfigError(format!(
                    "mapping #{} needs both name and app",
                    idx + 1
                )));
            }
            let entry = entry.with_default_branch();
            let key = (entry.name.clone(), entry.branch.clone());
            if mappings.contains_key(&key) {
                return Err(DeployError::DuplicateMapping {
                    name: entry.name,
                    branch: entry.branch,
                });
            }
            mappings.insert(
                key,
                RepoMapping {
                    id: idx as i64 + 1,
                    name: entry.name,
                    branch: entry.branch,
                    app: entry.app,
                    created_at: loaded_at,
                },
            );
        }

        Ok(Self { mappings })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::ConfigError(format!(
                "Failed to read mappings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let store = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} static mapping(s) from {}",
            store.mappings.len(),
            path.display()
        );
        Ok(store)
    }
}

#[async_trait]
impl MappingStore for StaticMappingStore {
    async fn get(&self, name: &str, branch: &str) -> Result<Option<RepoMapping>> {
        Ok(self
            .mappings
            .get(&(name.to_string(), branch.to_string()))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<RepoMapping>> {
        let mut all: Vec<_> = self.mappings.values().cloned().collect();
        all.sort_by_key(|m| m.id);
        Ok(all)
    }

    async fn create(&self, _mapping: NewMapping) -> Result<RepoMapping> {
        Err(DeployError::ReadOnlyStore("mappings are loaded from a file".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAPPINGS: &str = r#"
        [[repo]]
        name = "acme/widget"
        branch = "main"
        app = "app-42"

        [[repo]]
        name = "acme/legacy"
        app = "legacy-app"
    "#;

    #[tokio::test]
    async fn exact_match_lookup() {
        let store = StaticMappingStore::from_toml_str(MAPPINGS).unwrap();

        let found = store.get("acme/widget", "main").await.unwrap().unwrap();
        assert_eq!(found.app, "app-42");

        assert!(store.get("acme/widget", "dev").await.unwrap().is_none());
        assert!(store.get("acme/other", "main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_branch_defaults_to_master() {
        let store = StaticMappingStore::from_toml_str(MAPPINGS).unwrap();
        let found = store.get("acme/legacy", "master").await.unwrap().unwrap();
        assert_eq!(found.app, "legacy-app");
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[test]
    fn duplicate_and_incomplete_entries_are_errors() {
        let dup = r#"
            [[repo]]
            name = "a/b"
            app = "x"
            [[repo]]
            name = "a/b"
            branch = "master"
            app = "y"
        "#;
        assert!(matches!(
            StaticMappingStore::from_toml_str(dup),
            Err(DeployError::DuplicateMapping { .. })
        ));

        let incomplete = "[[repo]]\nname = \"a/b\"\n";
        assert!(matches!(
            StaticMappingStore::from_toml_str(incomplete),
            Err(DeployError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn loads_from_file_and_rejects_writes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MAPPINGS.as_bytes()).unwrap();

        let store = StaticMappingStore::load(file.path()).unwrap();
        assert!(store.get("acme/widget", "main").await.unwrap().is_some());

        let err = store
            .create(NewMapping {
                name: "a/b".into(),
                branch: "".into(),
                app: "c".into(),
            })
            .await;
        assert!(matches!(err, Err(DeployError::ReadOnlyStore(_))));
    }
}
