use std::io;

/// Custom error type for deploy_webhook operations
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Mapping already exists for '{name}' ({branch} branch)")]
    DuplicateMapping { name: String, branch: String },

    #[error("Mapping store is read-only: {0}")]
    ReadOnlyStore(String),

    #[error("Service discovery failed: {0}")]
    DiscoveryError(String),

    #[error("Controller request failed: {operation}\n{message}")]
    ControllerError { operation: String, message: String },

    #[error("Attach protocol error: {0}")]
    AttachError(String),

    #[error("Deploy timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

/// Helper type for Results that use DeployError
pub type Result<T> = std::result::Result<T, DeployError>;
