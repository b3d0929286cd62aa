//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Errors that can occur while composing a stack.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration key: {0}")]
    MissingConfig(String),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Duplicate resource URN: {0}")]
    DuplicateResource(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid property value for {property}: {message}")]
    InvalidProperty { property: String, message: String },

    #[error("Resolver error: {0}")]
    Resolver(String),

    #[error("{} deferred value(s) failed: {}", .0.len(), .0.join("; "))]
    Deferred(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
