//! Core error types for the dump scrambler

use thiserror::Error;

/// Core error type for all operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed config: {0}")]
    MalformedConfig(String),

    #[error("Duplicate table: {0}")]
    DuplicateTable(String),

    #[error("Duplicate column: {table}.{column}")]
    DuplicateColumn { table: String, column: String },

    #[error("Unsafe YAML: {0}")]
    UnsafeYaml(String),

    #[error("Schema introspection failed: {0}")]
    IntrospectionFailed(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;
