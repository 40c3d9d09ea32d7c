//! Schema source abstraction for introspecting live databases

use crate::error::Result;
use async_trait::async_trait;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresSchemaSource;

/// Read-only view of a live database schema
///
/// Each database backend implements this trait; the config factory only
/// ever sees table and column names.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// List table names, in any order
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// List column names of a table.
    /// Returns `None` when the source has no record of the table.
    async fn list_columns(&self, table: &str) -> Result<Option<Vec<String>>>;
}
