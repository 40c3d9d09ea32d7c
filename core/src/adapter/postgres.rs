//! PostgreSQL schema source

use async_trait::async_trait;
use sqlx::{postgres::PgPool, Row};
use tracing::{debug, info, warn};

use crate::adapter::SchemaSource;
use crate::error::Result;

/// Schema source backed by `information_schema` of one PostgreSQL schema
pub struct PostgresSchemaSource {
    /// Connection pool to the database being dumped
    pool: PgPool,
    /// Schema to introspect, usually `public`
    schema: String,
}

impl PostgresSchemaSource {
    /// Create a new PostgreSQL schema source
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Connect to `database_url` and introspect `schema`
    pub async fn connect(database_url: &str, schema: impl Into<String>) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        let schema = schema.into();
        info!("Connected to database, introspecting schema {}", schema);
        Ok(Self::new(pool, schema))
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SchemaSource for PostgresSchemaSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
                AND table_schema = $1
            ORDER BY table_name
        "#;

        let rows = sqlx::query(query)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            warn!("No tables visible in schema {}", self.schema);
        }

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("table_name"))
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let query = r#"
            SELECT column_name::text AS column_name
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(&self.schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        // A table dropped between listing and this query has no columns at all
        if rows.is_empty() {
            debug!("No columns found for {}.{}", self.schema, table);
            return Ok(None);
        }

        Ok(Some(
            rows.iter()
                .map(|row| row.get::<String, _>("column_name"))
                .collect(),
        ))
    }
}
