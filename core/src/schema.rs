//! Building a fresh config from a live schema

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::adapter::SchemaSource;
use crate::config::{default_s3_template, Config, DEFAULT_DUMP_PATH};
use crate::domain::{Column, Table};
use crate::env::Env;
use crate::error::Result;

/// Framework bookkeeping tables that never hold user data
pub const IGNORED_TABLES: &[&str] = &["ar_internal_metadata", "schema_migrations"];

/// Framework bookkeeping columns that never need scrambling
pub const IGNORED_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

impl Config {
    /// Fresh config with every column of every live table unspecified.
    ///
    /// Tables are visited in name order; bookkeeping tables and columns are
    /// skipped, as are tables the source has no column record for.
    pub async fn from_schema<S, E>(source: &S, env: &E) -> Result<Config>
    where
        S: SchemaSource + ?Sized,
        E: Env + ?Sized,
    {
        let mut table_names = source.list_tables().await?;
        table_names.sort();

        let mut tables = Vec::new();
        for table_name in table_names {
            if IGNORED_TABLES.contains(&table_name.as_str()) {
                debug!("Ignoring bookkeeping table {}", table_name);
                continue;
            }

            let Some(column_names) = source.list_columns(&table_name).await? else {
                warn!("No column record for table {}, skipping", table_name);
                continue;
            };

            let columns = column_names
                .into_iter()
                .filter(|name| !IGNORED_COLUMNS.contains(&name.as_str()))
                .map(Column::unspecified);
            tables.push(Table::new(table_name, columns)?);
        }

        info!("Introspected {} tables", tables.len());

        Config::new(
            tables,
            DEFAULT_DUMP_PATH,
            Some(default_s3_template()),
            Vec::new(),
            None,
            env,
        )
    }
}

/// In-memory schema, for callers that already hold the table list
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: BTreeMap<String, Vec<String>>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table<I, C>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.tables
            .insert(name.into(), columns.into_iter().map(Into::into).collect());
        self
    }
}

impl FromIterator<(String, String)> for StaticSchema {
    /// Collect `(table, column)` pairs, keeping column order per table
    fn from_iter<T: IntoIterator<Item = (String, String)>>(pairs: T) -> Self {
        let mut tables: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (table, column) in pairs {
            tables.entry(table).or_default().push(column);
        }
        Self { tables }
    }
}

#[async_trait]
impl SchemaSource for StaticSchema {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        Ok(self.tables.get(table).cloned())
    }
}
