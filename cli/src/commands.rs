//! Subcommand implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use dump_scrambler_core::{Config, Env, SchemaSource};

/// Arguments a dump script hands to `pg_dump` and the obfuscator
#[derive(Debug, Serialize)]
pub struct DumpOptions {
    pub dump_path: String,
    pub pg_dump_options: Vec<String>,
    pub obfuscator_options: String,
}

/// Introspect the live schema and merge in the config file at `path`, if any
pub async fn reconcile<S, E>(source: &S, path: &Path, env: &E) -> Result<Config>
where
    S: SchemaSource,
    E: Env,
{
    let fresh = Config::from_schema(source, env)
        .await
        .context("Schema introspection failed")?;

    if !path.exists() {
        info!("No config at {}, starting from the live schema", path.display());
        return Ok(fresh);
    }

    let persisted = Config::read_file(path, env)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(fresh.update_with(&persisted, env)?)
}

/// Reconcile and write the result back for review
pub async fn config_from_db<S, E>(source: &S, path: &Path, env: &E) -> Result<Config>
where
    S: SchemaSource,
    E: Env,
{
    let merged = reconcile(source, path, env).await?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    merged
        .write_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    report_unspecified(&merged);
    Ok(merged)
}

/// Log every table that still has unspecified columns, returning the column count
pub fn report_unspecified(config: &Config) -> usize {
    let unspecified = unspecified_names(config);
    let total = unspecified.values().map(Vec::len).sum();

    if total == 0 {
        info!("All columns have a scramble method");
    }
    for (table, columns) in &unspecified {
        warn!("{} has unspecified columns: {}", table, columns.join(", "));
    }

    total
}

/// Unspecified column names per table
pub fn unspecified_names(config: &Config) -> BTreeMap<String, Vec<String>> {
    config
        .unspecified_columns()
        .into_iter()
        .map(|(table, columns)| {
            (
                table.to_string(),
                columns.iter().map(|c| c.name().to_string()).collect(),
            )
        })
        .collect()
}

/// Read the config file and compute the dump arguments
pub fn dump_options<E: Env>(path: &Path, env: &E) -> Result<DumpOptions> {
    let config = Config::read_file(path, env)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(DumpOptions {
        dump_path: config.dump_path().to_string(),
        pg_dump_options: config.pg_dump_options(),
        obfuscator_options: config.obfuscator_options(),
    })
}
