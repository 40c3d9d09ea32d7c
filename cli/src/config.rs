//! CLI configuration

use anyhow::{Context, Result};
use serde::Deserialize;

/// Where the scramble config lives unless told otherwise
pub const DEFAULT_CONFIG_PATH: &str = "config/pgdump_scrambler.yml";

/// Resolved CLI configuration
///
/// Precedence, lowest first: built-in defaults, `DATABASE_URL`,
/// `SCRAMBLER_*` environment variables, command-line flags.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Database to introspect
    pub database_url: Option<String>,
    /// Scramble config file path
    pub config_path: String,
    /// PostgreSQL schema to introspect
    pub schema: String,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub config_path: Option<String>,
    pub schema: Option<String>,
}

impl CliConfig {
    /// Load configuration from defaults, environment and flags
    pub fn load(overrides: Overrides) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .set_default("config_path", DEFAULT_CONFIG_PATH)?
            .set_default("schema", "public")?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database_url", url)?;
        }

        let settings = builder
            .add_source(::config::Environment::with_prefix("SCRAMBLER"))
            .set_override_option("database_url", overrides.database_url)?
            .set_override_option("config_path", overrides.config_path)?
            .set_override_option("schema", overrides.schema)?
            .build()
            .context("Failed to load settings")?;

        settings.try_deserialize().context("Invalid settings")
    }

    /// Database URL, required by the commands that introspect
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL (or --database-url) is required")
    }
}
