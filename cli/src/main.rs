//! Dump Scrambler CLI
//!
//! Keeps the scramble config in sync with the live schema and prints the
//! arguments a dump script needs.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dump_scrambler_core::adapter::PostgresSchemaSource;
use dump_scrambler_core::ProcessEnv;

#[derive(Debug, Parser)]
#[command(name = "dump-scrambler", version, about = "Manage scramble configs for database dumps")]
struct Cli {
    /// Scramble config file [default: config/pgdump_scrambler.yml]
    #[arg(long, global = true)]
    config: Option<String>,

    /// Database to introspect [env: DATABASE_URL]
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// PostgreSQL schema to introspect [default: public]
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile the config file with the live schema and write it back
    ConfigFromDb,
    /// List columns that still need a scramble method
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print pg_dump and obfuscator arguments from the config file
    Options {
        /// Print the arguments as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            database_url: self.database_url.clone(),
            config_path: self.config.clone(),
            schema: self.schema.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dump_scrambler=debug".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(
            cli.json_logs
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::CliConfig::load(cli.overrides())?;
    let path = PathBuf::from(&config.config_path);
    let env = ProcessEnv;

    match cli.command {
        Command::ConfigFromDb => {
            info!("Reconciling {} with the live schema", path.display());
            let source = PostgresSchemaSource::connect(config.database_url()?, &config.schema).await?;
            let result = commands::config_from_db(&source, &path, &env).await;
            source.close().await;
            result?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { json } => {
            let source = PostgresSchemaSource::connect(config.database_url()?, &config.schema).await?;
            let result = commands::reconcile(&source, &path, &env).await;
            source.close().await;

            let unspecified = commands::unspecified_names(&result?);
            if json {
                println!("{}", serde_json::to_string_pretty(&unspecified)?);
            } else {
                for (table, columns) in &unspecified {
                    println!("{}: {}", table, columns.join(", "));
                }
            }

            Ok(if unspecified.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Options { json } => {
            let options = commands::dump_options(&path, &env)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&options)?);
            } else {
                println!("{}", options.obfuscator_options);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
