// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifeline - a personal-safety check-in coordinator.
//!
//! This binary inspects the state a device has persisted: the published
//! snapshots, the offline queue, and the effective configuration.

mod queue;
mod status;

use clap::{Parser, Subcommand};
use lifeline_config::LifelineConfig;
use lifeline_core::{Domain, LifelineError, StorageAdapter};
use lifeline_storage::SqliteStorage;

/// Lifeline - a personal-safety check-in coordinator.
#[derive(Parser, Debug)]
#[command(name = "lifeline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the persisted check-in, contacts and alert state.
    Status {
        /// Output structured JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// List mutations waiting for replay, oldest first.
    Queue {
        /// Only show one domain (check_in, contacts, alert).
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn parse_domain(s: &str) -> Result<Domain, String> {
    s.parse::<Domain>().map_err(|_| {
        let valid: Vec<String> = Domain::ALL.iter().map(ToString::to_string).collect();
        format!("unknown domain '{s}', expected one of: {}", valid.join(", "))
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match lifeline_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            lifeline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.app.log_level);

    let result = match cli.command {
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Queue { domain }) => queue::run_queue(&config, domain).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("lifeline: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("lifeline: {e}");
        std::process::exit(1);
    }
}

fn print_config(config: &LifelineConfig) -> Result<(), LifelineError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| LifelineError::Internal(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

/// Open the configured database, running migrations if needed.
pub(crate) async fn open_storage(config: &LifelineConfig) -> Result<SqliteStorage, LifelineError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(storage)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lifeline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config =
            lifeline_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.checkin.interval_secs, 86_400);
    }

    #[test]
    fn config_renders_as_toml() {
        let config = LifelineConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[checkin]"));
        assert!(rendered.contains("interval_secs = 86400"));
    }

    #[test]
    fn domain_argument_parses() {
        assert_eq!(parse_domain("check_in").unwrap(), Domain::CheckIn);
        let err = parse_domain("pings").unwrap_err();
        assert!(err.contains("check_in"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["lifeline", "queue", "--domain", "alert"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Queue {
                domain: Some(Domain::Alert)
            })
        ));
        let cli = Cli::try_parse_from(["lifeline", "status", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Status { json: true, .. })
        ));
    }
}
