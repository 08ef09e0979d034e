//! MobilePack CLI - worker entry point
//!
//! This binary runs the deployment-processing worker.
//!
//! # Architecture
//!
//! The CLI is organized into:
//! - `Cli`: Argument parsing (clap)
//! - `CliRunner`: Common setup (logging, config, component wiring)
//! - `CliError`: Centralized error handling with user-friendly messages
//!
//! # Modes
//!
//! Without flags the worker polls its queues until interrupted. Two
//! one-shot flags change that:
//! - `--entity-id <v>` resolves a hash / `"x,y"` pointer / world name,
//!   enqueues one job, and then continues into the normal loop.
//! - `--profile <address>` expands an avatar's wearables and emotes and
//!   exits with status 0 when done.

mod error;
mod runner;

use clap::Parser;
use runner::CliRunner;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mobilepack")]
#[command(version = mobilepack::VERSION)]
#[command(about = "Deployment-processing worker for mobile-ready assets", long_about = None)]
struct Cli {
    /// Resolve this entity (hash, "x,y" pointer, or world name), enqueue
    /// one job for it, then keep consuming.
    #[arg(long = "entity-id", value_name = "ID")]
    entity_id: Option<String>,

    /// Expand one avatar profile (all wearables and emotes), then exit.
    #[arg(long, value_name = "ADDRESS", conflicts_with = "entity_id")]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match CliRunner::init() {
        Ok(runner) => match cli.profile {
            Some(address) => runner.run_profile(&address).await,
            None => runner.run_worker(cli.entity_id.as_deref()).await,
        },
        Err(error) => Err(error),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("mobilepack: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_no_flags() {
        let cli = Cli::parse_from(["mobilepack"]);
        assert!(cli.entity_id.is_none());
        assert!(cli.profile.is_none());
    }

    #[test]
    fn test_cli_parses_entity_id() {
        let cli = Cli::parse_from(["mobilepack", "--entity-id", "14,10"]);
        assert_eq!(cli.entity_id.as_deref(), Some("14,10"));
    }

    #[test]
    fn test_cli_parses_profile() {
        let cli = Cli::parse_from(["mobilepack", "--profile", "0xABC"]);
        assert_eq!(cli.profile.as_deref(), Some("0xABC"));
    }

    #[test]
    fn test_profile_conflicts_with_entity_id() {
        let result =
            Cli::try_parse_from(["mobilepack", "--profile", "0xABC", "--entity-id", "bafy"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
