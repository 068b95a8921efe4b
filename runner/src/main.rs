//! Ordered SQL release runner.
//!
//! Applies every script under the configured release directory to a
//! PostgreSQL server, inside one transaction or one per script, and records
//! the run in a plain log file.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use release_runner::exit_codes;
use release_runner::io::config::{DEFAULT_CONFIG_PATH, RunConfig, load_config, write_template};
use release_runner::io::postgres::PgDatabase;
use release_runner::logging::{self, NoticeTap};
use release_runner::run::{self, RunOutcome};
use release_runner::timeout::TimeoutAuthority;

#[derive(Parser)]
#[command(
    name = "release-runner",
    version,
    about = "Apply ordered SQL release scripts inside transaction scopes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover and execute every script under the script root.
    Run {
        /// Config file to read.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Exit 0 even when a script fails (the log still records it).
        #[arg(long)]
        exit_zero: bool,
    },
    /// Write a template config file.
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the config and script root without touching the server.
    Validate {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let notices = logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let code = match dispatch(cli.command, notices).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn dispatch(command: Command, notices: NoticeTap) -> Result<i32> {
    match command {
        Command::Run { config, exit_zero } => cmd_run(&config, exit_zero, notices).await,
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Validate { config } => cmd_validate(&config),
    }
}

async fn cmd_run(config_path: &Path, exit_zero: bool, notices: NoticeTap) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let database = connect_target(&cfg, notices)?;
    let authority = TimeoutAuthority::process(cfg.override_timeout_ceiling);

    let outcome = run::execute(&cfg, &database, &authority, Box::new(io::stdout())).await?;
    if let RunOutcome::Failed(err) = &outcome {
        eprintln!("{err}");
    }
    if exit_zero {
        return Ok(exit_codes::OK);
    }
    Ok(outcome.exit_code())
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    write_template(config_path, force)?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    connect_target(&cfg, NoticeTap::default())?;
    if !cfg.script_root.is_dir() {
        bail!("script folder {} doesn't exist", cfg.script_root.display());
    }
    println!("ok");
    Ok(exit_codes::OK)
}

fn connect_target(cfg: &RunConfig, notices: NoticeTap) -> Result<PgDatabase> {
    PgDatabase::from_connection_string(&cfg.normalized_connection_string(), cfg.timeout(), notices)
        .context("invalid connection_string")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["release-runner", "run"]);
        match cli.command {
            Command::Run { config, exit_zero } => {
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_PATH));
                assert!(!exit_zero);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_exit_zero_with_config() {
        let cli = Cli::parse_from(["release-runner", "run", "-c", "ci.toml", "--exit-zero"]);
        assert!(matches!(
            cli.command,
            Command::Run { ref config, exit_zero: true } if config == Path::new("ci.toml")
        ));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["release-runner", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["release-runner", "select"]).is_err());
    }
}
