//! One complete run: discovery, timeout ceiling, then execution.
//!
//! The run log is recreated first; if that fails nothing else happens and the
//! error is returned to the caller. Every later failure is written to the log
//! as `Error Message: ...` and reported through [`RunOutcome`].

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::coordinator::TransactionCoordinator;
use crate::core::policy::ScopeOptions;
use crate::core::types::RunSummary;
use crate::error::RunError;
use crate::exit_codes;
use crate::io::collector::collect_scripts;
use crate::io::config::RunConfig;
use crate::io::database::Database;
use crate::io::run_log::RunLog;
use crate::timeout::TimeoutAuthority;

/// How a run ended once its log existed.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed(RunError),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(_) => exit_codes::OK,
            RunOutcome::Failed(err) if err.is_configuration() => exit_codes::INVALID,
            RunOutcome::Failed(_) => exit_codes::FAILED,
        }
    }
}

/// Run every script under `config.script_root` against `database`.
///
/// Log lines are echoed to `console`.
#[instrument(skip_all, fields(root = %config.script_root.display(), policy = %config.policy()))]
pub async fn execute<D: Database>(
    config: &RunConfig,
    database: &D,
    authority: &TimeoutAuthority<'_>,
    console: Box<dyn Write + Send>,
) -> Result<RunOutcome> {
    let mut log = RunLog::with_console(&config.log_file, console).context("open run log")?;

    match run_phases(config, database, authority, &mut log).await {
        Ok(summary) => {
            info!(scripts = summary.scripts_committed, "run completed");
            Ok(RunOutcome::Completed(summary))
        }
        Err(err) => {
            warn!(err = %err, "run failed");
            log.append(format!("Error Message: {err}"))?;
            Ok(RunOutcome::Failed(err))
        }
    }
}

async fn run_phases<D: Database>(
    config: &RunConfig,
    database: &D,
    authority: &TimeoutAuthority<'_>,
    log: &mut RunLog,
) -> Result<RunSummary, RunError> {
    let scripts = collect_scripts(
        &config.script_root,
        &config.ignored_files(),
        &config.ignored_folders(),
        log,
    )?;

    raise_ceiling(authority, config, log)?;
    let options = ScopeOptions::read_committed(authority.effective_timeout(config.timeout()));

    TransactionCoordinator::new(database, config.policy(), options, config.timeout())
        .run(&scripts, log)
        .await
}

/// Raise the process ceiling to the configured timeout. A refusal is logged
/// and the run goes on with the ceiling it has.
fn raise_ceiling(
    authority: &TimeoutAuthority<'_>,
    config: &RunConfig,
    log: &mut RunLog,
) -> Result<(), RunError> {
    let line = match authority.raise_maximum_timeout(config.timeout()) {
        Ok(ceiling) => format!(
            "Maximum transaction timeout set to {} minutes",
            ceiling.as_secs() / 60
        ),
        Err(err) => format!(
            "Warning: {err}; transactions are limited to {} minutes",
            authority.maximum().as_secs() / 60
        ),
    };
    log.append(line).map_err(RunError::Log)
}
