//! Error taxonomy for a run.
//!
//! Helpers return `anyhow::Result` with context; the driver converts them into
//! [`RunError`] at each phase boundary so the outcome can be matched on.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure talking to the target server while a script runs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("could not connect to the target server: {message}")]
    Connect { message: String },

    #[error("server rejected the batch: {message}")]
    Rejected { message: String },

    #[error("statement timed out after {}s", .after.as_secs())]
    TimedOut { after: Duration },

    #[error("transaction scope exceeded its {}s timeout", .timeout.as_secs())]
    ScopeExpired { timeout: Duration },

    #[error("commit failed: {message}")]
    Commit { message: String },

    #[error("read script {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a run stopped before completing every script.
#[derive(Debug, Error)]
pub enum RunError {
    /// Nothing was executed: the run could not be set up.
    #[error("{0:#}")]
    Configuration(anyhow::Error),

    /// A script (or its scope) failed; later scripts were not executed.
    #[error("script {}: {source}", .script.display())]
    Script {
        script: PathBuf,
        #[source]
        source: ExecutionError,
    },

    /// A scope failed outside any single script (final commit, open).
    #[error("{0}")]
    Scope(#[from] ExecutionError),

    /// The run log could not be written.
    #[error("run log: {0:#}")]
    Log(anyhow::Error),
}

impl RunError {
    pub fn configuration(err: impl Into<anyhow::Error>) -> Self {
        RunError::Configuration(err.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, RunError::Configuration(_) | RunError::Log(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_errors_name_the_script() {
        let err = RunError::Script {
            script: PathBuf::from("/release/010_tables.sql"),
            source: ExecutionError::Rejected {
                message: "relation \"users\" already exists".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "script /release/010_tables.sql: server rejected the batch: relation \"users\" already exists"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn timeouts_render_in_seconds() {
        let err = ExecutionError::TimedOut {
            after: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "statement timed out after 120s");
    }

    #[test]
    fn configuration_errors_keep_context_chain() {
        let err = RunError::configuration(
            anyhow::anyhow!("path does not exist").context("script root /missing"),
        );
        assert_eq!(err.to_string(), "script root /missing: path does not exist");
        assert!(err.is_configuration());
    }
}
