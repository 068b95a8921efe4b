//! Script execution inside an open scope.
//!
//! A script's full text is sent as one batch. Every message the server
//! produces is forwarded to the run log as it is drained, before the outcome
//! of the batch is reported.

use std::fs;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::coordinator::ExecutionScope;
use crate::core::types::ScriptFile;
use crate::error::{ExecutionError, RunError};
use crate::io::database::Session;
use crate::io::run_log::RunLog;

/// Read `script` and run it as a single batch in `scope`.
#[instrument(skip_all, fields(script = %script))]
pub async fn execute_script<S: Session>(
    scope: &mut ExecutionScope<S>,
    script: &ScriptFile,
    statement_timeout: Duration,
    log: &mut RunLog,
) -> Result<(), RunError> {
    let failed = |source| RunError::Script {
        script: script.path().to_path_buf(),
        source,
    };

    let sql = fs::read_to_string(script.path()).map_err(|source| {
        failed(ExecutionError::Read {
            path: script.path().to_path_buf(),
            source,
        })
    })?;
    debug!(bytes = sql.len(), "script loaded");

    let mut messages = Vec::new();
    let result = scope.execute(&sql, statement_timeout, &mut messages).await;
    log.append_messages(&messages).map_err(RunError::Log)?;
    result.map_err(failed)
}
