//! Transaction scoping around script execution.
//!
//! The coordinator owns the only scope slot of a run. It is either closed or
//! holds exactly one open [`ExecutionScope`]; scopes are never nested. Under
//! single-scope policy the slot stays open across the whole list and is
//! committed after the last script; under per-script policy it is committed
//! after every script. On failure the open scope is rolled back and dropped,
//! so scripts already committed by earlier scopes stay applied. A scope whose
//! batch was cut off by a timeout still has that batch running on the server;
//! it is dropped without a rollback, which closes the connection.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::core::policy::{ScopeOptions, ScopePolicy};
use crate::core::types::{RunSummary, ScriptFile, ServerMessage};
use crate::error::{ExecutionError, RunError};
use crate::io::database::{Database, Session};
use crate::io::executor::execute_script;
use crate::io::run_log::{RunLog, timestamp};

/// One open transaction and the session it lives on.
pub struct ExecutionScope<S: Session> {
    session: S,
    options: ScopeOptions,
    opened_at: Instant,
    scripts: usize,
    interrupted: bool,
}

impl<S: Session> ExecutionScope<S> {
    async fn open<D>(database: &D, options: ScopeOptions) -> Result<Self, ExecutionError>
    where
        D: Database<Session = S>,
    {
        let session = database.begin(&options).await?;
        Ok(Self {
            session,
            options,
            opened_at: Instant::now(),
            scripts: 0,
            interrupted: false,
        })
    }

    /// Time left before the scope expires, or `None` once it has.
    pub fn remaining(&self) -> Option<Duration> {
        self.options
            .timeout
            .checked_sub(self.opened_at.elapsed())
            .filter(|left| !left.is_zero())
    }

    /// Run one batch, bounded by the statement timeout and the scope's
    /// remaining lifetime, whichever ends first.
    ///
    /// Server messages received for the batch are appended to `messages`
    /// however it ends, including when the timeout cuts it off.
    pub async fn execute(
        &mut self,
        sql: &str,
        statement_timeout: Duration,
        messages: &mut Vec<ServerMessage>,
    ) -> Result<(), ExecutionError> {
        let expired = ExecutionError::ScopeExpired {
            timeout: self.options.timeout,
        };
        let Some(remaining) = self.remaining() else {
            return Err(expired);
        };
        let budget = statement_timeout.min(remaining);

        self.scripts += 1;
        let outcome = tokio::time::timeout(budget, self.session.execute(sql)).await;
        messages.extend(self.session.take_messages());

        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.interrupted = true;
                if budget < statement_timeout {
                    Err(expired)
                } else {
                    Err(ExecutionError::TimedOut { after: budget })
                }
            }
        }
    }

    async fn commit(
        mut self,
        messages: &mut Vec<ServerMessage>,
    ) -> Result<usize, ExecutionError> {
        let result = if self.remaining().is_none() {
            if let Err(err) = self.session.rollback().await {
                warn!(err = %err, "rollback of expired scope failed");
            }
            Err(ExecutionError::ScopeExpired {
                timeout: self.options.timeout,
            })
        } else {
            self.session.commit().await.map(|()| self.scripts)
        };
        messages.extend(self.session.take_messages());
        result
    }

    async fn dispose(mut self) {
        if self.interrupted {
            debug!("abandoning interrupted session");
            return;
        }
        if let Err(err) = self.session.rollback().await {
            warn!(err = %err, "rollback during dispose failed");
        }
    }
}

/// The coordinator's scope slot: closed, or holding exactly one open scope.
pub struct ScopeSlot<S: Session> {
    open: Option<ExecutionScope<S>>,
}

impl<S: Session> ScopeSlot<S> {
    pub fn closed() -> Self {
        Self { open: None }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The open scope, opening one first if the slot is closed.
    async fn ensure_open<D>(
        &mut self,
        database: &D,
        options: ScopeOptions,
    ) -> Result<&mut ExecutionScope<S>, ExecutionError>
    where
        D: Database<Session = S>,
    {
        let scope = match self.open.take() {
            Some(scope) => scope,
            None => {
                debug!(timeout_secs = options.timeout.as_secs(), "opening scope");
                ExecutionScope::open(database, options).await?
            }
        };
        Ok(self.open.insert(scope))
    }

    /// Commit and close the open scope. Returns the number of scripts it held,
    /// or `None` if the slot was already closed.
    async fn commit(
        &mut self,
        messages: &mut Vec<ServerMessage>,
    ) -> Result<Option<usize>, ExecutionError> {
        match self.open.take() {
            Some(scope) => scope.commit(messages).await.map(Some),
            None => Ok(None),
        }
    }

    /// Roll back and close the open scope, if any.
    async fn dispose(&mut self) {
        if let Some(scope) = self.open.take() {
            scope.dispose().await;
        }
    }
}

/// Applies an ordered script list under one [`ScopePolicy`].
pub struct TransactionCoordinator<'a, D: Database> {
    database: &'a D,
    policy: ScopePolicy,
    options: ScopeOptions,
    statement_timeout: Duration,
}

impl<'a, D: Database> TransactionCoordinator<'a, D> {
    pub fn new(
        database: &'a D,
        policy: ScopePolicy,
        options: ScopeOptions,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            database,
            policy,
            options,
            statement_timeout,
        }
    }

    /// Execute `scripts` in order. Stops at the first failure.
    ///
    /// Whatever way the loop ends, no scope is left open.
    #[instrument(skip_all, fields(policy = %self.policy, scripts = scripts.len()))]
    pub async fn run(
        &self,
        scripts: &[ScriptFile],
        log: &mut RunLog,
    ) -> Result<RunSummary, RunError> {
        let mut slot = ScopeSlot::closed();
        let result = self.run_scripts(&mut slot, scripts, log).await;
        if slot.is_open() {
            warn!("run ended with an open scope; rolling back");
            slot.dispose().await;
        }
        result
    }

    async fn run_scripts(
        &self,
        slot: &mut ScopeSlot<D::Session>,
        scripts: &[ScriptFile],
        log: &mut RunLog,
    ) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();

        for script in scripts {
            let scope = slot
                .ensure_open(self.database, self.options)
                .await
                .map_err(|source| script_error(script, source))?;

            append(log, format!("Executing script {script} at {}", timestamp()))?;
            execute_script(scope, script, self.statement_timeout, log).await?;

            if self.policy.commits_per_script() {
                let mut messages = Vec::new();
                let committed = slot.commit(&mut messages).await;
                log.append_messages(&messages).map_err(RunError::Log)?;
                let committed = committed.map_err(|source| script_error(script, source))?;
                summary.scripts_committed += committed.unwrap_or(0);
                summary.scopes_committed += 1;
            }
            append(
                log,
                format!("Execution completed for the script {script} at {}", timestamp()),
            )?;
        }

        let mut messages = Vec::new();
        let committed = slot.commit(&mut messages).await;
        log.append_messages(&messages).map_err(RunError::Log)?;
        if let Some(committed) = committed? {
            summary.scripts_committed += committed;
            summary.scopes_committed += 1;
        }
        append(log, format!("Completed the transaction at {}", timestamp()))?;

        info!(
            scripts_committed = summary.scripts_committed,
            scopes_committed = summary.scopes_committed,
            "run complete"
        );
        Ok(summary)
    }
}

fn script_error(script: &ScriptFile, source: ExecutionError) -> RunError {
    RunError::Script {
        script: script.path().to_path_buf(),
        source,
    }
}

fn append(log: &mut RunLog, line: String) -> Result<(), RunError> {
    log.append(line).map_err(RunError::Log)
}
