//! Test-only helpers: an in-memory transactional database, script trees on
//! disk and quiet run logs.
//!
//! [`FakeDatabase`] understands a few comment markers inside script text:
//!
//! - `-- notice: <text>` reports `<text>` as an informational message.
//! - `-- sleep: <millis>` delays the batch, for timeout tests.
//! - the configured failure marker makes the batch fail with a server error.
//!
//! Like a real connection, a session holds its messages until they are
//! taken, and a session whose batch was cut off keeps that batch running:
//! a rollback sent to it waits for the batch to finish first.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::Instant;

use crate::core::policy::{IsolationLevel, ScopeOptions};
use crate::core::types::ServerMessage;
use crate::error::ExecutionError;
use crate::io::database::{Database, Session};
use crate::io::run_log::RunLog;

const NOTICE_MARKER: &str = "-- notice:";
const SLEEP_MARKER: &str = "-- sleep:";

/// Everything the fake has observed so far.
#[derive(Debug, Clone, Default)]
pub struct FakeState {
    /// Script texts made durable by a commit, in commit order.
    pub committed: Vec<String>,
    /// Batches sent, including failed ones.
    pub executed: usize,
    pub scopes_opened: usize,
    pub scopes_committed: usize,
    /// Explicit rollbacks plus sessions dropped while still open.
    pub rollbacks: usize,
    /// Sessions dropped while still open, without a rollback.
    pub abandoned: usize,
    pub open_now: usize,
    pub max_open: usize,
    pub isolation: Vec<IsolationLevel>,
}

#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<FakeState>>,
    fail_marker: Option<String>,
    commit_notice: Option<String>,
    fail_begin: bool,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every batch whose text contains `marker`.
    pub fn fail_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    /// Report `text` as an informational message on every commit.
    pub fn notice_on_commit(mut self, text: &str) -> Self {
        self.commit_notice = Some(text.to_string());
        self
    }

    /// Refuse to open any scope.
    pub fn fail_to_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub fn snapshot(&self) -> FakeState {
        lock(&self.state).clone()
    }
}

#[async_trait]
impl Database for FakeDatabase {
    type Session = FakeSession;

    async fn begin(&self, options: &ScopeOptions) -> Result<FakeSession, ExecutionError> {
        if self.fail_begin {
            return Err(ExecutionError::Connect {
                message: "connection refused".to_string(),
            });
        }
        {
            let mut state = lock(&self.state);
            state.scopes_opened += 1;
            state.open_now += 1;
            state.max_open = state.max_open.max(state.open_now);
            state.isolation.push(options.isolation);
        }
        Ok(FakeSession {
            state: Arc::clone(&self.state),
            fail_marker: self.fail_marker.clone(),
            commit_notice: self.commit_notice.clone(),
            pending: Vec::new(),
            messages: Vec::new(),
            busy_until: None,
            finished: false,
        })
    }
}

pub struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    fail_marker: Option<String>,
    commit_notice: Option<String>,
    pending: Vec<String>,
    messages: Vec<ServerMessage>,
    /// End of a batch that is still running after its caller gave up.
    busy_until: Option<Instant>,
    finished: bool,
}

impl FakeSession {
    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            lock(&self.state).open_now -= 1;
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(&mut self, sql: &str) -> Result<(), ExecutionError> {
        lock(&self.state).executed += 1;

        for line in sql.lines().map(str::trim) {
            if let Some(text) = line.strip_prefix(NOTICE_MARKER) {
                self.messages.push(ServerMessage::info(text.trim()));
            } else if let Some(millis) = line.strip_prefix(SLEEP_MARKER) {
                let delay = Duration::from_millis(millis.trim().parse().unwrap_or(0));
                let until = Instant::now() + delay;
                self.busy_until = Some(until);
                tokio::time::sleep_until(until).await;
                self.busy_until = None;
            }
        }

        if let Some(marker) = &self.fail_marker
            && sql.contains(marker.as_str())
        {
            let message = format!("syntax error at or near \"{marker}\"");
            self.messages.push(ServerMessage::server(message.clone()));
            return Err(ExecutionError::Rejected { message });
        }
        self.pending.push(sql.to_string());
        Ok(())
    }

    fn take_messages(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.messages)
    }

    async fn commit(&mut self) -> Result<(), ExecutionError> {
        {
            let mut state = lock(&self.state);
            state.committed.append(&mut self.pending);
            state.scopes_committed += 1;
        }
        if let Some(text) = &self.commit_notice {
            self.messages.push(ServerMessage::info(text.as_str()));
        }
        self.close();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ExecutionError> {
        if let Some(until) = self.busy_until.take() {
            tokio::time::sleep_until(until).await;
        }
        if !self.finished {
            self.pending.clear();
            lock(&self.state).rollbacks += 1;
            self.close();
        }
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.finished {
            {
                let mut state = lock(&self.state);
                state.rollbacks += 1;
                state.abandoned += 1;
            }
            self.close();
        }
    }
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cloneable console that remembers what was echoed to it.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A temporary directory holding a `release/` script root.
pub struct ScriptTree {
    dir: TempDir,
    root: PathBuf,
}

impl ScriptTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("release");
        std::fs::create_dir_all(&root).expect("create script root");
        Self { dir, root }
    }

    /// Write `contents` to `relative` under the script root.
    pub fn file(self, relative: &str, contents: &str) -> Self {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create script dir");
        }
        std::fs::write(&path, contents).expect("write script");
        self
    }

    /// The temporary directory itself.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The script root inside it.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ScriptTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A run log at `dir/run.log` that echoes nowhere.
pub fn quiet_log(dir: &Path) -> (RunLog, PathBuf) {
    let path = dir.join("run.log");
    let log = RunLog::with_console(&path, Box::new(io::sink())).expect("create run log");
    (log, path)
}
