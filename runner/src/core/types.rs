//! Shared deterministic types for runner core logic.
//!
//! These types define stable contracts between discovery, the coordinator and
//! the executor. They carry no I/O handles and never change once built.

use std::fmt;
use std::path::{Path, PathBuf};

/// One script discovered under the script root.
///
/// Identity is the absolute path. Discovery order is the position in the list
/// returned by the collector; the list is frozen before any scope opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ScriptFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Where a server message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Informational output (notices, warnings, `RAISE NOTICE`).
    Info,
    /// An error response reported by the server for the batch.
    Server,
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageOrigin::Info => f.write_str("info"),
            MessageOrigin::Server => f.write_str("server"),
        }
    }
}

/// A message produced by the server while a script ran.
///
/// Messages are observational: they are logged verbatim and never abort a run
/// on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub origin: MessageOrigin,
    pub text: String,
}

impl ServerMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            origin: MessageOrigin::Info,
            text: text.into(),
        }
    }

    pub fn server(text: impl Into<String>) -> Self {
        Self {
            origin: MessageOrigin::Server,
            text: text.into(),
        }
    }

    /// Render the line written to the run log.
    pub fn log_line(&self) -> String {
        format!("{} message: {}", self.origin, self.text)
    }
}

/// Counts reported after a run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Scripts whose effects were committed.
    pub scripts_committed: usize,
    /// Scopes committed (one per script, or one for the whole run).
    pub scopes_committed: usize,
}
