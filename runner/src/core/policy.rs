//! Transaction scoping policy.
//!
//! A run either wraps every script in one scope or gives each script its own.
//! Isolation is fixed at read-committed for both.

use std::fmt;
use std::time::Duration;

/// How scripts are grouped into transaction scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePolicy {
    /// One scope spans the whole ordered list; committed after the last script.
    SingleScope,
    /// One scope per script; committed before the next script starts.
    PerScript,
}

impl ScopePolicy {
    pub fn from_single_scope_flag(single: bool) -> Self {
        if single {
            ScopePolicy::SingleScope
        } else {
            ScopePolicy::PerScript
        }
    }

    /// True when the open scope must be committed after every script.
    pub fn commits_per_script(self) -> bool {
        matches!(self, ScopePolicy::PerScript)
    }
}

impl fmt::Display for ScopePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopePolicy::SingleScope => f.write_str("single-scope"),
            ScopePolicy::PerScript => f.write_str("per-script"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
}

impl IsolationLevel {
    /// SQL spelling used in `BEGIN ISOLATION LEVEL ...`.
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
        }
    }
}

/// Parameters every scope is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeOptions {
    pub isolation: IsolationLevel,
    /// Lifetime budget of the scope, already clamped to the process ceiling.
    pub timeout: Duration,
}

impl ScopeOptions {
    pub fn read_committed(timeout: Duration) -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted,
            timeout,
        }
    }
}
