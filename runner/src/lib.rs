//! Ordered SQL release runner.
//!
//! Discovers the scripts under a release directory and applies them, in a
//! deterministic order, to a PostgreSQL server inside transaction scopes. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (ignore sets, scope policy,
//!   connection-string normalization). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, discovery, the run log,
//!   the database). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`coordinator`], [`run`], [`timeout`]) coordinate
//! core logic with I/O to implement the CLI commands.

pub mod coordinator;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod timeout;
