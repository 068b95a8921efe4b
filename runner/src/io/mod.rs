//! I/O for runner commands: configuration, discovery, the run log and the
//! target database.

pub mod collector;
pub mod config;
pub mod database;
pub mod executor;
pub mod postgres;
pub mod run_log;
