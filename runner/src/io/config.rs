//! Run configuration stored in `release-runner.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::connection::normalize_connection_string;
use crate::core::filter::IgnoreSet;
use crate::core::policy::ScopePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "release-runner.toml";

/// Longest timeout the server's millisecond `statement_timeout` can hold.
pub const MAX_TIMEOUT_MINUTES: u64 = i32::MAX as u64 / 60_000;

/// Run configuration (TOML).
///
/// Read once at startup and never changed during the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// PostgreSQL URL of the target server.
    pub connection_string: String,

    /// Run log path. Recreated at the start of every run.
    pub log_file: PathBuf,

    /// Directory whose scripts are applied.
    pub script_root: PathBuf,

    /// Statement and transaction timeout, in minutes.
    pub timeout_minutes: u64,

    /// Comma-separated file names skipped during discovery.
    pub ignore_files: String,

    /// Comma-separated directory names pruned during discovery.
    pub ignore_folders: String,

    /// Apply every script in one transaction (`true`) or one per script.
    pub single_transaction_scope: bool,

    /// Raise the process timeout ceiling to `timeout_minutes` at startup.
    pub override_timeout_ceiling: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            log_file: PathBuf::from("logs/release-runner.log"),
            script_root: PathBuf::from("release"),
            timeout_minutes: 60,
            ignore_files: String::new(),
            ignore_folders: String::new(),
            single_transaction_scope: true,
            override_timeout_ceiling: true,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(anyhow!("connection_string must not be empty"));
        }
        if self.timeout_minutes == 0 {
            return Err(anyhow!("timeout_minutes must be > 0"));
        }
        if self.timeout_minutes > MAX_TIMEOUT_MINUTES {
            return Err(anyhow!(
                "timeout_minutes must be <= {MAX_TIMEOUT_MINUTES}, got {}",
                self.timeout_minutes
            ));
        }
        if self.script_root.as_os_str().is_empty() {
            return Err(anyhow!("script_root must not be empty"));
        }
        if self.log_file.as_os_str().is_empty() || self.log_file.file_name().is_none() {
            return Err(anyhow!("log_file must name a file"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    pub fn policy(&self) -> ScopePolicy {
        ScopePolicy::from_single_scope_flag(self.single_transaction_scope)
    }

    pub fn ignored_files(&self) -> IgnoreSet {
        IgnoreSet::from_csv(&self.ignore_files)
    }

    pub fn ignored_folders(&self) -> IgnoreSet {
        IgnoreSet::from_csv(&self.ignore_folders)
    }

    /// Connection string with the connect timeout and TLS default applied.
    pub fn normalized_connection_string(&self) -> String {
        normalize_connection_string(&self.connection_string, self.timeout())
    }

    /// Configuration used by `init`: a placeholder server and default layout.
    pub fn template() -> Self {
        Self {
            connection_string: "postgres://release@localhost:5432/app".to_string(),
            ignore_files: "README.md,.gitkeep".to_string(),
            ignore_folders: "archive".to_string(),
            ..Self::default()
        }
    }
}

/// Load config from a TOML file.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write the `init` template unless a config already exists (or `force`).
pub fn write_template(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &RunConfig::template())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
