//! The run log: a plain, append-only record of one run.
//!
//! Every line goes to the log file and is echoed to the console, in call
//! order. The file is recreated at the start of each run, so it only ever
//! holds the latest run. This is the product artifact; diagnostics go through
//! `tracing` instead (see `crate::logging`).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use crate::core::types::ServerMessage;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time, formatted for embedding in log lines.
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub struct RunLog {
    path: PathBuf,
    file: File,
    console: Box<dyn Write + Send>,
}

impl RunLog {
    /// Recreate the log at `path`, echoing to `console`.
    ///
    /// Creates the parent directory if needed and discards any previous log.
    pub fn with_console(path: &Path, console: Box<dyn Write + Send>) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log directory {}", parent.display()))?;
            info!(dir = %parent.display(), "created log directory");
        }
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("remove previous log {}", path.display()))?;
        }
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)
            .with_context(|| format!("create log {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            console,
        })
    }

    /// Append one line, durably, then echo it.
    ///
    /// The line is on disk before this returns.
    pub fn append(&mut self, line: impl AsRef<str>) -> Result<()> {
        let line = line.as_ref();
        writeln!(self.file, "{line}")
            .and_then(|()| self.file.sync_data())
            .with_context(|| format!("append to {}", self.path.display()))?;

        // A closed console must not lose the durable record.
        if let Err(err) = writeln!(self.console, "{line}").and_then(|()| self.console.flush()) {
            tracing::warn!(err = %err, "failed to echo log line to console");
        }
        Ok(())
    }

    /// Append one `<origin> message: <text>` line per server message.
    pub fn append_messages(&mut self, messages: &[ServerMessage]) -> Result<()> {
        for message in messages {
            self.append(message.log_line())?;
        }
        Ok(())
    }
}
