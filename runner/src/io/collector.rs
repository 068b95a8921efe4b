//! Script discovery under the script root.
//!
//! Depth-first, pre-order: inside every directory, subdirectories are walked
//! before the directory's own files, so nested scripts run before their
//! parent's siblings. Each group is ordered by file name.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::filter::{IgnoreSet, is_ignored};
use crate::core::types::ScriptFile;
use crate::error::RunError;
use crate::io::run_log::RunLog;

/// Collect every script under `root` that survives the ignore sets.
///
/// Ignored directories are logged once and never entered; ignored files are
/// logged and left out. Fails with [`RunError::Configuration`] if `root` is
/// not an existing directory.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn collect_scripts(
    root: &Path,
    ignore_files: &IgnoreSet,
    ignore_dirs: &IgnoreSet,
    log: &mut RunLog,
) -> Result<Vec<ScriptFile>, RunError> {
    let root = resolve_root(root).map_err(RunError::configuration)?;

    let mut scripts = Vec::new();
    let mut walker = WalkDir::new(&root)
        .min_depth(1)
        .follow_links(true)
        .sort_by(directories_first)
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry
            .with_context(|| format!("walk {}", root.display()))
            .map_err(RunError::configuration)?;

        if entry.file_type().is_dir() {
            if is_ignored(entry.file_name(), ignore_dirs) {
                append(log, format!("Folder Ignored {}", entry.path().display()))?;
                walker.skip_current_dir();
            }
            continue;
        }

        if is_ignored(entry.file_name(), ignore_files) {
            append(log, format!("File Ignored {}", entry.path().display()))?;
            continue;
        }
        scripts.push(ScriptFile::new(entry.into_path()));
    }

    debug!(count = scripts.len(), "scripts collected");
    Ok(scripts)
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        bail!("script folder {} doesn't exist", root.display());
    }
    fs::canonicalize(root).with_context(|| format!("resolve script folder {}", root.display()))
}

fn directories_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    let a_dir = a.file_type().is_dir();
    let b_dir = b.file_type().is_dir();
    b_dir
        .cmp(&a_dir)
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn append(log: &mut RunLog, line: String) -> Result<(), RunError> {
    log.append(line).map_err(RunError::Log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptTree, quiet_log};

    fn names(root: &Path, scripts: &[ScriptFile]) -> Vec<String> {
        let root = fs::canonicalize(root).expect("canonical root");
        scripts
            .iter()
            .map(|s| {
                s.path()
                    .strip_prefix(&root)
                    .expect("under root")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn ignored_directory_is_pruned_and_logged_once() {
        let tree = ScriptTree::new()
            .file("a.sql", "select 1;")
            .file("sub/b.sql", "select 2;")
            .file("ignored_dir/c.sql", "select 3;")
            .file("ignored_dir/deeper/d.sql", "select 4;");
        let (mut log, log_path) = quiet_log(tree.path());

        let scripts = collect_scripts(
            tree.root(),
            &IgnoreSet::default(),
            &IgnoreSet::from_csv("ignored_dir"),
            &mut log,
        )
        .expect("collect");

        assert_eq!(names(tree.root(), &scripts), vec!["sub/b.sql", "a.sql"]);
        let contents = fs::read_to_string(log_path).expect("read log");
        let ignored: Vec<&str> = contents
            .lines()
            .filter(|line| line.contains("Ignored"))
            .collect();
        assert_eq!(ignored.len(), 1);
        assert!(ignored[0].starts_with("Folder Ignored "));
        assert!(ignored[0].ends_with("ignored_dir"));
    }

    #[test]
    fn nested_scripts_come_before_parent_files() {
        let tree = ScriptTree::new()
            .file("001_root.sql", "")
            .file("b/002.sql", "")
            .file("a/z/003.sql", "")
            .file("a/001.sql", "")
            .file("b/001.sql", "");
        let (mut log, _) = quiet_log(tree.path());

        let scripts = collect_scripts(
            tree.root(),
            &IgnoreSet::default(),
            &IgnoreSet::default(),
            &mut log,
        )
        .expect("collect");

        assert_eq!(
            names(tree.root(), &scripts),
            vec!["a/z/003.sql", "a/001.sql", "b/001.sql", "b/002.sql", "001_root.sql"]
        );
    }

    #[test]
    fn ignored_files_match_base_name_case_insensitively() {
        let tree = ScriptTree::new()
            .file("README.md", "docs")
            .file("010.sql", "")
            .file("sub/readme.MD", "docs")
            .file("sub/020.sql", "");
        let (mut log, log_path) = quiet_log(tree.path());

        let scripts = collect_scripts(
            tree.root(),
            &IgnoreSet::from_csv("readme.md"),
            &IgnoreSet::default(),
            &mut log,
        )
        .expect("collect");

        assert_eq!(names(tree.root(), &scripts), vec!["sub/020.sql", "010.sql"]);
        let contents = fs::read_to_string(log_path).expect("read log");
        assert_eq!(contents.matches("File Ignored ").count(), 2);
    }

    #[test]
    fn every_reachable_file_appears_exactly_once() {
        let tree = ScriptTree::new()
            .file("x/1.sql", "")
            .file("x/y/2.sql", "")
            .file("x/y/z/3.sql", "")
            .file("4.sql", "");
        let (mut log, _) = quiet_log(tree.path());

        let scripts = collect_scripts(
            tree.root(),
            &IgnoreSet::default(),
            &IgnoreSet::default(),
            &mut log,
        )
        .expect("collect");

        let mut found = names(tree.root(), &scripts);
        assert_eq!(found.len(), 4);
        found.sort();
        found.dedup();
        assert_eq!(found.len(), 4);
        assert!(scripts.iter().all(|s| s.path().is_absolute()));
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut log, _) = quiet_log(temp.path());

        let err = collect_scripts(
            &temp.path().join("does-not-exist"),
            &IgnoreSet::default(),
            &IgnoreSet::default(),
            &mut log,
        )
        .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("doesn't exist"));
    }
}
