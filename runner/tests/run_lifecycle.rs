//! End-to-end runs against the in-memory database.
//!
//! Drives `run::execute` with real script trees on disk and checks what was
//! committed, what the run log says, and how each run ends.

use std::fs;
use std::io;

use release_runner::core::types::RunSummary;
use release_runner::exit_codes;
use release_runner::io::config::RunConfig;
use release_runner::run::{RunOutcome, execute};
use release_runner::test_support::{FakeDatabase, ScriptTree};
use release_runner::timeout::{DEFAULT_MAXIMUM_TIMEOUT, TimeoutAuthority, TimeoutCeiling};

fn release_tree() -> ScriptTree {
    ScriptTree::new()
        .file("001_schema.sql", "create table accounts();")
        .file("tables/010_orders.sql", "create table orders();")
        .file("tables/020_items.sql", "create table items();")
        .file("archive/old.sql", "drop table accounts;")
        .file("README.md", "release notes")
}

fn config(tree: &ScriptTree, single: bool) -> RunConfig {
    RunConfig {
        connection_string: "postgres://release@localhost/app".to_string(),
        log_file: tree.path().join("logs").join("release.log"),
        script_root: tree.root().to_path_buf(),
        ignore_files: "readme.md".to_string(),
        ignore_folders: "Archive".to_string(),
        single_transaction_scope: single,
        ..RunConfig::default()
    }
}

async fn run(cfg: &RunConfig, db: &FakeDatabase) -> RunOutcome {
    let ceiling = TimeoutCeiling::new(DEFAULT_MAXIMUM_TIMEOUT);
    let authority = TimeoutAuthority::new(&ceiling, cfg.override_timeout_ceiling);
    execute(cfg, db, &authority, Box::new(io::sink()))
        .await
        .expect("run log")
}

#[tokio::test]
async fn single_scope_applies_nested_scripts_first() {
    let tree = release_tree();
    let cfg = config(&tree, true);
    let db = FakeDatabase::new();

    let outcome = run(&cfg, &db).await;

    assert!(matches!(
        outcome,
        RunOutcome::Completed(RunSummary { scripts_committed: 3, scopes_committed: 1 })
    ));
    let state = db.snapshot();
    assert_eq!(
        state.committed,
        vec![
            "create table orders();",
            "create table items();",
            "create table accounts();",
        ]
    );
    assert_eq!(state.max_open, 1);

    let log = fs::read_to_string(&cfg.log_file).expect("read log");
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines[0].starts_with("Folder Ignored ") && lines[0].ends_with("archive"));
    assert!(lines[1].starts_with("File Ignored ") && lines[1].ends_with("README.md"));
    assert!(lines[2].starts_with("Maximum transaction timeout set to "));
    assert!(lines[3].starts_with("Executing script ") && lines[3].contains("010_orders.sql"));
    assert!(
        lines
            .last()
            .expect("last line")
            .starts_with("Completed the transaction at ")
    );
}

#[tokio::test]
async fn single_scope_failure_applies_nothing() {
    let tree = release_tree().file("tables/030_broken.sql", "create tabel broken();");
    let cfg = config(&tree, true);
    let db = FakeDatabase::new().fail_on("tabel");

    let outcome = run(&cfg, &db).await;

    assert_eq!(outcome.exit_code(), exit_codes::FAILED);
    let state = db.snapshot();
    assert!(state.committed.is_empty());
    assert_eq!(state.open_now, 0);

    let log = fs::read_to_string(&cfg.log_file).expect("read log");
    assert!(log.contains("server message: syntax error"));
    assert!(!log.contains("001_schema.sql at"), "later scripts must not run");
    assert!(!log.contains("Completed the transaction"));
}

#[tokio::test]
async fn per_script_failure_keeps_earlier_scripts() {
    let tree = release_tree().file("tables/030_broken.sql", "create tabel broken();");
    let cfg = config(&tree, false);
    let db = FakeDatabase::new().fail_on("tabel");

    let outcome = run(&cfg, &db).await;

    assert_eq!(outcome.exit_code(), exit_codes::FAILED);
    let state = db.snapshot();
    assert_eq!(
        state.committed,
        vec!["create table orders();", "create table items();"]
    );
    assert_eq!(state.scopes_committed, 2);
    assert_eq!(state.max_open, 1);
    assert_eq!(state.open_now, 0);
}

#[tokio::test]
async fn each_run_starts_a_fresh_log() {
    let tree = release_tree();
    let cfg = config(&tree, false);

    run(&cfg, &FakeDatabase::new()).await;
    let first = fs::read_to_string(&cfg.log_file).expect("read first log");
    run(&cfg, &FakeDatabase::new()).await;
    let second = fs::read_to_string(&cfg.log_file).expect("read second log");

    assert_eq!(first.lines().count(), second.lines().count());
    assert_eq!(second.matches("Folder Ignored ").count(), 1);
}

#[tokio::test]
async fn empty_release_commits_nothing() {
    let tree = ScriptTree::new().file("notes/README.md", "nothing to apply");
    let cfg = config(&tree, true);
    let db = FakeDatabase::new();

    let outcome = run(&cfg, &db).await;

    assert!(matches!(outcome, RunOutcome::Completed(summary) if summary == RunSummary::default()));
    assert_eq!(db.snapshot().scopes_opened, 0);
}
