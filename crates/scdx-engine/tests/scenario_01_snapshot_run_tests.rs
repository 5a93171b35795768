#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end snapshot runs on an on-disk SQLite store

mod common;

use common::{customer, customers, rows, runner_at, setup, ts};
use scdx_core::history::{HistoryStore, RunStatus};
use scdx_engine::{RunOptions, RunPhase};
use scdx_store::{JsonFileSource, SqliteHistoryStore};
use serde_json::json;

#[test]
fn test_first_run_then_change_builds_two_intervals() {
    let (_dir, _path, store) = setup();
    let config = customers();

    // GIVEN a first run loading one customer
    let report = runner_at(&store, 9)
        .run(&config, &rows(vec![customer(1, "A", 1)]))
        .unwrap();
    assert_eq!(report.counts().new, 1);
    assert_eq!(report.outcome.opened, 1);

    // WHEN the customer's name changes at T2
    let report = runner_at(&store, 10)
        .run(&config, &rows(vec![customer(1, "B", 2)]))
        .unwrap();

    // THEN [T1, T2) and [T2, open) exist
    assert_eq!(report.counts().changed, 1);
    assert_eq!(report.attempts, 1);
    let history = store.history("dim_customers").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].valid_from, ts(1));
    assert_eq!(history[0].valid_to, Some(ts(2)));
    assert_eq!(history[0].attributes["name"], json!("A"));
    assert_eq!(history[1].valid_from, ts(2));
    assert!(history[1].is_current());
    assert_eq!(history[1].attributes["name"], json!("B"));
}

#[test]
fn test_report_walks_every_phase() {
    let (_dir, _path, store) = setup();
    let report = runner_at(&store, 9)
        .run(&customers(), &rows(vec![customer(1, "A", 1)]))
        .unwrap();

    assert_eq!(
        report.phases,
        vec![
            RunPhase::Idle,
            RunPhase::Normalizing,
            RunPhase::Diffing,
            RunPhase::Writing,
            RunPhase::Idle,
        ]
    );
}

#[test]
fn test_rerun_with_same_input_writes_nothing() {
    let (_dir, _path, store) = setup();
    let config = customers();
    let batch = rows(vec![customer(1, "A", 1), customer(2, "B", 1)]);
    let runner = runner_at(&store, 9);

    runner.run(&config, &batch).unwrap();
    let before = store.history("dim_customers").unwrap();

    let report = runner.run(&config, &batch).unwrap();

    assert_eq!(report.writes(), 0);
    assert_eq!(report.counts().unchanged, 2);
    assert_eq!(store.history("dim_customers").unwrap(), before);
}

#[test]
fn test_duplicates_keep_most_recent_row() {
    let (_dir, _path, store) = setup();

    let report = runner_at(&store, 9)
        .run(
            &customers(),
            &rows(vec![customer(1, "A", 1), customer(1, "B", 2)]),
        )
        .unwrap();

    assert_eq!(report.rows_in, 2);
    assert_eq!(report.superseded, 1);
    let history = store.history("dim_customers").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].attributes["name"], json!("B"));
    assert_eq!(history[0].valid_from, ts(2));
}

#[test]
fn test_hard_delete_closes_at_run_time() {
    let (_dir, _path, store) = setup();
    let config = customers().with_invalidate_hard_deletes(true);

    // GIVEN two customers
    runner_at(&store, 3)
        .run(&config, &rows(vec![customer(1, "A", 1), customer(2, "B", 1)]))
        .unwrap();

    // WHEN customer 2 is missing from the run executing at 05:00
    let report = runner_at(&store, 5)
        .run(&config, &rows(vec![customer(1, "A", 1)]))
        .unwrap();

    // THEN customer 2 is closed at 05:00 and nothing new is opened
    assert_eq!(report.counts().deleted, 1);
    assert_eq!(report.outcome.opened, 0);
    assert_eq!(report.outcome.closed, 1);
    let history = store.history("dim_customers").unwrap();
    let gone = history.iter().find(|r| r.key == "2").unwrap();
    assert_eq!(gone.valid_to, Some(ts(5)));
    assert!(store.as_of("dim_customers", ts(6)).unwrap().len() == 1);
}

#[test]
fn test_dry_run_writes_nothing_and_skips_ledger() {
    let (_dir, _path, store) = setup();

    let report = runner_at(&store, 9)
        .run_with(
            &customers(),
            &rows(vec![customer(1, "A", 1)]),
            RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        )
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.counts().new, 1);
    assert_eq!(report.writes(), 0);
    assert_eq!(
        report.phases,
        vec![
            RunPhase::Idle,
            RunPhase::Normalizing,
            RunPhase::Diffing,
            RunPhase::Idle,
        ]
    );
    assert!(store.history("dim_customers").unwrap().is_empty());
    assert!(store.runs(None).unwrap().is_empty());
}

#[test]
fn test_ledger_records_committed_runs() {
    let (_dir, _path, store) = setup();
    let runner = runner_at(&store, 9);

    let first = runner
        .run(&customers(), &rows(vec![customer(1, "A", 1)]))
        .unwrap();
    let second = runner
        .run(&customers(), &rows(vec![customer(1, "B", 2)]))
        .unwrap();

    let runs = store.runs(Some("dim_customers")).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Committed));
    assert!(runs.iter().all(|r| r.error_code.is_none()));

    let ids: Vec<&str> = runs.iter().map(|r| r.run_id.as_str()).collect();
    assert!(ids.contains(&first.run_id.as_str()));
    assert!(ids.contains(&second.run_id.as_str()));
    let changed = runs
        .iter()
        .find(|r| r.run_id == second.run_id.as_str())
        .unwrap();
    assert_eq!(changed.counts.changed, 1);
    assert_eq!(changed.started_at, ts(9));
}

#[test]
fn test_history_survives_reopen_between_runs() {
    let (_dir, path, store) = setup();
    runner_at(&store, 9)
        .run(&customers(), &rows(vec![customer(1, "A", 1)]))
        .unwrap();
    drop(store);

    let reopened = SqliteHistoryStore::open(&path).unwrap();
    let report = runner_at(&reopened, 10)
        .run(&customers(), &rows(vec![customer(1, "A", 1)]))
        .unwrap();

    assert_eq!(report.counts().unchanged, 1);
    assert_eq!(reopened.history("dim_customers").unwrap().len(), 1);
}

#[test]
fn test_run_from_json_lines_source() {
    let (dir, _path, store) = setup();
    let file = dir.path().join("customers.jsonl");
    std::fs::write(
        &file,
        format!("{}\n{}\n", customer(1, "A", 1), customer(2, "B", 1)),
    )
    .unwrap();

    let report = runner_at(&store, 9)
        .run_source(&customers(), &JsonFileSource::new(&file))
        .unwrap();

    assert_eq!(report.counts().new, 2);
    assert_eq!(store.history("dim_customers").unwrap().len(), 2);
}

#[test]
fn test_targets_are_independent() {
    let (_dir, _path, store) = setup();
    let runner = runner_at(&store, 9);
    let orders = scdx_core::SnapshotConfig::new("dim_orders", "order_id", "updated_at");

    runner
        .run(&customers(), &rows(vec![customer(1, "A", 1)]))
        .unwrap();
    runner
        .run(
            &orders,
            &rows(vec![
                json!({"order_id": "o-1", "status": "open", "updated_at": common::at(2)}),
            ]),
        )
        .unwrap();

    assert_eq!(store.history("dim_customers").unwrap().len(), 1);
    assert_eq!(store.history("dim_orders").unwrap().len(), 1);
    runner.verify("dim_customers", false).unwrap();
    runner.verify("dim_orders", false).unwrap();
}

#[test]
fn test_summary_names_target_and_counts() {
    let (_dir, _path, store) = setup();
    let report = runner_at(&store, 9)
        .run(&customers(), &rows(vec![customer(1, "A", 1)]))
        .unwrap();

    let summary = report.summary();
    assert!(summary.contains("dim_customers"));
    assert!(summary.contains("| 1 | 0 | 0 | 0 |"));
}
