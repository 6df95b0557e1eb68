//! Trait contract tests for ScoreStore and RunStore.
//!
//! Each contract is written once against `&dyn Trait` and exercised with the
//! in-memory fakes and the SurrealDB (`mem://`) backends. Any conforming
//! implementation must pass these.

use std::sync::Arc;

use chrono::{Duration, Utc};
use evalboard_state::fakes::{MemoryRunStore, MemoryScoreStore};
use evalboard_state::storage_traits::*;
use evalboard_state::{StorageError, SurrealHandle, SurrealRunStore, SurrealScoreStore};

fn tag(s: &str) -> Option<ExperimentTag> {
    ExperimentTag::new(s)
}

// ===========================================================================
// ScoreStore contracts
// ===========================================================================

async fn append_assigns_increasing_created_at(store: &dyn ScoreStore) {
    let a = store.append(NewScoreSnapshot::new("m", 60.0)).await.unwrap();
    let b = store.append(NewScoreSnapshot::new("m", 80.0)).await.unwrap();

    assert_ne!(a.id, b.id);
    assert!(b.created_at > a.created_at);
}

async fn append_preserves_history_for_same_model(store: &dyn ScoreStore) {
    for score in [0.8, 0.9, 1.0] {
        store
            .append(NewScoreSnapshot::new("m", score).with_score("cat1", score))
            .await
            .unwrap();
    }

    let all = store.list(&SnapshotQuery::for_model("m")).await.unwrap();
    let totals: Vec<f64> = all.iter().map(|s| s.total_score).collect();
    assert_eq!(totals, vec![0.8, 0.9, 1.0]);
}

async fn get_round_trips_and_reports_missing(store: &dyn ScoreStore) {
    let stored = store
        .append(
            NewScoreSnapshot::new("m", 0.5)
                .with_score("cat1", 0.25)
                .with_score("cat2", 0.75)
                .with_external_run_id("abc123"),
        )
        .await
        .unwrap();

    let fetched = store.get(&stored.id).await.unwrap();
    assert_eq!(fetched.model, "m");
    assert_eq!(fetched.scores.get("cat2"), Some(&0.75));
    assert_eq!(fetched.external_run_id.as_deref(), Some("abc123"));

    let err = store.get(&SnapshotId::from("missing")).await.unwrap_err();
    assert!(matches!(err, StorageError::SnapshotNotFound { .. }));
}

async fn latest_returns_newest_in_cohort(store: &dyn ScoreStore) {
    assert!(store
        .latest("m", &ExperimentFilter::Default)
        .await
        .unwrap()
        .is_none());

    store.append(NewScoreSnapshot::new("m", 1.0)).await.unwrap();
    store.append(NewScoreSnapshot::new("m", 2.0)).await.unwrap();
    store
        .append(NewScoreSnapshot::new("m", 3.0).with_experiment(tag("no_guidelines")))
        .await
        .unwrap();
    store.append(NewScoreSnapshot::new("other", 9.0)).await.unwrap();

    let default = store
        .latest("m", &ExperimentFilter::Default)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(default.total_score, 2.0);

    let tagged = store
        .latest(
            "m",
            &ExperimentFilter::Tag(ExperimentTag::new("no_guidelines").unwrap()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tagged.total_score, 3.0);

    let any = store
        .latest("m", &ExperimentFilter::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(any.total_score, 3.0);
}

async fn list_applies_experiment_and_range(store: &dyn ScoreStore) {
    let first = store.append(NewScoreSnapshot::new("a", 1.0)).await.unwrap();
    store
        .append(NewScoreSnapshot::new("b", 2.0).with_experiment(tag("x")))
        .await
        .unwrap();
    let last = store.append(NewScoreSnapshot::new("c", 3.0)).await.unwrap();

    let default = store.list(&SnapshotQuery::all_models()).await.unwrap();
    assert_eq!(default.len(), 2);
    assert!(default.iter().all(|s| s.experiment.is_none()));

    let all = store
        .list(&SnapshotQuery::all_models().with_experiment(ExperimentFilter::All))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let recent = store
        .list(&SnapshotQuery::all_models().with_range(TimeRange {
            start: Some(last.created_at),
            end: None,
        }))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].model, "c");

    let older = store
        .list(&SnapshotQuery::all_models().with_range(TimeRange {
            start: None,
            end: Some(first.created_at),
        }))
        .await
        .unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].model, "a");
}

// ===========================================================================
// RunStore contracts
// ===========================================================================

async fn run_lifecycle_completes_exactly_once(store: &dyn RunStore) {
    let run = store
        .create_run(NewRun::new("m").with_planned_evals(vec!["cat1/eval1".to_string()]))
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Pending);

    store.start_run(&run.id).await.unwrap();
    store.complete_run(&run.id, 5000).await.unwrap();

    let fetched = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Completed { duration_ms: 5000 });
    assert_eq!(fetched.planned_evals, vec!["cat1/eval1".to_string()]);

    let again = store.fail_run(&run.id, "late", 1).await.unwrap_err();
    assert!(matches!(again, StorageError::InvalidRunState { .. }));
}

async fn pending_run_can_fail_directly(store: &dyn RunStore) {
    let run = store.create_run(NewRun::new("m")).await.unwrap();
    store.fail_run(&run.id, "runner crashed", 10).await.unwrap();

    let fetched = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(
        fetched.status,
        RunStatus::Failed {
            failure_reason: "runner crashed".to_string(),
            duration_ms: 10,
        }
    );

    let err = store.start_run(&run.id).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRunState { .. }));
}

async fn unknown_run_is_reported(store: &dyn RunStore) {
    let missing = RunId::from("missing");
    assert!(store.get_run(&missing).await.unwrap().is_none());
    assert!(matches!(
        store.complete_run(&missing, 1).await.unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
    assert!(matches!(
        store
            .create_eval(NewEval::new(missing.clone(), "c", "n"))
            .await
            .unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
    assert!(matches!(
        store.list_evals(&missing).await.unwrap_err(),
        StorageError::RunNotFound { .. }
    ));
}

async fn eval_lifecycle_and_listing(store: &dyn RunStore) {
    let run = store.create_run(NewRun::new("m")).await.unwrap();
    let other = store.create_run(NewRun::new("m")).await.unwrap();

    let e1 = store
        .create_eval(NewEval::new(run.id.clone(), "cat1", "eval1"))
        .await
        .unwrap();
    let e2 = store
        .create_eval(NewEval::new(run.id.clone(), "cat1", "eval2"))
        .await
        .unwrap();
    store
        .create_eval(NewEval::new(other.id.clone(), "cat1", "eval1"))
        .await
        .unwrap();

    store.start_eval(&e1.id).await.unwrap();
    store.pass_eval(&e1.id, 1000).await.unwrap();
    store.fail_eval(&e2.id, "test failure", 1000).await.unwrap();

    let evals = store.list_evals(&run.id).await.unwrap();
    assert_eq!(evals.len(), 2);
    assert_eq!(evals[0].id, e1.id);
    assert_eq!(evals[0].eval_path, "cat1/eval1");
    assert!(evals[0].status.is_passed());
    assert!(evals[1].status.is_failed());

    let err = store.pass_eval(&e2.id, 1).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidEvalState { .. }));
}

async fn list_runs_filters_and_orders(store: &dyn RunStore) {
    let a1 = store.create_run(NewRun::new("a")).await.unwrap();
    store
        .create_run(NewRun::new("a").with_experiment(tag("no_guidelines")))
        .await
        .unwrap();
    let b1 = store.create_run(NewRun::new("b")).await.unwrap();
    store.complete_run(&b1.id, 1).await.unwrap();

    let default = store.list_runs(&RunQuery::all_models()).await.unwrap();
    let ids: Vec<RunId> = default.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![a1.id.clone(), b1.id.clone()]);

    let completed = store
        .list_runs(&RunQuery::all_models().with_status(RunStatusKind::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, b1.id);

    let tagged = store
        .list_runs(
            &RunQuery::for_model("a").with_experiment(ExperimentFilter::from_args(
                tag("no_guidelines"),
                false,
            )),
        )
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert!(tagged[0].experiment.is_some());

    let everything = store
        .list_runs(&RunQuery::all_models().with_experiment(ExperimentFilter::All))
        .await
        .unwrap();
    assert_eq!(everything.len(), 3);

    let future = store
        .list_runs(
            &RunQuery::all_models().with_range(TimeRange::since(Duration::zero(), Utc::now())),
        )
        .await
        .unwrap();
    assert!(future.is_empty());
}

// ===========================================================================
// Backend wiring
// ===========================================================================

macro_rules! score_contracts {
    ($($name:ident),* $(,)?) => {
        mod memory_scores {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(&MemoryScoreStore::new()).await;
                }
            )*
        }

        mod surreal_scores {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let store = SurrealScoreStore::in_memory().await.unwrap();
                    super::$name(&store).await;
                }
            )*
        }
    };
}

macro_rules! run_contracts {
    ($($name:ident),* $(,)?) => {
        mod memory_runs {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(&MemoryRunStore::new()).await;
                }
            )*
        }

        mod surreal_runs {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let store = SurrealRunStore::in_memory().await.unwrap();
                    super::$name(&store).await;
                }
            )*
        }
    };
}

score_contracts!(
    append_assigns_increasing_created_at,
    append_preserves_history_for_same_model,
    get_round_trips_and_reports_missing,
    latest_returns_newest_in_cohort,
    list_applies_experiment_and_range,
);

run_contracts!(
    run_lifecycle_completes_exactly_once,
    pending_run_can_fail_directly,
    unknown_run_is_reported,
    eval_lifecycle_and_listing,
    list_runs_filters_and_orders,
);

// ===========================================================================
// Concurrent status changes
// ===========================================================================

async fn racing_run_transitions_have_one_winner(store: Arc<dyn RunStore>) {
    for _ in 0..25 {
        let run = store.create_run(NewRun::new("m")).await.unwrap();

        let (completer, failer) = (store.clone(), store.clone());
        let (complete_id, fail_id) = (run.id.clone(), run.id.clone());
        let complete =
            tokio::spawn(async move { completer.complete_run(&complete_id, 10).await });
        let fail = tokio::spawn(async move { failer.fail_run(&fail_id, "stuck", 20).await });
        let completed = complete.await.unwrap();
        let failed = fail.await.unwrap();

        assert!(
            completed.is_ok() != failed.is_ok(),
            "exactly one terminal transition must win: {completed:?} / {failed:?}"
        );
        let fetched = store.get_run(&run.id).await.unwrap().unwrap();
        match completed {
            Ok(()) => {
                assert_eq!(fetched.status, RunStatus::Completed { duration_ms: 10 });
                assert!(matches!(
                    failed.unwrap_err(),
                    StorageError::InvalidRunState { .. }
                ));
            }
            Err(err) => {
                assert!(matches!(err, StorageError::InvalidRunState { .. }));
                assert_eq!(
                    fetched.status,
                    RunStatus::Failed {
                        failure_reason: "stuck".to_string(),
                        duration_ms: 20,
                    }
                );
            }
        }
    }
}

async fn racing_eval_transitions_have_one_winner(store: Arc<dyn RunStore>) {
    let run = store.create_run(NewRun::new("m")).await.unwrap();
    for i in 0..25 {
        let eval = store
            .create_eval(NewEval::new(run.id.clone(), "cat1", format!("eval{i}")))
            .await
            .unwrap();

        let (passer, failer) = (store.clone(), store.clone());
        let (pass_id, fail_id) = (eval.id.clone(), eval.id.clone());
        let pass = tokio::spawn(async move { passer.pass_eval(&pass_id, 1).await });
        let fail = tokio::spawn(async move { failer.fail_eval(&fail_id, "wrong", 2).await });
        let passed = pass.await.unwrap();
        let failed = fail.await.unwrap();

        assert!(passed.is_ok() != failed.is_ok());
        let loser = passed.err().or(failed.err()).unwrap();
        assert!(matches!(loser, StorageError::InvalidEvalState { .. }));
    }

    let evals = store.list_evals(&run.id).await.unwrap();
    assert_eq!(evals.len(), 25);
    assert!(evals.iter().all(|e| e.status.is_terminal()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_racing_run_transitions() {
    racing_run_transitions_have_one_winner(Arc::new(MemoryRunStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_racing_run_transitions() {
    let store = SurrealRunStore::in_memory().await.unwrap();
    racing_run_transitions_have_one_winner(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_racing_eval_transitions() {
    let store = SurrealRunStore::in_memory().await.unwrap();
    racing_eval_transitions_have_one_winner(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_stores_sharing_a_handle_race_safely() {
    let handle = SurrealHandle::in_memory().await.unwrap();
    let first = Arc::new(SurrealRunStore::new(handle.clone()));
    let second = Arc::new(SurrealRunStore::new(handle));

    for _ in 0..10 {
        let run = first.create_run(NewRun::new("m")).await.unwrap();
        let (a, b) = (first.clone(), second.clone());
        let (ida, idb) = (run.id.clone(), run.id.clone());
        let complete = tokio::spawn(async move { a.complete_run(&ida, 10).await });
        let fail = tokio::spawn(async move { b.fail_run(&idb, "stuck", 20).await });
        let completed = complete.await.unwrap();
        let failed = fail.await.unwrap();

        assert!(
            !(completed.is_ok() && failed.is_ok()),
            "both terminal transitions succeeded on run {}",
            run.id
        );
    }
}

#[tokio::test]
async fn surrealkv_stores_share_one_handle() {
    let dir = tempfile::tempdir().unwrap();
    let handle = SurrealHandle::local(&dir.path().join("db")).await.unwrap();

    let writer = SurrealScoreStore::new(handle.clone());
    writer
        .append(NewScoreSnapshot::new("m", 0.7).with_score("cat1", 0.7))
        .await
        .unwrap();

    let reader = SurrealScoreStore::new(handle);
    let latest = reader
        .latest("m", &ExperimentFilter::Default)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.total_score, 0.7);
}
