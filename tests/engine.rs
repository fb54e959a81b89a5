//! Integration tests for resolving and running task plans

mod common;

use common::recording_context;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasked::error::{ExecutionError, ResolveError};
use tasked::runner::{
    run_tasks, Context, Event, ExecutionStatus, MemoryEnv, RunOutcome, RunReport, Runner, Task,
    TaskOutput, TaskRegistry, ENV_FILE_VAR,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn noop(id: &str) -> Task {
    Task::builder(id)
        .run(|_, _| async { Ok(TaskOutput::None) })
        .build()
}

fn failing(id: &str) -> Task {
    Task::builder(id)
        .run(|_, _| async { Err(ExecutionError::Other(anyhow::anyhow!("boom"))) })
        .build()
}

fn registry(tasks: Vec<Task>) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    for task in tasks {
        registry.register(task).unwrap();
    }
    registry
}

fn runner() -> Runner {
    Runner::new().with_env_sink(Arc::new(MemoryEnv::new()))
}

async fn run(registry: &TaskRegistry, requested: &[&str], ctx: Arc<Context>) -> RunReport {
    run_tasks(registry, requested, ctx, &runner(), &CancellationToken::new())
        .await
        .unwrap()
}

fn statuses(report: &RunReport) -> Vec<(String, ExecutionStatus)> {
    report
        .results
        .iter()
        .map(|r| (r.task.id.clone(), r.status))
        .collect()
}

fn ids(pairs: &[(&str, ExecutionStatus)]) -> Vec<(String, ExecutionStatus)> {
    pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

#[tokio::test]
async fn test_dependencies_run_first() {
    let registry = registry(vec![
        noop("a1"),
        Task::builder("a")
            .dep("a1")
            .run(|_, _| async { Ok(TaskOutput::None) })
            .build(),
        Task::builder("t")
            .dep("a")
            .run(|_, _| async { Ok(TaskOutput::None) })
            .build(),
    ]);
    let (_, ctx) = recording_context();

    let report = run(&registry, &["t"], ctx).await;

    // Direct deps are listed before their own deps
    assert_eq!(
        statuses(&report),
        ids(&[
            ("a", ExecutionStatus::Ok),
            ("a1", ExecutionStatus::Ok),
            ("t", ExecutionStatus::Ok),
        ])
    );
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_failure_skips_later_tasks_unless_forced() {
    let registry = registry(vec![
        noop("setup"),
        failing("build"),
        noop("test"),
        Task::builder("cleanup")
            .always_force()
            .run(|_, _| async { Ok(TaskOutput::None) })
            .build(),
    ]);
    let (recorder, ctx) = recording_context();

    let report = run(&registry, &["setup", "build", "test", "cleanup"], ctx).await;

    assert_eq!(
        statuses(&report),
        ids(&[
            ("setup", ExecutionStatus::Ok),
            ("build", ExecutionStatus::Failed),
            ("test", ExecutionStatus::Skipped),
            ("cleanup", ExecutionStatus::Ok),
        ])
    );
    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.result("test").unwrap().reason.as_deref(),
        Some("previous task failed")
    );

    let summaries = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::RunSummary { .. }))
        .count();
    assert_eq!(summaries, 1);
}

#[tokio::test]
async fn test_cancellation_stops_before_next_task() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ran_after = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran_after);

    let registry = registry(vec![
        noop("first"),
        Task::builder("second")
            .run(move |_, _| {
                trigger.cancel();
                async { Ok(TaskOutput::None) }
            })
            .build(),
        Task::builder("third")
            .run(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(TaskOutput::None) }
            })
            .build(),
        noop("fourth"),
    ]);
    let (recorder, ctx) = recording_context();

    let report = run_tasks(
        &registry,
        &["first", "second", "third", "fourth"],
        ctx,
        &runner(),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(
        statuses(&report),
        ids(&[
            ("first", ExecutionStatus::Ok),
            ("second", ExecutionStatus::Ok),
            ("third", ExecutionStatus::Cancelled),
        ])
    );
    assert_eq!(ran_after.load(Ordering::SeqCst), 0);
    assert_eq!(report.exit_code(), 2);
    assert!(recorder
        .events()
        .iter()
        .all(|e| e.task_id() != Some("fourth")));
}

#[tokio::test]
async fn test_cancellation_interrupts_running_task() {
    let cancel = CancellationToken::new();
    let registry = registry(vec![Task::builder("wait")
        .run(|_, scope| async move {
            scope.cancelled().await;
            Ok(TaskOutput::None)
        })
        .build()]);
    let (_, ctx) = recording_context();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = run_tasks(&registry, &["wait"], ctx, &runner(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, ExecutionStatus::Cancelled);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_timeout_does_not_stop_the_run() {
    let registry = registry(vec![
        Task::builder("slow")
            .timeout_secs(1)
            .run(|_, _| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(TaskOutput::None)
            })
            .build(),
        noop("next"),
    ]);
    let (recorder, ctx) = recording_context();

    let report = run(&registry, &["slow", "next"], ctx).await;

    assert_eq!(
        statuses(&report),
        ids(&[
            ("slow", ExecutionStatus::Timeout),
            ("next", ExecutionStatus::Ok),
        ])
    );
    assert_eq!(report.exit_code(), 3);
    assert!(recorder.events().iter().any(|e| matches!(
        e,
        Event::TaskTimedOut { task_id, timeout } if task_id == "slow" && *timeout == Duration::from_secs(1)
    )));
}

#[tokio::test]
async fn test_global_timeout_applies_without_hook() {
    let registry = registry(vec![Task::builder("slow")
        .run(|_, _| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(TaskOutput::None)
        })
        .build()]);
    let (_, ctx) = recording_context();
    let runner = runner().with_timeout(Some(Duration::from_millis(100)));

    let report = run_tasks(&registry, &["slow"], ctx, &runner, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results[0].status, ExecutionStatus::Timeout);
}

#[tokio::test]
async fn test_skip_hook_gives_skipped_exit_code() {
    let registry = registry(vec![
        noop("lint"),
        Task::builder("docs")
            .skip(|_, _| async { Ok(true) })
            .run(|_, _| async { Ok(TaskOutput::None) })
            .build(),
    ]);
    let (_, ctx) = recording_context();

    let report = run(&registry, &["lint", "docs"], ctx).await;

    assert_eq!(report.outcome, RunOutcome::Skipped);
    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.result("docs").unwrap().reason, None);
}

#[tokio::test]
async fn test_env_side_channel_reaches_later_tasks() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("side-channel");
    std::fs::write(&env_file, "").unwrap();

    let registry = registry(vec![
        Task::builder("produce")
            .run(|ctx, _| {
                let path = ctx.env_var(ENV_FILE_VAR).unwrap().to_string();
                async move {
                    tokio::fs::write(&path, "FOO=bar\n").await?;
                    Ok::<_, ExecutionError>(TaskOutput::None)
                }
            })
            .build(),
        Task::builder("consume")
            .run(|ctx, _| {
                let seen = ctx.env_var("FOO").map(str::to_string);
                async move { Ok(TaskOutput::Value(seen.into())) }
            })
            .build(),
    ]);

    let sink = Arc::new(MemoryEnv::new());
    let runner = Runner::new().with_env_sink(sink.clone());
    let (_, ctx) = recording_context();
    let ctx = Arc::new(
        Context::clone(&ctx).with_env_var(ENV_FILE_VAR, env_file.display().to_string()),
    );

    let report = run_tasks(
        &registry,
        &["produce", "consume"],
        ctx,
        &runner,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        report.context.outputs("consume").unwrap().get("result"),
        Some(&serde_json::Value::from("bar"))
    );
    assert_eq!(sink.vars(), vec![("FOO".to_string(), "bar".to_string())]);
    assert_eq!(std::fs::read_to_string(&env_file).unwrap(), "");
}

#[tokio::test]
async fn test_context_chain_records_every_step() {
    let registry = registry(vec![noop("a"), noop("b")]);
    let (_, ctx) = recording_context();

    let report = run(&registry, &["a", "b"], ctx).await;

    // The context after `a`, then the root
    assert_eq!(report.context.ancestors().count(), 2);
    let after_a = report.context.parent().unwrap();
    assert!(after_a.task_state("a").is_some());
    assert!(after_a.task_state("b").is_none());
    assert_eq!(
        report.context.task_state("b").unwrap().status,
        Some(ExecutionStatus::Ok)
    );
}

#[tokio::test]
async fn test_missing_dependency_aborts_before_running() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let registry = registry(vec![
        Task::builder("first")
            .run(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(TaskOutput::None) }
            })
            .build(),
        Task::builder("broken").dep("ghost").build(),
    ]);
    let (recorder, ctx) = recording_context();

    let err = run_tasks(&registry, &["first", "broken"], ctx, &runner(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ResolveError::MissingDependency {
            task: "broken".to_string(),
            dependency: "ghost".to_string(),
        }
    );
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(recorder.events().iter().any(|e| matches!(
        e,
        Event::TaskNotFound { task_id, required_by: Some(parent) } if task_id == "ghost" && parent == "broken"
    )));
}

#[tokio::test]
async fn test_cycle_aborts_before_running() {
    let registry = registry(vec![
        Task::builder("x").dep("y").build(),
        Task::builder("y").dep("x").build(),
    ]);
    let (recorder, ctx) = recording_context();

    let err = run_tasks(&registry, &["x"], ctx, &runner(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::CircularDependency(_)));
    assert!(recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::CycleDetected { .. })));
    assert!(!recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::RunSummary { .. })));
}

#[tokio::test]
async fn test_panic_while_building_body_fails_the_task() {
    let registry = registry(vec![
        Task::builder("eager")
            .run(|ctx, _| {
                let value = ctx.env_var("NOT_SET_ANYWHERE").unwrap().to_string();
                async move { Ok(TaskOutput::Value(value.into())) }
            })
            .build(),
        noop("after"),
    ]);
    let (_, ctx) = recording_context();

    let report = run(&registry, &["eager", "after"], ctx).await;

    assert_eq!(
        statuses(&report),
        ids(&[
            ("eager", ExecutionStatus::Failed),
            ("after", ExecutionStatus::Skipped),
        ])
    );
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_malformed_side_channel_is_reported_once() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("side-channel");
    std::fs::write(&env_file, "").unwrap();

    let registry = registry(vec![
        Task::builder("produce")
            .run(|ctx, _| {
                let path = ctx.env_var(ENV_FILE_VAR).unwrap().to_string();
                async move {
                    tokio::fs::write(&path, "GOOD=1\nNOT VALID\n").await?;
                    Ok::<_, ExecutionError>(TaskOutput::None)
                }
            })
            .build(),
        noop("second"),
        Task::builder("third")
            .run(|ctx, _| {
                let seen = ctx.env_var("GOOD").map(str::to_string);
                async move { Ok(TaskOutput::Value(seen.into())) }
            })
            .build(),
    ]);
    let (recorder, ctx) = recording_context();
    let ctx = Arc::new(
        Context::clone(&ctx).with_env_var(ENV_FILE_VAR, env_file.display().to_string()),
    );

    let report = run(&registry, &["produce", "second", "third"], ctx).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        report.context.outputs("third").unwrap().get("result"),
        Some(&serde_json::Value::from("1"))
    );
    let unhandled = recorder
        .events()
        .iter()
        .filter(|e| matches!(e, Event::UnhandledError { .. }))
        .count();
    assert_eq!(unhandled, 1);
    assert_eq!(std::fs::read_to_string(&env_file).unwrap(), "");
}
