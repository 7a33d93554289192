// tests/failure_and_cancellation.rs

use std::time::Duration;

use pipedag::dag::TaskStatus;
use pipedag::errors::PipedagError;
use pipedag::events::PipelineEvent;
use pipedag::exec::DependencyResults;
use pipedag::types::RunConfig;
use pipedag::{Orchestrator, TaskContext};
use pipedag_test_utils::builders::graph;
use pipedag_test_utils::fake_executor::{ExecutionProbe, ScriptedExecutor};
use pipedag_test_utils::sinks::RecordingSink;
use pipedag_test_utils::{eventually, init_tracing, with_timeout};

#[tokio::test]
async fn panicking_executor_becomes_task_failure() {
    init_tracing();

    let g = graph(&[("render", &[])]);
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, RunConfig::default());
    let probe = ExecutionProbe::new();
    orch.register_task_executor("render", ScriptedExecutor::panic("codec exploded", &probe))
        .unwrap();

    let err = with_timeout(orch.run()).await.unwrap_err();

    match err {
        PipedagError::TaskExecution { task, message, .. } => {
            assert_eq!(task, "render");
            assert!(message.contains("panicked"), "message was: {message}");
        }
        other => panic!("Expected TaskExecution error, got: {other:?}"),
    }
    assert_eq!(orch.get_state().status_of(&"render"), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn timeout_wrapper_fails_slow_task() {
    init_tracing();

    let g = graph(&[("tts", &[])]);
    let mut orch: Orchestrator<&'static str, String> = Orchestrator::new(g, RunConfig::default());
    orch.register_executor_with_timeout("tts", Duration::from_millis(20), |_inputs, _ctx| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        anyhow::Ok("never".to_string())
    })
    .unwrap();

    let err = with_timeout(orch.run()).await.unwrap_err();

    match err {
        PipedagError::TaskExecution { task, message, .. } => {
            assert_eq!(task, "tts");
            assert!(message.contains("timed out"), "message was: {message}");
        }
        other => panic!("Expected TaskExecution error, got: {other:?}"),
    }
}

#[tokio::test]
async fn failure_cancels_in_flight_siblings() {
    init_tracing();

    let g = graph(&[("script", &[]), ("music", &[])]);
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, RunConfig::new(2));
    let probe = ExecutionProbe::new();

    orch.register_task_executor(
        "script",
        ScriptedExecutor::fail("llm quota exceeded", &probe).with_delay(Duration::from_millis(20)),
    )
    .unwrap();
    orch.register_task_executor("music", ScriptedExecutor::wait_for_cancel(&probe))
        .unwrap();

    let err = with_timeout(orch.run()).await.unwrap_err();
    assert_eq!(err.failed_task(), Some("script"));

    eventually(|| probe.cancelled().contains(&"music".to_string())).await;
}

#[tokio::test]
async fn late_settlements_are_not_incorporated_after_abort() {
    init_tracing();

    let g = graph(&[("fails", &[]), ("slow", &[])]);
    let mut orch: Orchestrator<&'static str, u32> = Orchestrator::new(g, RunConfig::new(2));
    let probe = ExecutionProbe::new();

    orch.register_task_executor("fails", ScriptedExecutor::fail("boom", &probe))
        .unwrap();
    // Ignores cancellation and finishes on its own.
    orch.register_task_executor(
        "slow",
        ScriptedExecutor::succeed(7, &probe).with_delay(Duration::from_millis(40)),
    )
    .unwrap();

    with_timeout(orch.run()).await.unwrap_err();
    eventually(|| probe.finished().contains(&"slow".to_string())).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(orch.get_results().is_empty());
    assert_eq!(orch.get_state().status_of(&"slow"), Some(TaskStatus::Running));
}

#[tokio::test]
async fn external_cancellation_aborts_run() {
    init_tracing();

    let g = graph(&[("upload", &[]), ("notify", &["upload"])]);
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, RunConfig::default());
    let probe = ExecutionProbe::new();
    orch.register_task_executor("upload", ScriptedExecutor::wait_for_cancel(&probe))
        .unwrap();
    orch.register_task_executor("notify", ScriptedExecutor::succeed((), &probe))
        .unwrap();

    let sink = RecordingSink::new();
    orch.subscribe(sink.clone());

    let token = orch.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = with_timeout(orch.run()).await.unwrap_err();
    assert!(matches!(err, PipedagError::Cancelled), "got: {err:?}");

    eventually(|| probe.cancelled().contains(&"upload".to_string())).await;
    assert!(!probe.started().contains(&"notify".to_string()));
    assert_eq!(sink.kinds().last(), Some(&"run_failed"));
}

#[tokio::test]
async fn executor_sees_cancellation_through_context() {
    init_tracing();

    let g = graph(&[("watcher", &[])]);
    let mut orch: Orchestrator<&'static str, bool> = Orchestrator::new(g, RunConfig::default());
    let token = orch.cancellation_token();

    orch.register_executor(
        "watcher",
        move |_inputs: DependencyResults<&'static str, bool>, ctx: TaskContext<&'static str>| async move {
            ctx.cancelled().await;
            anyhow::Ok(ctx.is_cancelled())
        },
    )
    .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let err = with_timeout(orch.run()).await.unwrap_err();
    assert!(matches!(err, PipedagError::Cancelled));
}

#[tokio::test]
async fn run_may_only_be_called_once() {
    init_tracing();

    let g = graph(&[("only", &[])]);
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, RunConfig::default());
    let probe = ExecutionProbe::new();
    orch.register_task_executor("only", ScriptedExecutor::succeed((), &probe))
        .unwrap();

    with_timeout(orch.run()).await.unwrap();
    let err = with_timeout(orch.run()).await.unwrap_err();

    assert!(matches!(err, PipedagError::ConfigError(_)), "got: {err:?}");
    assert_eq!(probe.started().len(), 1);
}

#[tokio::test]
async fn zero_concurrency_ceiling_is_config_error() {
    init_tracing();

    let g = graph(&[("A", &[])]);
    let config = RunConfig {
        max_concurrent_tasks: 0,
        ..RunConfig::default()
    };
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, config);
    let probe = ExecutionProbe::new();
    orch.register_task_executor("A", ScriptedExecutor::succeed((), &probe))
        .unwrap();

    let err = with_timeout(orch.run()).await.unwrap_err();

    match err {
        PipedagError::ConfigError(msg) => assert!(msg.contains("max_concurrent_tasks")),
        other => panic!("Expected ConfigError, got: {other:?}"),
    }
    assert!(probe.started().is_empty());
    assert_eq!(orch.get_state().status_of(&"A"), Some(TaskStatus::Pending));
}

#[tokio::test]
async fn registration_errors_are_config_errors() {
    init_tracing();

    let g = graph(&[("known", &[])]);
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, RunConfig::default());
    let probe = ExecutionProbe::new();

    let err = orch
        .register_task_executor("ghost", ScriptedExecutor::succeed((), &probe))
        .unwrap_err();
    match err {
        PipedagError::ConfigError(msg) => assert!(msg.contains("ghost")),
        other => panic!("Expected ConfigError, got: {other:?}"),
    }

    orch.register_task_executor("known", ScriptedExecutor::succeed((), &probe))
        .unwrap();
    with_timeout(orch.run()).await.unwrap();

    let late = orch.register_task_executor("known", ScriptedExecutor::succeed((), &probe));
    assert!(matches!(late, Err(PipedagError::ConfigError(_))));
}

#[tokio::test]
async fn reregistering_replaces_previous_executor() {
    init_tracing();

    let g = graph(&[("thumb", &[])]);
    let mut orch: Orchestrator<&'static str, String> = Orchestrator::new(g, RunConfig::default());
    let probe = ExecutionProbe::new();

    orch.register_task_executor("thumb", ScriptedExecutor::fail("old", &probe))
        .unwrap();
    orch.register_task_executor("thumb", ScriptedExecutor::succeed("new".to_string(), &probe))
        .unwrap();

    let results = with_timeout(orch.run()).await.unwrap();
    assert_eq!(results["thumb"], "new");
}

#[tokio::test]
async fn failure_emits_task_failed_then_run_failed() {
    init_tracing();

    let g = graph(&[("a", &[])]);
    let mut orch: Orchestrator<&'static str, ()> = Orchestrator::new(g, RunConfig::default());
    let probe = ExecutionProbe::new();
    orch.register_task_executor("a", ScriptedExecutor::fail("disk full", &probe))
        .unwrap();
    let sink = RecordingSink::new();
    orch.subscribe(sink.clone());

    with_timeout(orch.run()).await.unwrap_err();

    let events = sink.events();
    let failed = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::TaskFailed { task: "a", .. }))
        .unwrap();
    let run_failed = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::RunFailed { .. }))
        .unwrap();
    assert!(failed < run_failed);
    assert!(!sink.kinds().contains(&"run_completed"));
}
