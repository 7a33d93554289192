// tests/shell_pipeline.rs
#![cfg(unix)]

use pipedag::build_orchestrator;
use pipedag::dag::TaskStatus;
use pipedag::errors::PipedagError;
use pipedag_test_utils::builders::{PipelineFileBuilder, TaskConfigBuilder};
use pipedag_test_utils::sinks::RecordingSink;
use pipedag_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn shell_tasks_pass_outputs_downstream() {
    init_tracing();

    let cfg = PipelineFileBuilder::new()
        .with_max_concurrent(2)
        .with_task("script", TaskConfigBuilder::new("echo 'a fox story'").build())
        .with_task(
            "tts",
            TaskConfigBuilder::new("echo progress: 50; echo \"voiced($PIPEDAG_DEP_SCRIPT)\"")
                .after("script")
                .progress_pattern(r"^progress: (\d+)")
                .weight(30)
                .build(),
        )
        .with_task(
            "mix",
            TaskConfigBuilder::new("echo \"$PIPEDAG_TASK: $PIPEDAG_DEP_TTS\"")
                .after("tts")
                .build(),
        )
        .build();

    let mut orch = build_orchestrator(&cfg, cfg.to_run_config([])).unwrap();
    let sink = RecordingSink::new();
    orch.subscribe(sink.clone());

    let results = with_timeout(orch.run()).await.unwrap();

    assert_eq!(results["script"], "a fox story");
    assert_eq!(results["tts"], "voiced(a fox story)");
    assert_eq!(results["mix"], "mix: voiced(a fox story)");
    assert_eq!(sink.progress_values().last(), Some(&100));
}

#[tokio::test]
async fn disabled_feature_task_is_skipped_and_enabled_one_runs() {
    init_tracing();

    let cfg = PipelineFileBuilder::new()
        .with_feature("music", false)
        .with_task("render", TaskConfigBuilder::new("echo frames").build())
        .with_task(
            "captions",
            TaskConfigBuilder::new("echo subs").after("render").feature("captions").build(),
        )
        .with_task(
            "music",
            TaskConfigBuilder::new("echo beat").after("render").feature("music").build(),
        )
        .build();

    let run_config = cfg.to_run_config(["captions"]);
    let mut orch = build_orchestrator(&cfg, run_config).unwrap();
    assert!(!orch.has_executor(&"music".to_string()));

    let results = with_timeout(orch.run()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results["captions"], "subs");
    assert_eq!(
        orch.get_state().status_of(&"music".to_string()),
        Some(TaskStatus::Skipped)
    );
}

#[tokio::test]
async fn failing_command_fails_the_run() {
    init_tracing();

    let cfg = PipelineFileBuilder::new()
        .with_task("upload", TaskConfigBuilder::new("echo nope >&2; exit 4").build())
        .with_task("notify", TaskConfigBuilder::new("echo sent").after("upload").build())
        .build();

    let mut orch = build_orchestrator(&cfg, cfg.to_run_config([])).unwrap();
    let err = with_timeout(orch.run()).await.unwrap_err();

    match err {
        PipedagError::TaskExecution { task, message, .. } => {
            assert_eq!(task, "upload");
            assert!(message.contains("status 4"), "message was: {message}");
        }
        other => panic!("Expected TaskExecution error, got: {other:?}"),
    }
    assert_eq!(
        orch.get_state().status_of(&"notify".to_string()),
        Some(TaskStatus::Pending)
    );
}

#[tokio::test]
async fn configured_timeout_kills_slow_command() {
    init_tracing();

    let cfg = PipelineFileBuilder::new()
        .with_task("slow", TaskConfigBuilder::new("sleep 5").timeout("100ms").build())
        .build();

    let mut orch = build_orchestrator(&cfg, cfg.to_run_config([])).unwrap();
    let err = with_timeout(orch.run()).await.unwrap_err();

    match err {
        PipedagError::TaskExecution { task, message, .. } => {
            assert_eq!(task, "slow");
            assert!(message.contains("timed out"), "message was: {message}");
        }
        other => panic!("Expected TaskExecution error, got: {other:?}"),
    }
}
