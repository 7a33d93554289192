// tests/skip_policy.rs

use pipedag::dag::TaskStatus;
use pipedag::errors::PipedagError;
use pipedag::events::PipelineEvent;
use pipedag::types::{RunConfig, SkipPolicy};
use pipedag::Orchestrator;
use pipedag_test_utils::builders::graph;
use pipedag_test_utils::fake_executor::{ExecutionProbe, ScriptedExecutor};
use pipedag_test_utils::sinks::RecordingSink;
use pipedag_test_utils::{init_tracing, with_timeout};

/// script -> captions (no executor) -> burn_in -> publish, plus an
/// independent thumbnail branch.
fn video_graph() -> pipedag::TaskGraph<&'static str> {
    graph(&[
        ("script", &[]),
        ("captions", &["script"]),
        ("burn_in", &["captions"]),
        ("publish", &["burn_in", "thumbnail"]),
        ("thumbnail", &[]),
    ])
}

fn register_all_but_captions(orch: &mut Orchestrator<&'static str, String>, probe: &ExecutionProbe) {
    for id in ["script", "burn_in", "publish", "thumbnail"] {
        orch.register_task_executor(id, ScriptedExecutor::succeed(id.to_string(), probe))
            .unwrap();
    }
}

#[tokio::test]
async fn propagate_skips_dependents_transitively() {
    init_tracing();

    let config = RunConfig::new(2).with_skip_policy(SkipPolicy::Propagate);
    let mut orch = Orchestrator::new(video_graph(), config);
    let probe = ExecutionProbe::new();
    register_all_but_captions(&mut orch, &probe);
    let sink = RecordingSink::new();
    orch.subscribe(sink.clone());

    let results = with_timeout(orch.run()).await.unwrap();

    let mut completed: Vec<_> = results.keys().copied().collect();
    completed.sort();
    assert_eq!(completed, vec!["script", "thumbnail"]);

    let state = orch.get_state();
    for skipped in ["captions", "burn_in", "publish"] {
        assert_eq!(state.status_of(&skipped), Some(TaskStatus::Skipped), "{skipped}");
        assert!(sink.events().contains(&PipelineEvent::TaskSkipped { task: skipped }));
    }
    assert!(!probe.started().contains(&"burn_in".to_string()));
    assert_eq!(state.total_progress, 100);
}

#[tokio::test]
async fn strict_policy_surfaces_structural_deadlock() {
    init_tracing();

    let config = RunConfig::new(2).with_skip_policy(SkipPolicy::Strict);
    let mut orch = Orchestrator::new(video_graph(), config);
    let probe = ExecutionProbe::new();
    register_all_but_captions(&mut orch, &probe);

    let err = with_timeout(orch.run()).await.unwrap_err();

    match err {
        PipedagError::StructuralDeadlock { blocked } => {
            assert_eq!(blocked, vec!["burn_in".to_string(), "publish".to_string()]);
        }
        other => panic!("Expected StructuralDeadlock, got: {other:?}"),
    }
    let state = orch.get_state();
    assert_eq!(state.count(TaskStatus::Failed), 0);
    assert_eq!(state.status_of(&"captions"), Some(TaskStatus::Skipped));
    assert_eq!(state.status_of(&"burn_in"), Some(TaskStatus::Pending));
    assert_eq!(state.status_of(&"thumbnail"), Some(TaskStatus::Completed));
    assert!(state.total_progress < 100);
}

#[tokio::test]
async fn skipped_root_without_dependents_does_not_block_others() {
    init_tracing();

    let g = graph(&[("optional_intro", &[]), ("main", &[])]);
    let config = RunConfig::default().with_skip_policy(SkipPolicy::Strict);
    let mut orch: Orchestrator<&'static str, String> = Orchestrator::new(g, config);
    let probe = ExecutionProbe::new();
    orch.register_task_executor("main", ScriptedExecutor::succeed("ok".to_string(), &probe))
        .unwrap();

    let results = with_timeout(orch.run()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(orch.get_state().status_of(&"optional_intro"), Some(TaskStatus::Skipped));
}
