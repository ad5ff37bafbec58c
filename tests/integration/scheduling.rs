//! Scheduling tests.
//!
//! Verify dispatch order: higher priority first among ready tasks,
//! dependencies before dependents, and never more handlers in flight than
//! the configured ceiling.

use std::time::Duration;

use devskyy::agent::AgentKind;
use devskyy::core::{Priority, TaskStatus};
use devskyy::orchestration::{Orchestrator, RunEvent};
use devskyy::Error;

use crate::fixtures::{drain_events, registry_for_all, task, RecordingHandler};

/// Test: priority decides between ready tasks, dependencies still gate.
///
/// Given T1 (low), T2 (urgent), and T3 depending on T1, with one worker
/// When the orchestrator runs
/// Then T2 is dispatched before T1, and T3 only after T1 finishes
#[tokio::test]
async fn test_priority_then_dependency_order() {
    let handler = RecordingHandler::new();
    let mut orchestrator =
        Orchestrator::new(registry_for_all(handler.clone())).with_max_concurrent(1);

    let t1 = orchestrator
        .submit(task("T1", AgentKind::DataReasoning).with_priority(Priority::Low))
        .unwrap();
    orchestrator
        .submit(task("T2", AgentKind::GrowthStack).with_priority(Priority::Urgent))
        .unwrap();
    orchestrator
        .submit(task("T3", AgentKind::VisualFoundry).depends_on(t1))
        .unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert!(summary.is_success());
    assert_eq!(handler.started(), vec!["T2", "T1", "T3"]);
}

/// Test: equal priorities run in submission order.
///
/// Given four independent medium-priority tasks and one worker
/// When the orchestrator runs
/// Then they start in the order they were submitted
#[tokio::test]
async fn test_equal_priority_is_fifo() {
    let handler = RecordingHandler::new();
    let mut orchestrator =
        Orchestrator::new(registry_for_all(handler.clone())).with_max_concurrent(1);

    for name in ["a", "b", "c", "d"] {
        orchestrator
            .submit(task(name, AgentKind::ProfessorsOfCode))
            .unwrap();
    }
    orchestrator.run().await.unwrap();

    assert_eq!(handler.started(), vec!["a", "b", "c", "d"]);
}

/// Test: the worker ceiling bounds concurrent handlers.
///
/// Given eight independent slow tasks and a ceiling of three
/// When the orchestrator runs
/// Then at most three handlers are ever in flight, and three are reached
#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling() {
    let handler = RecordingHandler::with_delay(Duration::from_millis(200));
    let mut orchestrator =
        Orchestrator::new(registry_for_all(handler.clone())).with_max_concurrent(3);

    for n in 0..8 {
        orchestrator
            .submit(task(&format!("sku-{}", n), AgentKind::VisualFoundry))
            .unwrap();
    }
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.succeeded, 8);
    assert_eq!(handler.peak(), 3);
}

/// Test: independent tasks overlap when workers allow it.
///
/// Given two slow independent tasks and the default ceiling
/// When the orchestrator runs
/// Then both are in flight at the same time
#[tokio::test(start_paused = true)]
async fn test_independent_tasks_run_in_parallel() {
    let handler = RecordingHandler::with_delay(Duration::from_millis(500));
    let mut orchestrator = Orchestrator::new(registry_for_all(handler.clone()));

    orchestrator
        .submit(task("video", AgentKind::VoiceMediaVideo))
        .unwrap();
    orchestrator
        .submit(task("audio", AgentKind::VoiceMediaVideo))
        .unwrap();
    orchestrator.run().await.unwrap();

    assert_eq!(handler.peak(), 2);
}

/// Test: a diamond runs its join only after both branches.
///
/// Given A, then B and C depending on A, then D depending on B and C
/// When the orchestrator runs
/// Then A finishes before B and C start, and D starts after both finish
#[tokio::test(start_paused = true)]
async fn test_diamond_dependency_order() {
    let handler = RecordingHandler::with_delay(Duration::from_millis(10));
    let mut orchestrator = Orchestrator::new(registry_for_all(handler.clone()));

    let a = orchestrator
        .submit(task("A", AgentKind::Orchestrator))
        .unwrap();
    let b = orchestrator
        .submit(task("B", AgentKind::ProfessorsOfCode).depends_on(a))
        .unwrap();
    let c = orchestrator
        .submit(task("C", AgentKind::VisualFoundry).depends_on(a))
        .unwrap();
    orchestrator
        .submit(
            task("D", AgentKind::GrowthStack)
                .depends_on(b)
                .depends_on(c),
        )
        .unwrap();

    orchestrator.run().await.unwrap();

    let a_end = handler.position("end:A");
    let d_start = handler.position("start:D");
    assert!(a_end < handler.position("start:B"));
    assert!(a_end < handler.position("start:C"));
    assert!(handler.position("end:B") < d_start);
    assert!(handler.position("end:C") < d_start);
}

/// Test: every task becomes ready before it starts.
///
/// Given a chain of two tasks
/// When the orchestrator runs with a subscriber
/// Then each task's events run Ready, Started, Succeeded in order
#[tokio::test]
async fn test_event_sequence_per_task() {
    let mut orchestrator = Orchestrator::new(registry_for_all(RecordingHandler::new()));
    let mut events = orchestrator.subscribe();

    let first = orchestrator
        .submit(task("outline", AgentKind::ProfessorsOfCode))
        .unwrap();
    let second = orchestrator
        .submit(task("draft", AgentKind::ProfessorsOfCode).depends_on(first))
        .unwrap();
    orchestrator.run().await.unwrap();

    let events = drain_events(&mut events);
    for id in [first, second] {
        let kinds: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::TaskReady { task_id } if *task_id == id => Some("ready"),
                RunEvent::TaskStarted { task_id, .. } if *task_id == id => Some("started"),
                RunEvent::TaskSucceeded { task_id } if *task_id == id => Some("succeeded"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["ready", "started", "succeeded"]);
    }

    let second_ready = events
        .iter()
        .position(|e| matches!(e, RunEvent::TaskReady { task_id } if *task_id == second))
        .unwrap();
    let first_done = events
        .iter()
        .position(|e| matches!(e, RunEvent::TaskSucceeded { task_id } if *task_id == first))
        .unwrap();
    assert!(first_done < second_ready);
}

/// Test: a cycle is reported before anything runs.
///
/// Given two tasks that depend on each other and one unrelated task
/// When the orchestrator runs
/// Then it returns a Cycle error naming both, and no task leaves Pending
#[tokio::test]
async fn test_cycle_rejected_before_running() {
    let handler = RecordingHandler::new();
    let mut orchestrator = Orchestrator::new(registry_for_all(handler.clone()));

    let shoot = task("shoot", AgentKind::VisualFoundry);
    let edit = task("edit", AgentKind::VisualFoundry).depends_on(shoot.id);
    let shoot = shoot.depends_on(edit.id);
    orchestrator.submit(shoot).unwrap();
    orchestrator.submit(edit).unwrap();
    orchestrator
        .submit(task("unrelated", AgentKind::DataReasoning))
        .unwrap();

    match orchestrator.run().await.unwrap_err() {
        Error::Cycle { tasks } => {
            assert_eq!(tasks.len(), 2);
            assert!(tasks.iter().any(|t| t.contains("shoot")));
            assert!(tasks.iter().any(|t| t.contains("edit")));
        }
        other => panic!("Expected Cycle, got {:?}", other),
    }
    assert_eq!(handler.calls(), 0);
    assert!(orchestrator
        .tasks()
        .all(|t| t.status == TaskStatus::Pending));
}

/// Test: a dependency on an unregistered task is rejected.
///
/// Given a task depending on an id that was never submitted
/// When the orchestrator runs
/// Then it returns UnknownDependency
#[tokio::test]
async fn test_unknown_dependency_rejected() {
    let mut orchestrator = Orchestrator::new(registry_for_all(RecordingHandler::new()));
    let ghost = task("ghost", AgentKind::Orchestrator);
    orchestrator
        .submit(task("orphan", AgentKind::Orchestrator).depends_on(ghost.id))
        .unwrap();

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, Error::UnknownDependency { .. }));
}
