//! End-to-end runs over a temp workspace: decomposition, batches,
//! programs, the queue controller and the governance loop.

mod common;

use std::sync::Arc;

use common::TestWorkspace;
use sce_closeloop::adapters::runners::{ScriptedGoalRunner, ScriptedResponse};
use sce_closeloop::domain::models::{
    BatchOptions, GateRequest, Goal, GoalStatus, ListQuery, ProgramOptions, RecordPayload,
    RecordStatus, SessionKind, SessionRef,
};
use sce_closeloop::services::{
    BatchInput, ControllerRequest, GovernanceRequest, ProgramSnapshots,
};

const FIVE_TRACK_GOAL: &str = "kse should deliver closed-loop automation and master/sub decomposition, parallel orchestration runtime and scheduler resilience, quality gate with observability KPI plus test evidence, and documentation rollout with migration and operator enablement";

#[tokio::test]
async fn test_five_track_goal_produces_five_sub_specs() {
    common::setup_test_logging();
    let ws = TestWorkspace::simulated();

    let record = ws
        .ctx
        .scheduler
        .run_batch(
            BatchInput::from_goals(vec![Goal::new(FIVE_TRACK_GOAL)]),
            &BatchOptions::default(),
        )
        .await
        .expect("batch runs");

    let batch = record.payload.batch().expect("batch payload");
    assert_eq!(batch.results.len(), 1);
    assert_eq!(batch.results[0].sub_spec_count, 5);
    assert_eq!(batch.results[0].sub_specs.len(), 5);

    let master = batch.results[0].master_spec.clone().expect("master spec");
    let specs_root = ws.ctx.config.workspace.specs_path();
    assert!(specs_root.join(&master).join("spec.json").exists());
    for sub in &batch.results[0].sub_specs {
        assert!(specs_root.join(sub).join("spec.json").exists());
    }
}

#[tokio::test]
async fn test_two_goal_batch_completes_sequentially() {
    let ws = TestWorkspace::simulated();
    let options = BatchOptions {
        batch_parallel: Some(1),
        ..BatchOptions::default()
    };

    let record = ws
        .ctx
        .scheduler
        .run_batch(
            BatchInput::from_goals(Goal::from_texts(["build the queue", "document the queue"])),
            &options,
        )
        .await
        .expect("batch runs");

    assert_eq!(record.status(), RecordStatus::Completed);
    let batch = record.payload.batch().expect("batch payload");
    assert_eq!(batch.batch_parallel, 1);
    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.completed_goals + batch.failed_goals, batch.total_goals);
    assert!(batch.results.iter().all(|r| r.status == GoalStatus::Completed));

    // The record is persisted and reachable through `latest`.
    let latest = ws
        .ctx
        .sessions
        .get(SessionKind::BatchSession, &SessionRef::parse("latest"))
        .await
        .expect("latest batch");
    assert_eq!(latest.id, record.id);
}

#[tokio::test]
async fn test_batch_results_account_for_every_goal() {
    let runner = Arc::new(ScriptedGoalRunner::new());
    runner
        .script("flaky goal", vec![ScriptedResponse::failure("runner crashed")])
        .await;
    runner
        .script("broken goal", vec![ScriptedResponse::error("spawn failed")])
        .await;
    let ws = TestWorkspace::scripted(runner);
    let options = BatchOptions {
        batch_parallel: Some(3),
        continue_on_error: true,
        ..BatchOptions::default()
    };

    let record = ws
        .ctx
        .scheduler
        .run_batch(
            BatchInput::from_goals(Goal::from_texts(["steady goal", "flaky goal", "broken goal"])),
            &options,
        )
        .await
        .expect("batch runs");

    let batch = record.payload.batch().expect("batch payload");
    assert_eq!(batch.results.len(), batch.total_goals);
    assert_eq!(batch.completed_goals + batch.failed_goals, batch.results.len());
    assert_eq!(batch.failed_goals, 2);
    assert_eq!(record.status(), RecordStatus::PartialFailed);
}

#[tokio::test]
async fn test_program_fails_gate_when_budget_exceeds_profile_cap() {
    let ws = TestWorkspace::simulated();
    let options = ProgramOptions {
        batch: BatchOptions {
            agent_budget: Some(4),
            ..BatchOptions::default()
        },
        gate: GateRequest {
            max_agent_budget: Some(2),
            ..GateRequest::default()
        },
        ..ProgramOptions::default()
    };

    let run = ws
        .ctx
        .coordinator
        .run(
            BatchInput::from_goals(Goal::from_texts(["ship the api", "ship the docs"])),
            &options,
            &ProgramSnapshots::default(),
        )
        .await
        .expect("program runs");

    assert!(!run.gate_passed());
    let program = run.summary().expect("program payload");
    assert_eq!(program.program_gate.actual.agent_budget, Some(4));
    assert_eq!(program.program_gate.policy.max_agent_budget, Some(2));
    assert!(!program.program_gate.reasons.is_empty());
    assert!(!program.program_gate_effective.passed);
}

#[tokio::test]
async fn test_program_writes_kpi_and_audit_snapshots() {
    let ws = TestWorkspace::simulated();
    let snapshots = ProgramSnapshots {
        kpi_out: Some(ws.dir.path().join("out/kpi.json")),
        audit_out: Some(ws.dir.path().join("out/audit.json")),
    };

    let run = ws
        .ctx
        .coordinator
        .run(
            BatchInput::from_goals(Goal::from_texts(["add retry logic"])),
            &ProgramOptions::default(),
            &snapshots,
        )
        .await
        .expect("program runs");
    assert!(run.gate_passed());

    let kpi: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(ws.dir.path().join("out/kpi.json")).expect("kpi file"),
    )
    .expect("kpi json");
    assert_eq!(kpi["risk_level"], "low");

    let audit: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(ws.dir.path().join("out/audit.json")).expect("audit file"),
    )
    .expect("audit json");
    assert_eq!(audit["program_session"]["id"], run.record.id.as_str());
}

#[tokio::test]
async fn test_controller_drains_queue_in_one_cycle() {
    let ws = TestWorkspace::simulated();
    let queue_file = ws.dir.path().join("goals.lines");
    std::fs::write(&queue_file, "build the parser\nwrite the parser docs\n").expect("queue file");

    let record = ws
        .ctx
        .controller()
        .drain(ControllerRequest {
            queue_file: Some(queue_file.clone()),
            dequeue_limit: Some(2),
            max_cycles: Some(1),
            ..ControllerRequest::default()
        })
        .await
        .expect("controller drains");

    let RecordPayload::Controller(session) = &record.payload else {
        panic!("expected a controller payload");
    };
    assert_eq!(session.processed_goals, 2);
    assert_eq!(session.pending_goals, 0);
    assert_eq!(session.cycles.len(), 1);
    assert_eq!(record.status(), RecordStatus::Completed);

    let remaining = std::fs::read_to_string(&queue_file).expect("queue file");
    assert!(remaining.trim().is_empty());
}

#[tokio::test]
async fn test_controller_leaves_goals_beyond_cycle_limit_pending() {
    let ws = TestWorkspace::simulated();
    let queue_file = ws.dir.path().join("goals.lines");

    let record = ws
        .ctx
        .controller()
        .drain(ControllerRequest {
            queue_file: Some(queue_file.clone()),
            enqueue: vec!["first goal".into(), "second goal".into(), "third goal".into()],
            dequeue_limit: Some(1),
            max_cycles: Some(2),
            ..ControllerRequest::default()
        })
        .await
        .expect("controller drains");

    let RecordPayload::Controller(session) = &record.payload else {
        panic!("expected a controller payload");
    };
    assert_eq!(session.processed_goals, 2);
    assert_eq!(session.pending_goals, 1);
    let remaining = std::fs::read_to_string(&queue_file).expect("queue file");
    assert_eq!(remaining.lines().collect::<Vec<_>>(), vec!["third goal"]);
}

#[tokio::test]
async fn test_governance_history_never_exceeds_max_rounds() {
    let runner = Arc::new(ScriptedGoalRunner::with_default_response(
        ScriptedResponse::failure("always fails"),
    ));
    let ws = TestWorkspace::scripted(runner);

    let record = ws
        .ctx
        .governance()
        .run(GovernanceRequest {
            goals: vec!["stabilize the scheduler".into()],
            max_rounds: Some(2),
            options: ProgramOptions {
                batch: BatchOptions {
                    continue_on_error: true,
                    ..BatchOptions::default()
                },
                ..ProgramOptions::default()
            },
            ..GovernanceRequest::default()
        })
        .await
        .expect("governance runs");

    let RecordPayload::Governance(session) = &record.payload else {
        panic!("expected a governance payload");
    };
    assert!(session.history.len() <= 2);
    assert_eq!(session.performed_rounds as usize, session.history.len());
    assert!(!session.converged);
    assert_eq!(record.status(), RecordStatus::Exhausted);
}

#[tokio::test]
async fn test_sessions_listing_reports_total() {
    let ws = TestWorkspace::simulated();
    for goal in ["one", "two", "three"] {
        ws.ctx
            .scheduler
            .run_batch(
                BatchInput::from_goals(Goal::from_texts([goal])),
                &BatchOptions::default(),
            )
            .await
            .expect("batch runs");
    }

    let listing = ws
        .ctx
        .retention
        .list_sessions(
            SessionKind::BatchSession,
            &ListQuery {
                status: None,
                limit: Some(2),
            },
        )
        .await
        .expect("listing");
    assert_eq!(listing.total, 3);
    assert_eq!(listing.items.len(), 2);
}
