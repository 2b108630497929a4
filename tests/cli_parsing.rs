//! Argument parsing for the command surface.

use clap::Parser;
use sce_closeloop::cli::commands::kpi::KpiCommands;
use sce_closeloop::cli::commands::sessions::SessionsCommands;
use sce_closeloop::cli::{Cli, Commands};
use sce_closeloop::domain::models::{ExecutionMode, PeriodUnit, SessionKind};

#[test]
fn test_json_flag_is_global() {
    let cli = Cli::try_parse_from(["sce-closeloop", "stats", "--json"]).expect("parse");
    assert!(cli.json);
    assert!(matches!(cli.command, Commands::Stats));
}

#[test]
fn test_controller_flags() {
    let cli = Cli::try_parse_from([
        "sce-closeloop",
        "controller",
        "--queue-file",
        "goals.lines",
        "--enqueue",
        "a",
        "--enqueue",
        "b",
        "--dequeue-limit",
        "2",
        "--max-cycles",
        "1",
        "--stop-on-gate-failure",
    ])
    .expect("parse");
    let Commands::Controller(args) = cli.command else {
        panic!("expected controller");
    };
    assert_eq!(args.enqueue, vec!["a", "b"]);
    assert_eq!(args.dequeue_limit, Some(2));
    assert_eq!(args.max_cycles, Some(1));
    assert!(args.stop_on_gate_failure);
}

#[test]
fn test_governance_execute_advisory_requires_advisory() {
    let result = Cli::try_parse_from(["sce-closeloop", "governance", "goal", "--execute-advisory"]);
    assert!(result.is_err());

    let cli = Cli::try_parse_from([
        "sce-closeloop",
        "governance",
        "--mode",
        "recover-cycle",
        "--advisory",
        "--execute-advisory",
    ])
    .expect("parse");
    let Commands::Governance(args) = cli.command else {
        panic!("expected governance");
    };
    assert_eq!(args.mode, ExecutionMode::RecoverCycle);
    assert!(args.execute_advisory);
}

#[test]
fn test_sessions_list_for_controller_archive() {
    let cli = Cli::try_parse_from(["sce-closeloop", "sessions", "controller", "list", "--limit", "5"])
        .expect("parse");
    let Commands::Sessions(args) = cli.command else {
        panic!("expected sessions");
    };
    assert_eq!(args.kind, SessionKind::ControllerSession);
    assert!(matches!(args.command, SessionsCommands::List { limit: 5, status: None }));
}

#[test]
fn test_kpi_trend_defaults() {
    let cli = Cli::try_parse_from(["sce-closeloop", "kpi", "trend"]).expect("parse");
    let Commands::Kpi(args) = cli.command else {
        panic!("expected kpi");
    };
    let KpiCommands::Trend { period, .. } = args.command;
    assert_eq!(period, PeriodUnit::Week);
}

#[test]
fn test_unknown_session_kind_is_rejected() {
    assert!(Cli::try_parse_from(["sce-closeloop", "sessions", "nope", "stats"]).is_err());
}
