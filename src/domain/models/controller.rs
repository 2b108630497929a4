//! Queue controller models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::program::ProgramOptions;
use super::session::{RecordStatus, SessionHandle};

/// One drain cycle: up to `dequeue_limit` goals run as one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerCycle {
    pub cycle: u32,
    /// Goals that produced a result and left the queue
    pub goals: Vec<String>,
    pub program_session: Option<SessionHandle>,
    pub status: RecordStatus,
    pub completed: usize,
    pub failed: usize,
    pub gate_passed: bool,
}

/// Persisted queue-draining progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSession {
    pub status: RecordStatus,
    pub queue_file: PathBuf,
    pub queue_format: String,
    pub dequeue_limit: usize,
    pub max_cycles: u32,
    pub processed_goals: usize,
    pub completed_goals: usize,
    pub failed_goals: usize,
    pub pending_goals: usize,
    #[serde(default)]
    pub cycles: Vec<ControllerCycle>,
    #[serde(default)]
    pub stop_on_gate_failure: bool,
    #[serde(default)]
    pub stopped_on_gate_failure: bool,
    #[serde(default)]
    pub program: ProgramOptions,
}

impl ControllerSession {
    pub const QUEUE_FORMAT: &'static str = "lines";

    pub fn new(queue_file: PathBuf, dequeue_limit: usize, max_cycles: u32, program: ProgramOptions) -> Self {
        Self {
            status: RecordStatus::Running,
            queue_file,
            queue_format: Self::QUEUE_FORMAT.to_string(),
            dequeue_limit,
            max_cycles,
            processed_goals: 0,
            completed_goals: 0,
            failed_goals: 0,
            pending_goals: 0,
            cycles: Vec::new(),
            stop_on_gate_failure: false,
            stopped_on_gate_failure: false,
            program,
        }
    }

    /// Fold one finished cycle into the counters.
    pub fn record_cycle(&mut self, cycle: ControllerCycle) {
        self.processed_goals += cycle.goals.len();
        self.completed_goals += cycle.completed;
        self.failed_goals += cycle.failed;
        self.cycles.push(cycle);
    }

    pub fn next_cycle_number(&self) -> u32 {
        self.cycles.last().map_or(1, |cycle| cycle.cycle + 1)
    }

    /// Terminal status once draining stops with `pending` goals left.
    pub fn settle(&mut self, pending: usize) {
        self.pending_goals = pending;
        self.status = if pending > 0 || self.stopped_on_gate_failure {
            RecordStatus::Running
        } else if self.failed_goals > 0 {
            RecordStatus::PartialFailed
        } else {
            RecordStatus::Completed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(n: u32, goals: &[&str], failed: usize) -> ControllerCycle {
        ControllerCycle {
            cycle: n,
            goals: goals.iter().map(ToString::to_string).collect(),
            program_session: None,
            status: RecordStatus::Completed,
            completed: goals.len() - failed,
            failed,
            gate_passed: failed == 0,
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let mut session = ControllerSession::new(PathBuf::from("q.lines"), 2, 3, ProgramOptions::default());
        session.record_cycle(cycle(1, &["a", "b"], 0));
        session.record_cycle(cycle(2, &["c"], 1));
        session.settle(0);
        assert_eq!(session.processed_goals, 3);
        assert_eq!(session.completed_goals, 2);
        assert_eq!(session.next_cycle_number(), 3);
        assert_eq!(session.status, RecordStatus::PartialFailed);
        assert_eq!(session.queue_format, "lines");
    }

    #[test]
    fn test_pending_keeps_running() {
        let mut session = ControllerSession::new(PathBuf::from("q.lines"), 1, 1, ProgramOptions::default());
        session.record_cycle(cycle(1, &["a"], 0));
        session.settle(4);
        assert_eq!(session.status, RecordStatus::Running);
        assert_eq!(session.pending_goals, 4);
    }
}
