//! Admission ordering for batch goals.

use crate::domain::models::{Goal, SchedulingStrategy};

/// Priority points one earlier attempt is worth at an aging factor of 1.0.
const AGING_UNIT: f64 = 10.0;

/// A goal waiting for a scheduling slot.
#[derive(Debug, Clone)]
pub struct ScheduledGoal {
    /// 1-based position in the batch
    pub index: usize,
    pub goal: Goal,
    /// Position in the summary this batch was resumed from
    pub source_index: Option<usize>,
    /// Attempts already made, carried across retry rounds and resumes.
    /// Drives the aging boost, so a goal that keeps coming back is not
    /// starved by fresh complex goals.
    pub attempts: u32,
}

impl ScheduledGoal {
    pub const fn new(index: usize, goal: Goal) -> Self {
        Self {
            index,
            goal,
            source_index: None,
            attempts: 0,
        }
    }
}

/// Service for calculating goal scheduling priorities
///
/// Priority formula: complexity_score * complexity_weight + attempts * aging_factor * 10
#[derive(Debug, Clone)]
pub struct PriorityCalculator {
    complexity_weight: f64,
    aging_factor: f64,
}

impl Default for PriorityCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityCalculator {
    /// Create a new priority calculator with default weights
    pub const fn new() -> Self {
        Self {
            complexity_weight: 1.0,
            aging_factor: 0.5,
        }
    }

    /// Create a priority calculator with custom weights
    pub const fn with_weights(complexity_weight: f64, aging_factor: f64) -> Self {
        Self {
            complexity_weight,
            aging_factor,
        }
    }

    /// Calculate the priority for a waiting goal
    pub fn calculate(&self, entry: &ScheduledGoal) -> f64 {
        let base = entry.goal.weight() * self.complexity_weight;
        let aging_boost = f64::from(entry.attempts) * self.aging_factor * AGING_UNIT;
        base + aging_boost
    }

    /// Order goals for admission.
    ///
    /// `fifo` keeps input order; `complex-first` sorts by descending priority
    /// with input order breaking ties.
    pub fn order(&self, strategy: SchedulingStrategy, mut goals: Vec<ScheduledGoal>) -> Vec<ScheduledGoal> {
        match strategy {
            SchedulingStrategy::Fifo => goals.sort_by_key(|entry| entry.index),
            SchedulingStrategy::ComplexFirst => goals.sort_by(|a, b| {
                self.calculate(b)
                    .total_cmp(&self.calculate(a))
                    .then_with(|| a.index.cmp(&b.index))
            }),
        }
        goals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, text: &str, attempts: u32) -> ScheduledGoal {
        ScheduledGoal {
            attempts,
            ..ScheduledGoal::new(index, Goal::new(text))
        }
    }

    const COMPLEX: &str = "parallel scheduler with retry recovery, quality gate and KPI dashboard";

    #[test]
    fn test_calculate_complexity_only() {
        let calc = PriorityCalculator::new();
        let goal = entry(1, "fix typo", 0);
        assert_eq!(calc.calculate(&goal), goal.goal.weight());
    }

    #[test]
    fn test_calculate_with_aging() {
        let calc = PriorityCalculator::with_weights(1.0, 0.5);
        let goal = entry(1, "fix typo", 2);
        // weight + 2 * 0.5 * 10
        assert_eq!(calc.calculate(&goal), goal.goal.weight() + 10.0);
    }

    #[test]
    fn test_fifo_keeps_input_order() {
        let calc = PriorityCalculator::new();
        let ordered = calc.order(
            SchedulingStrategy::Fifo,
            vec![entry(2, COMPLEX, 0), entry(1, "fix typo", 0)],
        );
        assert_eq!(ordered.iter().map(|e| e.index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_complex_first() {
        let calc = PriorityCalculator::new();
        let ordered = calc.order(
            SchedulingStrategy::ComplexFirst,
            vec![entry(1, "fix typo", 0), entry(2, COMPLEX, 0)],
        );
        assert_eq!(ordered[0].index, 2);
    }

    #[test]
    fn test_aging_prevents_starvation() {
        let calc = PriorityCalculator::with_weights(1.0, 5.0);
        let ordered = calc.order(
            SchedulingStrategy::ComplexFirst,
            vec![entry(1, "fix typo", 3), entry(2, COMPLEX, 0)],
        );
        assert_eq!(ordered[0].index, 1);
    }
}
