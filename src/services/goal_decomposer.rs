//! Goal decomposition.
//!
//! A broad goal is split into clauses, clauses are bucketed by the first
//! delivery category they touch, and buckets are merged or split until their
//! number matches the requested goal count. An optional refinement pass moves
//! clauses between buckets to raise the quality score.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    split_clauses, DecompositionConfig, DecompositionPlan, DecompositionQuality, DeliveryCategory,
};

#[derive(Debug, Clone, PartialEq)]
struct Bucket {
    category: Option<DeliveryCategory>,
    clauses: Vec<String>,
}

impl Bucket {
    fn text(&self) -> String {
        self.clauses.join(", ")
    }

    fn categories(&self) -> BTreeSet<DeliveryCategory> {
        DeliveryCategory::detect(&self.text())
    }
}

#[derive(Debug, Clone)]
pub struct GoalDecomposer {
    config: DecompositionConfig,
}

impl GoalDecomposer {
    pub const fn new(config: DecompositionConfig) -> Self {
        Self { config }
    }

    /// Split `goal` into (up to) `target_count` goals.
    ///
    /// With `enforce_quality`, a plan whose score stays below the configured
    /// minimum after refinement is rejected.
    pub fn decompose(
        &self,
        goal: &str,
        target_count: usize,
        enforce_quality: bool,
    ) -> DomainResult<DecompositionPlan> {
        let clauses = split_clauses(goal);
        if clauses.is_empty() {
            return Err(DomainError::InvalidConfiguration(
                "cannot decompose an empty goal".to_string(),
            ));
        }
        let target_count = target_count.max(1);
        let goal_categories = DeliveryCategory::detect(goal);

        let mut buckets = initial_buckets(clauses);
        fit_to_target(&mut buckets, target_count);

        let mut best_score = quality_score(&buckets, &goal_categories);
        let mut best = buckets.clone();
        let mut refinement_rounds = 0;

        while best_score < self.config.min_quality_score
            && refinement_rounds < self.config.max_refinement_rounds
        {
            if !rebalance(&mut buckets) {
                break;
            }
            refinement_rounds += 1;
            let score = quality_score(&buckets, &goal_categories);
            debug!(round = refinement_rounds, score, "decomposition refinement round");
            if score > best_score {
                best_score = score;
                best = buckets.clone();
            }
        }

        let passed = best_score >= self.config.min_quality_score;
        if !passed {
            if enforce_quality {
                return Err(DomainError::DecompositionQuality {
                    score: best_score,
                    min: self.config.min_quality_score,
                });
            }
            warn!(
                score = best_score,
                min = self.config.min_quality_score,
                "decomposition quality below minimum"
            );
        }

        let goals: Vec<String> = best.iter().map(Bucket::text).collect();
        Ok(DecompositionPlan {
            strategy: DecompositionPlan::STRATEGY.to_string(),
            target_goal_count: target_count,
            produced_goal_count: goals.len(),
            goals,
            quality: DecompositionQuality {
                score: best_score,
                min_score: self.config.min_quality_score,
                refinement_rounds,
                passed,
            },
        })
    }
}

/// One bucket per category run; uncategorised clauses join the previous bucket.
fn initial_buckets(clauses: Vec<String>) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    for clause in clauses {
        let category = DeliveryCategory::detect(&clause).into_iter().next();
        match (category, buckets.last_mut()) {
            (None, Some(last)) => last.clauses.push(clause),
            (Some(category), Some(last)) if last.category == Some(category) => {
                last.clauses.push(clause);
            }
            (Some(category), Some(last)) if last.category.is_none() => {
                last.category = Some(category);
                last.clauses.push(clause);
            }
            _ => buckets.push(Bucket {
                category,
                clauses: vec![clause],
            }),
        }
    }
    buckets
}

/// Merge the smallest adjacent pair, or split the largest bucket, until the
/// count matches `target`. Stops early when no bucket can be split further.
fn fit_to_target(buckets: &mut Vec<Bucket>, target: usize) {
    while buckets.len() > target {
        let Some(pair) = (0..buckets.len() - 1)
            .min_by_key(|&i| buckets[i].clauses.len() + buckets[i + 1].clauses.len())
        else {
            break;
        };
        let next = buckets.remove(pair + 1);
        let merged = &mut buckets[pair];
        merged.category = merged.category.or(next.category);
        merged.clauses.extend(next.clauses);
    }

    while buckets.len() < target {
        let Some(largest) = (0..buckets.len())
            .filter(|&i| buckets[i].clauses.len() > 1)
            .max_by_key(|&i| (buckets[i].clauses.len(), std::cmp::Reverse(i)))
        else {
            break;
        };
        let bucket = &mut buckets[largest];
        let tail = bucket.clauses.split_off(bucket.clauses.len().div_ceil(2));
        let category = DeliveryCategory::detect(&tail.join(", ")).into_iter().next();
        buckets.insert(
            largest + 1,
            Bucket {
                category,
                clauses: tail,
            },
        );
    }
}

/// Move the last clause of the largest bucket to the smallest one.
fn rebalance(buckets: &mut [Bucket]) -> bool {
    let Some(largest) = (0..buckets.len()).max_by_key(|&i| buckets[i].clauses.len()) else {
        return false;
    };
    let Some(smallest) = (0..buckets.len()).min_by_key(|&i| buckets[i].clauses.len()) else {
        return false;
    };
    if largest == smallest || buckets[largest].clauses.len() <= buckets[smallest].clauses.len() + 1 {
        return false;
    }
    let Some(clause) = buckets[largest].clauses.pop() else {
        return false;
    };
    buckets[smallest].clauses.push(clause);
    true
}

/// `40 * coverage + 30 * balance + 30 * specificity`, rounded to 2 decimals.
fn quality_score(buckets: &[Bucket], goal_categories: &BTreeSet<DeliveryCategory>) -> f64 {
    if buckets.is_empty() {
        return 0.0;
    }
    let bucket_categories: Vec<BTreeSet<DeliveryCategory>> =
        buckets.iter().map(Bucket::categories).collect();

    let coverage = if goal_categories.is_empty() {
        1.0
    } else {
        let covered: BTreeSet<&DeliveryCategory> = bucket_categories.iter().flatten().collect();
        goal_categories.iter().filter(|c| covered.contains(c)).count() as f64
            / goal_categories.len() as f64
    };

    let sizes = buckets.iter().map(|b| b.clauses.len());
    let max = sizes.clone().max().unwrap_or(0);
    let min = sizes.min().unwrap_or(0);
    let balance = if max == 0 {
        0.0
    } else {
        1.0 - (max - min) as f64 / max as f64
    };

    let specificity = bucket_categories.iter().filter(|c| !c.is_empty()).count() as f64
        / buckets.len() as f64;

    let score = 40.0 * coverage + 30.0 * balance + 30.0 * specificity;
    (score * 100.0).round() / 100.0
}
