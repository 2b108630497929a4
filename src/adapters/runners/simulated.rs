//! Simulated goal runner.
//!
//! Plans a portfolio for each goal and, outside dry runs, materialises one
//! directory per spec under the spec root. Every goal completes.

use async_trait::async_trait;
use serde_json::json;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapters::fs::atomic_write;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{slugify, Goal, Portfolio};
use crate::domain::ports::{GoalRunOutcome, GoalRunRequest, GoalRunner};

const SLUG_WORDS: usize = 4;

/// Portfolio ids for a goal: `NNN-00-slug` master plus `NNN-kk-slug` subs.
pub fn plan_portfolio(sequence: u32, goal: &Goal) -> Portfolio {
    let slug = slugify(&goal.text, SLUG_WORDS);
    let master = format!("{sequence:03}-00-{slug}");
    let sub_specs = (1..=goal.sub_spec_count())
        .map(|k| format!("{sequence:03}-{k:02}-{slug}"))
        .collect();
    Portfolio::new(master, sub_specs)
}

pub struct SimulatedGoalRunner {
    specs_root: PathBuf,
    /// Last sequence number handed out; lazily seeded from the spec root
    sequence: Mutex<Option<u32>>,
}

impl SimulatedGoalRunner {
    pub fn new(specs_root: impl Into<PathBuf>) -> Self {
        Self {
            specs_root: specs_root.into(),
            sequence: Mutex::new(None),
        }
    }

    async fn highest_existing_sequence(&self) -> DomainResult<u32> {
        let mut entries = match tokio::fs::read_dir(&self.specs_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(DomainError::io(&self.specs_root, e)),
        };
        let mut highest = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::io(&self.specs_root, e))?
        {
            let name = entry.file_name();
            let sequence = name
                .to_string_lossy()
                .split('-')
                .next()
                .and_then(|prefix| prefix.parse::<u32>().ok());
            if let Some(sequence) = sequence {
                highest = highest.max(sequence);
            }
        }
        Ok(highest)
    }

    async fn next_sequence(&self) -> DomainResult<u32> {
        let mut sequence = self.sequence.lock().await;
        let next = match *sequence {
            Some(last) => last + 1,
            None => self.highest_existing_sequence().await? + 1,
        };
        *sequence = Some(next);
        Ok(next)
    }

    async fn materialise(&self, goal: &Goal, portfolio: &Portfolio) -> DomainResult<()> {
        let master = portfolio.master_spec.as_str();
        for id in portfolio.spec_ids() {
            let role = if id == master { "master" } else { "sub" };
            let manifest = json!({
                "id": id,
                "role": role,
                "master_spec": master,
                "goal": goal.text,
                "categories": goal.complexity.categories,
            });
            let content = serde_json::to_vec_pretty(&manifest)?;
            atomic_write(&self.specs_root.join(id).join("spec.json"), &content).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GoalRunner for SimulatedGoalRunner {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn run(&self, request: GoalRunRequest) -> DomainResult<GoalRunOutcome> {
        let sequence = self.next_sequence().await?;
        let portfolio = plan_portfolio(sequence, &request.goal);

        if request.dry_run {
            return Ok(GoalRunOutcome::planned(portfolio));
        }

        self.materialise(&request.goal, &portfolio).await?;
        debug!(
            goal_index = request.index,
            master_spec = %portfolio.master_spec,
            sub_specs = portfolio.sub_specs.len(),
            "simulated goal completed"
        );
        Ok(GoalRunOutcome::completed(portfolio))
    }
}
