//! Goal and portfolio domain models.
//!
//! A goal is one natural-language unit of requested work. Scoring it is pure:
//! the complexity score is derived from the delivery categories the text
//! touches, how many clauses it has and how long it is. The score picks the
//! sub-spec count of the goal's portfolio and doubles as its scheduling weight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Upper bound on sub-specs per goal.
pub const MAX_SUB_SPECS: usize = 5;

/// Connectives that split a goal into clauses, besides `,` and `;`.
const CLAUSE_CONNECTIVES: [&str; 4] = [" and ", " plus ", " with ", " then "];

/// Delivery categories a clause can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryCategory {
    Planning,
    Orchestration,
    Resilience,
    Quality,
    Observability,
    Enablement,
}

impl DeliveryCategory {
    pub const ALL: [Self; 6] = [
        Self::Planning,
        Self::Orchestration,
        Self::Resilience,
        Self::Quality,
        Self::Observability,
        Self::Enablement,
    ];

    /// Keywords (lowercase) that mark a clause as belonging to this category.
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Planning => &[
                "closed-loop",
                "close-loop",
                "decomposition",
                "decompose",
                "master/sub",
                "master",
                "portfolio",
                "spec",
                "planning",
            ],
            Self::Orchestration => &[
                "orchestration",
                "orchestrate",
                "parallel",
                "scheduler",
                "scheduling",
                "runtime",
                "automation",
                "queue",
                "concurrency",
            ],
            Self::Resilience => &[
                "resilience",
                "resilient",
                "retry",
                "recovery",
                "rollback",
                "failover",
                "fault",
            ],
            Self::Quality => &[
                "quality",
                "gate",
                "test",
                "evidence",
                "validation",
                "verification",
                "coverage",
            ],
            Self::Observability => &[
                "observability",
                "kpi",
                "metric",
                "monitoring",
                "telemetry",
                "dashboard",
            ],
            Self::Enablement => &[
                "documentation",
                "docs",
                "rollout",
                "migration",
                "operator",
                "enablement",
                "training",
                "guide",
            ],
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Orchestration => "orchestration",
            Self::Resilience => "resilience",
            Self::Quality => "quality",
            Self::Observability => "observability",
            Self::Enablement => "enablement",
        }
    }

    /// Categories whose keywords occur in `text`.
    pub fn detect(text: &str) -> BTreeSet<Self> {
        let lowered = text.to_lowercase();
        Self::ALL
            .into_iter()
            .filter(|category| category.keywords().iter().any(|kw| lowered.contains(kw)))
            .collect()
    }
}

impl fmt::Display for DeliveryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split goal text on clause boundaries.
///
/// Empty fragments are dropped; the result is never empty for non-blank input.
pub fn split_clauses(text: &str) -> Vec<String> {
    let mut fragments: Vec<String> = text
        .split([',', ';'])
        .map(str::to_string)
        .collect();

    for connective in CLAUSE_CONNECTIVES {
        fragments = fragments
            .iter()
            .flat_map(|fragment| fragment.split(connective).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }

    fragments
        .into_iter()
        .map(|fragment| fragment.trim().trim_end_matches('.').trim().to_string())
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

/// Complexity breakdown for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub score: u32,
    pub categories: Vec<DeliveryCategory>,
    pub clause_count: usize,
    pub word_count: usize,
    pub sub_spec_count: usize,
}

impl ComplexityScore {
    /// Score goal text.
    ///
    /// Five or more categories always yield the sub-spec ceiling.
    pub fn evaluate(text: &str) -> Self {
        let categories: Vec<DeliveryCategory> = DeliveryCategory::detect(text).into_iter().collect();
        let clause_count = split_clauses(text).len().max(1);
        let word_count = text.split_whitespace().count();

        let score = (categories.len() as u32) * 10
            + (clause_count as u32) * 4
            + (word_count.min(60) as u32) / 4;

        let sub_spec_count = if categories.len() >= 5 {
            MAX_SUB_SPECS
        } else {
            match score {
                0..=14 => 1,
                15..=29 => 2,
                30..=44 => 3,
                45..=59 => 4,
                _ => MAX_SUB_SPECS,
            }
        };

        Self {
            score,
            categories,
            clause_count,
            word_count,
            sub_spec_count,
        }
    }
}

/// One unit of requested work, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub text: String,
    pub complexity: ComplexityScore,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let complexity = ComplexityScore::evaluate(&text);
        Self { text, complexity }
    }

    /// Build goals from an already-split list, skipping blank entries.
    pub fn from_texts<I, S>(texts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        texts
            .into_iter()
            .filter(|text| !text.as_ref().trim().is_empty())
            .map(|text| Self::new(text.as_ref()))
            .collect()
    }

    pub const fn sub_spec_count(&self) -> usize {
        self.complexity.sub_spec_count
    }

    /// Scheduling weight used by complex-first ordering.
    pub fn weight(&self) -> f64 {
        f64::from(self.complexity.score)
    }
}

/// Decomposition result for one goal: a master spec plus ordered sub-specs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub master_spec: String,
    pub sub_specs: Vec<String>,
}

impl Portfolio {
    pub fn new(master_spec: impl Into<String>, sub_specs: Vec<String>) -> Self {
        Self {
            master_spec: master_spec.into(),
            sub_specs,
        }
    }

    /// Every spec id this portfolio refers to, master first.
    pub fn spec_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.master_spec.as_str())
            .chain(self.sub_specs.iter().map(String::as_str))
            .filter(|id| !id.is_empty())
    }
}

/// Quality of a decomposition, 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionQuality {
    pub score: f64,
    pub min_score: f64,
    pub refinement_rounds: u32,
    pub passed: bool,
}

/// Result of splitting one broad goal into several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    pub strategy: String,
    pub target_goal_count: usize,
    pub produced_goal_count: usize,
    pub goals: Vec<String>,
    pub quality: DecompositionQuality,
}

impl DecompositionPlan {
    pub const STRATEGY: &'static str = "semantic-clause-and-category";
}

/// Lowercase, dash-separated slug of at most `max_words` words.
pub fn slugify(text: &str, max_words: usize) -> String {
    let slug = text
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .take(max_words)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "goal".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_TRACK_GOAL: &str = "kse should deliver closed-loop automation and master/sub decomposition, parallel orchestration runtime and scheduler resilience, quality gate with observability KPI plus test evidence, and documentation rollout with migration and operator enablement";

    #[test]
    fn test_split_clauses_on_connectives() {
        let clauses = split_clauses("build api and write docs, add tests; ship");
        assert_eq!(clauses, vec!["build api", "write docs", "add tests", "ship"]);
    }

    #[test]
    fn test_split_clauses_blank_input() {
        assert!(split_clauses("  ").is_empty());
    }

    #[test]
    fn test_detect_categories() {
        let categories = DeliveryCategory::detect("Quality gate with KPI dashboard");
        assert!(categories.contains(&DeliveryCategory::Quality));
        assert!(categories.contains(&DeliveryCategory::Observability));
        assert_eq!(categories.len(), 2);
    }

    #[test]
    fn test_five_track_goal_hits_ceiling() {
        let score = ComplexityScore::evaluate(FIVE_TRACK_GOAL);
        assert!(score.categories.len() >= 5);
        assert_eq!(score.sub_spec_count, MAX_SUB_SPECS);
    }

    #[test]
    fn test_simple_goal_gets_single_sub_spec() {
        let goal = Goal::new("fix typo");
        assert_eq!(goal.sub_spec_count(), 1);
    }

    #[test]
    fn test_sub_spec_count_is_bounded() {
        for text in ["a", "build a queue and test it", FIVE_TRACK_GOAL] {
            let count = Goal::new(text).sub_spec_count();
            assert!((1..=MAX_SUB_SPECS).contains(&count));
        }
    }

    #[test]
    fn test_from_texts_skips_blank() {
        let goals = Goal::from_texts(["one", "  ", "two"]);
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[1].text, "two");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Build the API, now!", 3), "build-the-api");
        assert_eq!(slugify("!!!", 3), "goal");
    }

    #[test]
    fn test_portfolio_spec_ids() {
        let portfolio = Portfolio::new("01-00-x", vec!["01-01-x".into(), "01-02-x".into()]);
        assert_eq!(portfolio.spec_ids().count(), 3);
        assert!(Portfolio::default().spec_ids().next().is_none());
    }
}
