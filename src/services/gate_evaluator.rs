//! Gate evaluation with fallback profiles.

use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EffectiveGate, GateActual, GateConfig, GateEvaluation, GatePolicy, GateRequest, GateSource,
    ProgramKpi, ResourcePlan,
};

/// Primary evaluation plus whatever fallbacks were needed.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub primary: GateEvaluation,
    pub effective: EffectiveGate,
    /// Fallback evaluations in the order they were attempted
    pub fallbacks: Vec<GateEvaluation>,
}

#[derive(Debug, Clone)]
pub struct GateEvaluator {
    config: GateConfig,
}

impl GateEvaluator {
    pub const fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Resolve the primary policy of a request, with overrides applied.
    ///
    /// Unknown profiles are configuration errors and are caught before any
    /// goal runs.
    pub fn primary_policy(&self, request: &GateRequest) -> DomainResult<GatePolicy> {
        let name = request
            .profile
            .as_deref()
            .unwrap_or(&self.config.default_profile);
        let mut policy = self.resolve(name)?;
        if let Some(max_risk_level) = request.max_risk_level {
            policy.max_risk_level = max_risk_level;
        }
        if request.max_agent_budget.is_some() {
            policy.max_agent_budget = request.max_agent_budget;
        }
        Ok(policy)
    }

    /// Fallback profiles in evaluation order: the single fallback first, then
    /// the chain. Duplicates and the primary profile are dropped.
    pub fn fallback_order(&self, request: &GateRequest, primary: &str) -> DomainResult<Vec<GatePolicy>> {
        let mut seen: Vec<&str> = vec![primary];
        let mut order = Vec::new();
        for name in request
            .fallback_profile
            .iter()
            .chain(request.fallback_chain.iter())
            .map(String::as_str)
        {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            order.push(self.resolve(name)?);
        }
        Ok(order)
    }

    /// Validate every profile a request names.
    pub fn validate(&self, request: &GateRequest) -> DomainResult<()> {
        let primary = self.primary_policy(request)?;
        self.fallback_order(request, &primary.profile).map(|_| ())
    }

    /// Evaluate one program outcome. Fallbacks are evaluated against the same
    /// outcome and stop at the first pass.
    pub fn evaluate(
        &self,
        request: &GateRequest,
        kpi: &ProgramKpi,
        plan: &ResourcePlan,
    ) -> DomainResult<GateOutcome> {
        let actual = GateActual {
            risk_level: kpi.risk_level,
            agent_budget: plan.agent_budget,
            completion_rate_percent: kpi.completion_rate_percent,
            failed_goal_count: kpi.failed_goal_count,
        };

        let primary_policy = self.primary_policy(request)?;
        let primary = primary_policy.evaluate(&actual);
        let chain = self.fallback_order(request, &primary_policy.profile)?;
        let chain_names: Vec<String> = chain.iter().map(|p| p.profile.clone()).collect();

        if primary.passed {
            return Ok(GateOutcome {
                primary,
                effective: EffectiveGate {
                    passed: true,
                    source: GateSource::Primary,
                    fallback_profile: None,
                    attempted_fallback_count: 0,
                    fallback_chain: chain_names,
                },
                fallbacks: Vec::new(),
            });
        }

        warn!(profile = %primary.policy.profile, reasons = ?primary.reasons, "primary gate failed");

        let mut fallbacks = Vec::new();
        let mut passed_profile = None;
        for policy in chain {
            let evaluation = policy.evaluate(&actual);
            let passed = evaluation.passed;
            fallbacks.push(evaluation);
            if passed {
                info!(profile = %policy.profile, attempted = fallbacks.len(), "fallback gate passed");
                passed_profile = Some(policy.profile);
                break;
            }
        }

        Ok(GateOutcome {
            primary,
            effective: EffectiveGate {
                passed: passed_profile.is_some(),
                source: GateSource::FallbackChain,
                attempted_fallback_count: fallbacks.len(),
                fallback_profile: passed_profile,
                fallback_chain: chain_names,
            },
            fallbacks,
        })
    }

    fn resolve(&self, name: &str) -> DomainResult<GatePolicy> {
        self.config.policy(name).ok_or_else(|| {
            DomainError::InvalidConfiguration(format!(
                "unknown gate profile '{name}' (known: {})",
                self.config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ConvergenceState, RiskLevel, SchedulingStrategy};

    fn kpi(risk_level: RiskLevel) -> ProgramKpi {
        ProgramKpi {
            convergence_state: ConvergenceState::Partial,
            risk_level,
            completion_rate_percent: 50.0,
            failed_goal_count: 1,
            total_goals: 2,
            budget_utilization_percent: None,
            retry_rounds_performed: 0,
        }
    }

    fn plan(agent_budget: Option<usize>) -> ResourcePlan {
        ResourcePlan {
            agent_budget,
            base_goal_parallel: 1,
            effective_goal_parallel: 1,
            per_goal_max_parallel: 1,
            scheduling_strategy: SchedulingStrategy::Fifo,
            aging_factor: 0.5,
            complexity_weight_total: 0.0,
        }
    }

    fn evaluator() -> GateEvaluator {
        GateEvaluator::new(GateConfig::default())
    }

    #[test]
    fn test_budget_override_fails_primary() {
        let request = GateRequest {
            max_agent_budget: Some(2),
            ..GateRequest::default()
        };
        let outcome = evaluator()
            .evaluate(&request, &kpi(RiskLevel::Low), &plan(Some(4)))
            .expect("evaluate");
        assert!(!outcome.primary.passed);
        assert_eq!(outcome.primary.actual.agent_budget, Some(4));
        assert!(!outcome.effective.passed);
        assert_eq!(outcome.effective.source, GateSource::FallbackChain);
    }

    #[test]
    fn test_prod_rejects_medium_staging_accepts() {
        let evaluator = evaluator();
        let prod = GateRequest {
            profile: Some("prod".into()),
            ..GateRequest::default()
        };
        let staging = GateRequest {
            profile: Some("staging".into()),
            ..GateRequest::default()
        };
        let medium = kpi(RiskLevel::Medium);
        assert!(!evaluator.evaluate(&prod, &medium, &plan(None)).expect("prod").effective.passed);
        assert!(evaluator.evaluate(&staging, &medium, &plan(None)).expect("staging").effective.passed);
    }

    #[test]
    fn test_fallback_chain_counts_attempts() {
        let request = GateRequest {
            profile: Some("prod".into()),
            fallback_profile: Some("prod".into()),
            fallback_chain: vec!["staging".into(), "staging".into(), "default".into()],
            ..GateRequest::default()
        };
        let outcome = evaluator()
            .evaluate(&request, &kpi(RiskLevel::High), &plan(None))
            .expect("evaluate");
        assert_eq!(outcome.effective.fallback_chain, vec!["staging", "default"]);
        assert_eq!(outcome.effective.attempted_fallback_count, 2);
        assert!(outcome.effective.passed);
        assert_eq!(outcome.effective.fallback_profile.as_deref(), Some("default"));
    }

    #[test]
    fn test_exhausted_chain() {
        let request = GateRequest {
            profile: Some("prod".into()),
            fallback_chain: vec!["staging".into()],
            ..GateRequest::default()
        };
        let outcome = evaluator()
            .evaluate(&request, &kpi(RiskLevel::High), &plan(None))
            .expect("evaluate");
        assert!(!outcome.effective.passed);
        assert_eq!(outcome.effective.attempted_fallback_count, 1);
        assert_eq!(outcome.fallbacks.len(), 1);
    }

    #[test]
    fn test_unknown_profile_is_configuration_error() {
        let request = GateRequest {
            fallback_chain: vec!["nightly".into()],
            ..GateRequest::default()
        };
        let err = evaluator().validate(&request).expect_err("unknown profile");
        assert!(err.is_configuration());
    }
}
