use serde::Serialize;
use tracing::debug;

use super::types::{
    ClassifiedCandidate, EnvironmentTier, RiskTier, RoutingDecision, RoutingPolicy,
};

/// Route a classified candidate.
///
/// The tier table decides first; the policy can then only move a candidate
/// from `AutoExecute` to `RequireConfirmation`. High and Critical are always
/// delegated.
#[must_use]
pub fn route(classified: &ClassifiedCandidate, policy: &RoutingPolicy) -> RoutingDecision {
    let candidate = classified.candidate();
    let decision = match classified.tier() {
        RiskTier::High | RiskTier::Critical => RoutingDecision::Delegate,
        _ if !candidate.automatable => RoutingDecision::Delegate,
        RiskTier::Medium => RoutingDecision::RequireConfirmation,
        RiskTier::Minimal | RiskTier::Low => {
            let tightened = !policy.auto_execute_enabled
                || (policy.confirm_production
                    && candidate.environment == EnvironmentTier::Production)
                || (policy.confirm_destructive && candidate.change.is_destructive());
            if tightened {
                RoutingDecision::RequireConfirmation
            } else {
                RoutingDecision::AutoExecute
            }
        }
    };

    debug!(
        candidate = %candidate.id,
        tier = %classified.tier(),
        score = classified.assessment().score,
        ?decision,
        "Routed remediation candidate"
    );
    decision
}

/// Candidates grouped by routing decision, each group in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingPartition {
    /// Safe to apply directly
    pub auto_execute: Vec<ClassifiedCandidate>,
    /// Need human confirmation
    pub require_confirmation: Vec<ClassifiedCandidate>,
    /// Go to template generation
    pub delegate: Vec<ClassifiedCandidate>,
}

/// Route every candidate
#[must_use]
pub fn partition(candidates: Vec<ClassifiedCandidate>, policy: &RoutingPolicy) -> RoutingPartition {
    let mut partition = RoutingPartition::default();
    for classified in candidates {
        match route(&classified, policy) {
            RoutingDecision::AutoExecute => partition.auto_execute.push(classified),
            RoutingDecision::RequireConfirmation => {
                partition.require_confirmation.push(classified)
            }
            RoutingDecision::Delegate => partition.delegate.push(classified),
        }
    }
    partition
}
