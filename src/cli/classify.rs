//! `tessera classify`

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tessera_core::risk::{classify_candidate, route};
use tessera_core::{RemediationCandidate, RiskAssessment, RoutingDecision, RoutingPolicy};

use super::read_json;
use crate::runtime::AppConfig;

#[derive(Debug, Serialize)]
struct Row {
    candidate_id: String,
    resource_id: String,
    assessment: RiskAssessment,
    decision: RoutingDecision,
}

#[derive(Debug, Serialize)]
struct Rejected {
    candidate_id: String,
    error: String,
}

#[derive(Debug, Default, Serialize)]
struct Partition {
    auto_execute: Vec<String>,
    require_confirmation: Vec<String>,
    delegate: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Classification {
    candidates: Vec<Row>,
    rejected: Vec<Rejected>,
    partition: Partition,
}

pub fn run(config: &AppConfig, candidates_path: &Path) -> Result<()> {
    let candidates: Vec<RemediationCandidate> = read_json(candidates_path)?;
    let classification = classify_all(candidates, &config.orchestrator.routing);
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

fn classify_all(candidates: Vec<RemediationCandidate>, policy: &RoutingPolicy) -> Classification {
    let mut rows = Vec::new();
    let mut rejected = Vec::new();
    let mut partition = Partition::default();

    for candidate in candidates {
        let id = candidate.id.clone();
        let classified = match classify_candidate(candidate) {
            Ok(classified) => classified,
            Err(e) => {
                rejected.push(Rejected {
                    candidate_id: id,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let decision = route(&classified, policy);
        match decision {
            RoutingDecision::AutoExecute => partition.auto_execute.push(id.clone()),
            RoutingDecision::RequireConfirmation => partition.require_confirmation.push(id.clone()),
            RoutingDecision::Delegate => partition.delegate.push(id.clone()),
        }
        rows.push(Row {
            candidate_id: id,
            resource_id: classified.candidate().resource_id.clone(),
            assessment: classified.assessment().clone(),
            decision,
        });
    }

    Classification {
        candidates: rows,
        rejected,
        partition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::RiskTier;

    fn candidates() -> Vec<RemediationCandidate> {
        serde_json::from_value(json!([
            {
                "id": "tag-vm",
                "finding": "missing tag",
                "resource_id": "vm-dev-01",
                "resource_kind": "compute",
                "environment": "dev",
                "change": "tagging"
            },
            {
                "id": "drop-db",
                "finding": "orphaned database",
                "resource_id": "sql-prod-01",
                "resource_kind": "database",
                "environment": "prod",
                "change": "delete"
            },
            {
                "id": "",
                "finding": "no id",
                "resource_id": "vm-dev-02",
                "resource_kind": "compute",
                "environment": "dev",
                "change": "tagging"
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_classify_all_partitions_and_rejects() {
        let result = classify_all(candidates(), &RoutingPolicy::default());

        assert_eq!(result.partition.auto_execute, vec!["tag-vm"]);
        assert_eq!(result.partition.delegate, vec!["drop-db"]);
        assert!(result.partition.require_confirmation.is_empty());
        assert_eq!(result.candidates[1].assessment.tier, RiskTier::Critical);
        assert_eq!(result.rejected.len(), 1);
    }

    #[test]
    fn test_policy_can_only_tighten() {
        let policy = RoutingPolicy::default().without_auto_execute();
        let result = classify_all(candidates(), &policy);

        assert!(result.partition.auto_execute.is_empty());
        assert_eq!(result.partition.require_confirmation, vec!["tag-vm"]);
        assert_eq!(result.partition.delegate, vec!["drop-db"]);
    }
}
