//! `tessera plan`

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tessera_core::{format_error_for_cli, Capability, Error, Intent, Plan, Planner, StepId};

use super::read_json;
use crate::runtime::AppConfig;

#[derive(Serialize)]
struct PlanView<'a> {
    plan: &'a Plan,
    order: &'a [StepId],
}

pub fn run(_config: &AppConfig, intent_path: &Path) -> Result<()> {
    let intent: Intent = read_json(intent_path)?;
    let plan = plan_for(&intent)?;
    let view = PlanView {
        plan: &plan,
        order: plan.topological_order(),
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Plan against the full capability set the simulated runtime provides
pub(crate) fn plan_for(intent: &Intent) -> Result<Plan> {
    let available: BTreeSet<Capability> = Capability::ALL.into_iter().collect();
    Planner::new()
        .plan(intent, &available)
        .map_err(|e| anyhow!(format_error_for_cli(&Error::from(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::PlanKind;

    #[test]
    fn test_plan_for_remediation_intent() {
        let intent = Intent::new()
            .with_hint("compliance")
            .with_parameter("remediate", json!(true));
        let plan = plan_for(&intent).unwrap();
        assert_eq!(plan.kind(), PlanKind::RiskRoutedRemediation);
        assert_eq!(
            plan.topological_order(),
            &[StepId::from("compliance"), StepId::from("remediate")]
        );
    }

    #[test]
    fn test_unknown_hint_is_rendered_for_the_user() {
        let err = plan_for(&Intent::new().with_hint("teleport")).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
