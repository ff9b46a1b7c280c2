//! Risk-routed remediation and rollback scenarios

mod common;

use common::{mixed_risk_candidates, MemoryMutator, ScriptedWorker};
use serde_json::json;
use std::sync::Arc;

use tessera_core::{
    keys, ApprovalQueue, Capability, ContextKey, ConversationContext, Error, FailureKind, Intent,
    Orchestrator, OrchestratorConfig, PlanBuilder, PlanKind, RetryPolicy, RiskTier, RunResponse,
    RunState, SharedContextStore, Step, StepAction, StepId, StepResult, StepState, WorkerRegistry,
};

const CONVERSATION: &str = "conv-remediate-1";

fn conversation() -> ConversationContext {
    ConversationContext::new(CONVERSATION).with_user("ops-bob")
}

fn remediation_intent() -> Intent {
    Intent::new()
        .with_hint("compliance")
        .with_parameter("remediate", json!(true))
}

fn remediation_orchestrator(
    mutator: Arc<MemoryMutator>,
) -> (Orchestrator, Arc<SharedContextStore>, Arc<ApprovalQueue>) {
    let compliance = Arc::new(
        ScriptedWorker::new(Capability::Compliance)
            .writing(keys::REMEDIATION_CANDIDATES, mixed_risk_candidates()),
    );
    let infrastructure =
        Arc::new(ScriptedWorker::new(Capability::Infrastructure).with_mutator(mutator));
    let registry = WorkerRegistry::new()
        .with_worker(compliance)
        .with_worker(infrastructure);

    let store = Arc::new(SharedContextStore::new());
    let queue = Arc::new(ApprovalQueue::new());
    let orchestrator = Orchestrator::new(
        registry,
        Arc::clone(&store),
        OrchestratorConfig::default().with_retry(RetryPolicy::none()),
    )
    .with_approval_gate(queue.clone());
    (orchestrator, store, queue)
}

fn diag_mutator() -> MemoryMutator {
    MemoryMutator::new().with_resource("diag-dev-01", json!({ "tags": {} }))
}

#[tokio::test]
async fn test_mixed_risk_candidates_are_partitioned() {
    let mutator = Arc::new(diag_mutator());
    let (orchestrator, store, queue) = remediation_orchestrator(mutator.clone());

    let plan = orchestrator.plan(&remediation_intent()).unwrap();
    assert_eq!(plan.kind(), PlanKind::RiskRoutedRemediation);
    assert!(plan.precedes(&StepId::from("compliance"), &StepId::from("remediate")));

    let run = orchestrator.execute(&plan, &conversation()).await;
    assert_eq!(run.state, RunState::Completed);

    let report = run
        .step(&StepId::from("remediate"))
        .and_then(|r| r.remediation.clone())
        .unwrap();
    assert_eq!(report.auto_executed.len(), 1);
    assert_eq!(report.auto_executed[0].candidate_id, "tag-diag");
    assert_eq!(report.awaiting_confirmation.len(), 1);
    assert_eq!(report.awaiting_confirmation[0].tier, RiskTier::Medium);
    assert_eq!(report.delegated.len(), 1);
    assert_eq!(report.delegated[0].candidate_id, "open-vnet");
    assert!(report.failed.is_empty());

    // Only the minimal-risk fix touched a resource
    assert_eq!(mutator.applied(), vec!["remediate:tag-diag".to_string()]);
    assert_eq!(
        mutator.state("diag-dev-01"),
        json!({ "tags": { "owner": "platform" } })
    );
    assert_eq!(report.delegated[0].tier, RiskTier::Critical);
    assert_eq!(mutator.state("vnet-prod-01"), serde_json::Value::Null);

    let delegated = store
        .get(&ContextKey::new(CONVERSATION, keys::DELEGATED_REMEDIATIONS))
        .unwrap();
    assert_eq!(delegated.value[0]["id"], json!("open-vnet"));
    assert!(store.contains(&ContextKey::new(CONVERSATION, keys::REMEDIATION_RESULTS)));
    assert!(!store.contains(&ContextKey::new(
        CONVERSATION,
        keys::snapshot_for("remediate")
    )));

    let pending = queue.pending_for_run(run.id).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].candidate.id, "https-only");
    assert_eq!(pending[0].step_id, StepId::from("remediate"));

    let response = RunResponse::from_run(&run);
    assert!(response.text.contains(
        "1 auto-executed, 1 awaiting confirmation, 1 delegated to template generation, 0 failed"
    ));
}

#[tokio::test]
async fn test_repeated_runs_report_identical_results() {
    let mut encoded = Vec::new();
    for _ in 0..2 {
        let (orchestrator, _, _) = remediation_orchestrator(Arc::new(diag_mutator()));
        let plan = orchestrator.plan(&remediation_intent()).unwrap();
        let run = orchestrator.execute(&plan, &conversation()).await;
        encoded.push(serde_json::to_vec(&run.results()).unwrap());
    }
    assert_eq!(encoded[0], encoded[1]);
}

#[tokio::test]
async fn test_failed_auto_fix_under_continue_is_partial() {
    let mutator = Arc::new(diag_mutator().failing_apply("diag-dev-01"));
    let (orchestrator, _, _) = remediation_orchestrator(mutator.clone());

    let plan = orchestrator
        .plan(&remediation_intent().with_parameter("failure_policy", json!("continue")))
        .unwrap();
    let run = orchestrator.execute(&plan, &conversation()).await;

    assert_eq!(run.state, RunState::CompletedWithFailures);
    assert!(run.rollback.is_none());
    let record = run.step(&StepId::from("remediate")).unwrap();
    assert_eq!(record.state, StepState::PartiallySucceeded);

    let report = record.remediation.as_ref().unwrap();
    assert!(report.auto_executed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "tag-diag");
    assert_eq!(report.failed[0].kind, FailureKind::Rejected);
    assert_eq!(report.awaiting_confirmation.len(), 1);
    assert_eq!(report.delegated.len(), 1);
    assert!(mutator.applied().is_empty());
}

fn mutating_step(id: &str, capability: Capability, actions: serde_json::Value) -> Step {
    Step::new(id, capability)
        .with_action(StepAction::MutatingBatch)
        .with_input(json!({ "actions": actions }))
}

fn fail_fast_orchestrator(
    environment: Arc<MemoryMutator>,
    infrastructure: Arc<MemoryMutator>,
) -> (Orchestrator, Arc<SharedContextStore>) {
    let registry = WorkerRegistry::new()
        .with_worker(Arc::new(
            ScriptedWorker::new(Capability::Environment).with_mutator(environment),
        ))
        .with_worker(Arc::new(
            ScriptedWorker::new(Capability::Infrastructure).with_mutator(infrastructure),
        ));
    let store = Arc::new(SharedContextStore::new());
    (
        Orchestrator::new(registry, Arc::clone(&store), OrchestratorConfig::default()),
        store,
    )
}

fn fail_fast_plan() -> tessera_core::Plan {
    PlanBuilder::new(PlanKind::SequentialMultiCapability)
        .failure_policy(tessera_core::FailurePolicy::FailFast)
        .step(mutating_step(
            "environment",
            Capability::Environment,
            json!([{ "operation_id": "env-1", "resource": "app-config", "change": { "tier": "premium" } }]),
        ))
        .step(
            mutating_step(
                "infrastructure",
                Capability::Infrastructure,
                json!([
                    { "operation_id": "infra-1", "resource": "vm-a", "change": { "size": "D4" } },
                    { "operation_id": "infra-2", "resource": "nsg-locked", "change": { "rules": [] } }
                ]),
            )
            .depends_on("environment"),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_fail_fast_reverts_earlier_steps() {
    let environment = Arc::new(
        MemoryMutator::new().with_resource("app-config", json!({ "tier": "basic" })),
    );
    let infrastructure = Arc::new(
        MemoryMutator::new()
            .with_resource("vm-a", json!({ "size": "B2" }))
            .failing_apply("nsg-locked"),
    );
    let (orchestrator, store) = fail_fast_orchestrator(environment.clone(), infrastructure.clone());

    let run = orchestrator.execute(&fail_fast_plan(), &conversation()).await;

    assert_eq!(run.state, RunState::RolledBack);
    assert!(run.error().is_none());

    let env = run.step(&StepId::from("environment")).unwrap();
    assert_eq!(env.state, StepState::Succeeded);
    assert!(env.rolled_back);
    let infra = run.step(&StepId::from("infrastructure")).unwrap();
    assert_eq!(infra.state, StepState::Failed);
    assert_eq!(
        infra.result.as_ref().and_then(StepResult::failure_kind),
        Some(FailureKind::Rejected)
    );

    // The failed batch reverted itself; the run reverted the earlier step
    assert_eq!(infrastructure.state("vm-a"), json!({ "size": "B2" }));
    assert_eq!(environment.state("app-config"), json!({ "tier": "basic" }));
    assert_eq!(environment.restored(), vec!["app-config".to_string()]);

    let summary = run.rollback.as_ref().unwrap();
    assert_eq!(summary.reverted(), 1);
    assert!(summary.is_complete());
    assert!(!store.contains(&ContextKey::new(
        CONVERSATION,
        keys::snapshot_for("environment")
    )));

    let response = RunResponse::from_run(&run);
    assert!(!response.is_clean_success());
    assert!(response.text.starts_with("↩️ Run rolled back"));
}

#[tokio::test]
async fn test_incomplete_rollback_requires_manual_intervention() {
    let environment = Arc::new(
        MemoryMutator::new()
            .with_resource("app-config", json!({ "tier": "basic" }))
            .failing_restore("app-config"),
    );
    let infrastructure = Arc::new(MemoryMutator::new().failing_apply("nsg-locked"));
    let (orchestrator, store) = fail_fast_orchestrator(environment.clone(), infrastructure);

    let run = orchestrator.execute(&fail_fast_plan(), &conversation()).await;

    assert_eq!(run.state, RunState::RolledBack);
    assert!(run.is_rollback_incomplete());
    assert!(matches!(
        run.error(),
        Some(Error::RollbackIncomplete { ref unreverted }) if unreverted == &vec!["app-config".to_string()]
    ));
    assert_eq!(environment.state("app-config"), json!({ "tier": "premium" }));
    assert!(!run.step(&StepId::from("environment")).unwrap().rolled_back);

    // Snapshots stay in the store for manual restore
    assert!(store.contains(&ContextKey::new(
        CONVERSATION,
        keys::snapshot_for("environment")
    )));

    let response = RunResponse::from_run(&run);
    assert_eq!(response.manual_intervention, vec!["app-config".to_string()]);
    assert!(response.text.contains("Manual intervention required"));
    assert!(run.into_result().is_err());
}
