use super::*;
use crate::context::{ContextKey, SharedContextStore};
use crate::worker::{FailureKind, StepResult};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// In-memory resources with scripted failures
#[derive(Default)]
struct ScriptedMutator {
    state: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
    fail_capture: BTreeSet<String>,
    fail_apply: BTreeSet<String>,
    fail_restore: BTreeSet<String>,
    journal: Option<(Arc<SharedContextStore>, ContextKey)>,
    journaled_before_apply: Mutex<Vec<bool>>,
}

impl ScriptedMutator {
    fn with_resources(names: &[&str]) -> Self {
        let state = names
            .iter()
            .map(|n| ((*n).to_string(), json!({"version": 0})))
            .collect();
        Self {
            state: Mutex::new(state),
            ..Default::default()
        }
    }

    fn state_of(&self, resource: &str) -> Value {
        self.state.lock().unwrap()[resource].clone()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mutator for ScriptedMutator {
    async fn capture(&self, action: &MutatingAction) -> Result<Value, RollbackError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("capture:{}", action.operation_id));
        if self.fail_capture.contains(&action.operation_id) {
            return Err(RollbackError::Capture {
                resource: action.resource.clone(),
                message: "read denied".to_string(),
            });
        }
        Ok(self.state_of(&action.resource))
    }

    async fn apply(&self, action: &MutatingAction) -> Result<Value, RollbackError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("apply:{}", action.operation_id));
        if let Some((store, key)) = &self.journal {
            let persisted: RollbackSnapshot = store
                .get(key)
                .map(|e| serde_json::from_value(e.value).unwrap())
                .unwrap_or_default();
            let covered = persisted
                .entries()
                .iter()
                .any(|e| e.operation_id == action.operation_id);
            self.journaled_before_apply.lock().unwrap().push(covered);
        }
        if self.fail_apply.contains(&action.operation_id) {
            return Err(RollbackError::Apply {
                operation_id: action.operation_id.clone(),
                kind: FailureKind::Rejected,
                message: "conflict".to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .insert(action.resource.clone(), action.change.clone());
        Ok(action.change.clone())
    }

    async fn restore(&self, entry: &SnapshotEntry) -> Result<(), RollbackError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("restore:{}", entry.operation_id));
        if self.fail_restore.contains(&entry.operation_id) {
            return Err(RollbackError::Restore {
                resource: entry.resource.clone(),
                message: "resource locked".to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .insert(entry.resource.clone(), entry.prior_state.clone());
        Ok(())
    }
}

fn actions(n: usize) -> Vec<MutatingAction> {
    (1..=n)
        .map(|i| {
            MutatingAction::new(format!("op-{}", i), format!("res-{}", i), json!({"version": i}))
        })
        .collect()
}

fn resources(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("res-{}", i)).collect()
}

fn journal() -> (Arc<SharedContextStore>, ContextSnapshotJournal) {
    let store = Arc::new(SharedContextStore::new());
    let key = ContextKey::new("conv-1", crate::context::keys::snapshot_for("remediate"));
    (Arc::clone(&store), ContextSnapshotJournal::new(store, key))
}

#[tokio::test]
async fn test_all_actions_applied() {
    let mutator = ScriptedMutator::with_resources(&["res-1", "res-2", "res-3"]);
    let (store, journal) = journal();

    let result = BatchExecutor::new(&mutator, &journal)
        .execute(&actions(3), RollbackPolicy::RollbackOnFirstFailure)
        .await;

    assert_eq!(result.status, BatchStatus::AllApplied);
    assert_eq!(result.applied, vec!["op-1", "op-2", "op-3"]);
    assert_eq!(result.snapshots.len(), 3);
    assert!(store.contains(journal.key()));
    assert_eq!(mutator.state_of("res-2"), json!({"version": 2}));
    assert!(result.to_step_result().is_success());
}

#[tokio::test]
async fn test_snapshot_persisted_before_each_apply() {
    let (store, journal) = journal();
    let mut mutator = ScriptedMutator::with_resources(&["res-1", "res-2"]);
    mutator.journal = Some((store, journal.key().clone()));

    BatchExecutor::new(&mutator, &journal)
        .execute(&actions(2), RollbackPolicy::ContinueOnFailure)
        .await;

    assert_eq!(*mutator.journaled_before_apply.lock().unwrap(), vec![true, true]);
}

#[tokio::test]
async fn test_first_failure_reverts_in_reverse_order() {
    let mut mutator = ScriptedMutator::with_resources(&["res-1", "res-2", "res-3", "res-4"]);
    mutator.fail_apply.insert("op-3".to_string());
    let (store, journal) = journal();

    let result = BatchExecutor::new(&mutator, &journal)
        .execute(&actions(4), RollbackPolicy::RollbackOnFirstFailure)
        .await;

    assert_eq!(result.status, BatchStatus::RolledBack);
    assert!(result.applied.is_empty());
    assert_eq!(result.failed[0].item, "op-3");
    assert_eq!(
        mutator.calls(),
        vec![
            "capture:op-1",
            "apply:op-1",
            "capture:op-2",
            "apply:op-2",
            "capture:op-3",
            "apply:op-3",
            "restore:op-2",
            "restore:op-1",
        ]
    );
    for resource in ["res-1", "res-2", "res-3", "res-4"] {
        assert_eq!(mutator.state_of(resource), json!({"version": 0}));
    }
    assert!(!store.contains(journal.key()));

    match result.to_step_result() {
        StepResult::Failure { kind, message } => {
            assert_eq!(kind, FailureKind::Rejected);
            assert!(message.contains("2 applied action(s) rolled back"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_revert_reports_rollback_incomplete() {
    let mut mutator = ScriptedMutator::with_resources(&["res-1", "res-2", "res-3"]);
    mutator.fail_apply.insert("op-3".to_string());
    mutator.fail_restore.insert("op-1".to_string());
    let (store, journal) = journal();

    let result = BatchExecutor::new(&mutator, &journal)
        .execute(&actions(3), RollbackPolicy::RollbackOnFirstFailure)
        .await;

    assert_eq!(result.status, BatchStatus::RollbackIncomplete);
    assert_eq!(result.unreverted(), vec!["res-1"]);
    assert_eq!(result.applied, vec!["op-1"]);
    assert_eq!(result.rolled_back.len(), 2);
    assert!(result.rolled_back[0].reverted);
    assert!(!result.rolled_back[1].reverted);
    assert_eq!(mutator.state_of("res-2"), json!({"version": 0}));
    assert!(store.contains(journal.key()));
}

#[tokio::test]
async fn test_continue_on_failure_is_partial_success() {
    let mut mutator = ScriptedMutator::with_resources(&["res-1", "res-2", "res-3"]);
    mutator.fail_apply.insert("op-2".to_string());
    let (_store, journal) = journal();

    let result = BatchExecutor::new(&mutator, &journal)
        .execute(&actions(3), RollbackPolicy::ContinueOnFailure)
        .await;

    assert_eq!(result.status, BatchStatus::PartialSuccess);
    assert_eq!(result.applied, vec!["op-1", "op-3"]);
    assert!(result.rolled_back.is_empty());
    match result.to_step_result() {
        StepResult::PartialSuccess {
            succeeded, failed, ..
        } => {
            assert_eq!(succeeded, vec!["op-1", "op-3"]);
            assert_eq!(failed, vec!["op-2"]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_capture_failure_skips_apply() {
    let mut mutator = ScriptedMutator::with_resources(&["res-1"]);
    mutator.fail_capture.insert("op-1".to_string());
    let (_store, journal) = journal();

    let result = BatchExecutor::new(&mutator, &journal)
        .execute(&actions(1), RollbackPolicy::ContinueOnFailure)
        .await;

    assert_eq!(mutator.calls(), vec!["capture:op-1"]);
    assert_eq!(
        result.to_step_result().failure_kind(),
        Some(FailureKind::InternalError)
    );
}

#[tokio::test]
async fn test_revert_keeps_unreverted_entries() {
    let mut mutator = ScriptedMutator::with_resources(&["res-1", "res-2"]);
    mutator.fail_restore.insert("op-2".to_string());

    let mut snapshot = RollbackSnapshot::new();
    for (op, res) in [("op-1", "res-1"), ("op-2", "res-2")] {
        snapshot.push(SnapshotEntry {
            operation_id: op.to_string(),
            resource: res.to_string(),
            prior_state: json!({"version": -1}),
            captured_at: chrono::Utc::now(),
        });
    }

    let outcomes = revert(&mutator, &mut snapshot).await;
    assert_eq!(outcomes[0].operation_id, "op-2");
    assert!(!outcomes[0].reverted);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.entries()[0].operation_id, "op-2");
}

proptest! {
    #[test]
    fn prop_rollback_on_first_failure_never_leaves_silent_partial_apply(
        n in 1usize..8,
        fail_at in 0usize..8,
        restore_failures in proptest::collection::btree_set(1usize..8, 0..3),
    ) {
        let fail_at = fail_at % n + 1;
        let mut mutator = ScriptedMutator::with_resources(
            &resources(n).iter().map(String::as_str).collect::<Vec<_>>(),
        );
        mutator.fail_apply.insert(format!("op-{}", fail_at));
        mutator.fail_restore = restore_failures.iter().map(|i| format!("op-{}", i)).collect();
        let (_store, journal) = journal();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = runtime.block_on(
            BatchExecutor::new(&mutator, &journal)
                .execute(&actions(n), RollbackPolicy::RollbackOnFirstFailure),
        );

        match result.status {
            BatchStatus::RolledBack => {
                for resource in resources(n) {
                    prop_assert_eq!(mutator.state_of(&resource), json!({"version": 0}));
                }
            }
            BatchStatus::RollbackIncomplete => {
                prop_assert!(!result.unreverted().is_empty());
            }
            other => prop_assert!(false, "unexpected status {:?}", other),
        }
        // actions after the failed one are never started
        let next_capture = format!("capture:op-{}", fail_at + 1);
        prop_assert!(!mutator.calls().iter().any(|c| c == &next_capture));
    }
}
