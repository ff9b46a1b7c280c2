use super::*;
use crate::plan::StepId;
use crate::risk::{
    classify_candidate, ChangeType, ClassifiedCandidate, EnvironmentTier, RemediationCandidate,
    ResourceKind,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn classified(id: &str) -> ClassifiedCandidate {
    classify_candidate(RemediationCandidate {
        id: id.to_string(),
        finding: "storage-https-only".to_string(),
        resource_id: format!("sa-{}", id),
        resource_kind: ResourceKind::Storage,
        environment: EnvironmentTier::Staging,
        change: ChangeType::Property,
        dependency_count: 0,
        automatable: true,
        proposed_fix: serde_json::json!({"https_only": true}),
    })
    .unwrap()
}

fn request(run_id: Uuid, id: &str, timeout_secs: i64) -> ConfirmationRequest {
    ConfirmationRequest::new(
        run_id,
        StepId::from("remediate"),
        "conv-1",
        &classified(id),
        timeout_secs,
    )
}

#[tokio::test]
async fn test_submit_and_approve() {
    let queue = ApprovalQueue::new();
    let run_id = Uuid::new_v4();
    let req = request(run_id, "c1", 60);
    let id = req.id;

    queue.submit(req).await.unwrap();
    assert_eq!(queue.pending_for_run(run_id).await.len(), 1);

    let resolved = queue.approve_by(id, "alice").await.unwrap();
    assert_eq!(resolved.status, ConfirmationStatus::Approved);
    assert_eq!(resolved.responder_id.as_deref(), Some("alice"));
    assert!(queue.pending().await.is_empty());

    assert_eq!(
        queue.reject_by(id, "bob").await.unwrap_err(),
        ApprovalError::NotPending
    );
}

#[tokio::test]
async fn test_unknown_request() {
    let queue = ApprovalQueue::new();
    assert_eq!(
        queue.approve_by(Uuid::new_v4(), "alice").await.unwrap_err(),
        ApprovalError::NotFound
    );
}

#[tokio::test]
async fn test_expired_request_becomes_rejected() {
    let queue = ApprovalQueue::new();
    let req = request(Uuid::new_v4(), "c1", -1);
    let id = req.id;
    queue.submit(req).await.unwrap();

    assert!(queue.pending().await.is_empty());
    assert_eq!(queue.expire_stale().await, 1);
    assert_eq!(
        queue.get(id).await.unwrap().status,
        ConfirmationStatus::Rejected
    );
    assert_eq!(
        queue.approve_by(id, "alice").await.unwrap_err(),
        ApprovalError::NotPending
    );
}

#[test]
fn test_request_carries_assessment() {
    let req = request(Uuid::nil(), "c1", 60);
    assert_eq!(req.assessment.score, 45);
    assert_eq!(req.candidate.id, "c1");
    assert!(req.is_pending());
}

fn no_retention() -> ApprovalQueueConfig {
    ApprovalQueueConfig {
        retention_secs: 0,
        sweep_interval_secs: 1,
    }
}

#[tokio::test]
async fn test_cleanup_drops_settled_requests_past_retention() {
    let queue = ApprovalQueue::with_config(&no_retention());
    let run_id = Uuid::new_v4();
    let approved = request(run_id, "approved", 60);
    let stale = request(run_id, "stale", -1);
    let waiting = request(run_id, "waiting", 60);
    let (approved_id, stale_id, waiting_id) = (approved.id, stale.id, waiting.id);
    for req in [approved, stale, waiting] {
        queue.submit(req).await.unwrap();
    }
    queue.approve_by(approved_id, "alice").await.unwrap();

    assert_eq!(queue.cleanup_expired().await, 2);
    assert!(queue.get(approved_id).await.is_none());
    assert!(queue.get(stale_id).await.is_none());
    assert!(queue.get(waiting_id).await.unwrap().is_pending());
    assert_eq!(queue.request_count().await, 1);
}

#[tokio::test]
async fn test_cleanup_keeps_settled_requests_within_retention() {
    let queue = ApprovalQueue::new();
    let req = request(Uuid::new_v4(), "c1", 60);
    let id = req.id;
    queue.submit(req).await.unwrap();
    queue.reject_by(id, "bob").await.unwrap();

    assert_eq!(queue.cleanup_expired().await, 0);
    assert_eq!(
        queue.get(id).await.unwrap().status,
        ConfirmationStatus::Rejected
    );
}

#[tokio::test]
async fn test_sweeper_purges_until_cancelled() {
    let queue = Arc::new(ApprovalQueue::with_config(&no_retention()));
    let req = request(Uuid::new_v4(), "c1", -1);
    queue.submit(req).await.unwrap();

    let cancel = CancellationToken::new();
    let handle = spawn_approval_sweeper(Arc::clone(&queue), no_retention(), cancel.clone());

    // The first tick fires immediately
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(queue.request_count().await, 0);

    cancel.cancel();
    handle.await.unwrap();
}
