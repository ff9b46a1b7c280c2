use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{ApprovalError, ApprovalQueueConfig, ConfirmationRequest, ConfirmationStatus};
use super::ApprovalGate;

/// Retention beyond this is treated as "keep forever"
const MAX_RETENTION_SECS: u64 = 100 * 365 * 24 * 3600;

/// In-memory approval gate
pub struct ApprovalQueue {
    requests: RwLock<HashMap<Uuid, ConfirmationRequest>>,
    /// How long settled requests are kept
    retention: chrono::Duration,
}

impl Default for ApprovalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalQueue {
    /// Create a queue that keeps settled requests for an hour
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ApprovalQueueConfig::default())
    }

    /// Create with custom retention
    #[must_use]
    pub fn with_config(config: &ApprovalQueueConfig) -> Self {
        let retention_secs = config.retention_secs.min(MAX_RETENTION_SECS) as i64;
        Self {
            requests: RwLock::new(HashMap::new()),
            retention: chrono::Duration::seconds(retention_secs),
        }
    }

    /// Number of requests held, settled or not
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Get a request by ID
    pub async fn get(&self, id: Uuid) -> Option<ConfirmationRequest> {
        self.requests.read().await.get(&id).cloned()
    }

    /// All pending requests, oldest first
    pub async fn pending(&self) -> Vec<ConfirmationRequest> {
        let requests = self.requests.read().await;
        let mut pending: Vec<_> = requests.values().filter(|r| r.is_pending()).cloned().collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// Pending requests of one run
    pub async fn pending_for_run(&self, run_id: Uuid) -> Vec<ConfirmationRequest> {
        self.pending()
            .await
            .into_iter()
            .filter(|r| r.run_id == run_id)
            .collect()
    }

    /// Approve a request
    pub async fn approve_by(
        &self,
        id: Uuid,
        responder_id: &str,
    ) -> Result<ConfirmationRequest, ApprovalError> {
        self.resolve(id, ConfirmationStatus::Approved, responder_id)
            .await
    }

    /// Reject a request
    pub async fn reject_by(
        &self,
        id: Uuid,
        responder_id: &str,
    ) -> Result<ConfirmationRequest, ApprovalError> {
        self.resolve(id, ConfirmationStatus::Rejected, responder_id)
            .await
    }

    async fn resolve(
        &self,
        id: Uuid,
        decision: ConfirmationStatus,
        responder_id: &str,
    ) -> Result<ConfirmationRequest, ApprovalError> {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(&id).ok_or(ApprovalError::NotFound)?;
        if !request.resolve(decision, responder_id) {
            return Err(ApprovalError::NotPending);
        }
        info!(request_id = %id, candidate = %request.candidate.id, ?decision, "Confirmation resolved");
        Ok(request.clone())
    }

    /// Mark expired requests rejected. Returns how many expired.
    pub async fn expire_stale(&self) -> usize {
        let mut requests = self.requests.write().await;
        let mut expired = 0;
        for request in requests.values_mut() {
            if request.status == ConfirmationStatus::Pending && request.is_expired() {
                request.expire();
                expired += 1;
            }
        }
        expired
    }

    /// Expire stale requests, then drop settled ones older than the
    /// retention window. Pending requests are never dropped. Returns how
    /// many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let expired = self.expire_stale().await;
        let cutoff = Utc::now() - self.retention;

        let mut requests = self.requests.write().await;
        let initial_count = requests.len();
        requests.retain(|_, r| r.settled_at().map_or(true, |at| at > cutoff));
        let removed = initial_count - requests.len();
        if expired > 0 || removed > 0 {
            debug!(expired, removed, "Approval queue swept");
        }
        removed
    }
}

/// Periodically expire and purge confirmation requests until `cancel` fires
pub fn spawn_approval_sweeper(
    queue: Arc<ApprovalQueue>,
    config: ApprovalQueueConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(config.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Approval sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = queue.cleanup_expired().await;
                    if removed > 0 {
                        info!(count = removed, "Purged settled confirmation requests");
                    }
                }
            }
        }
    })
}

#[async_trait::async_trait]
impl ApprovalGate for ApprovalQueue {
    async fn submit(&self, request: ConfirmationRequest) -> Result<(), ApprovalError> {
        debug!(request_id = %request.id, candidate = %request.candidate.id, "Confirmation queued");
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }
}
