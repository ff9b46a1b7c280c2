use super::types::OrchestratorEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;
use uuid::Uuid;

/// Broadcast channel carrying the lifecycle events of every run.
///
/// Slow subscribers miss events (lagged) rather than blocking the scheduler.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` unread events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to the events of every run
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Follow the run that executes `plan_id`.
    ///
    /// Subscribe before calling `execute` so the `RunStarted` event is seen.
    #[must_use]
    pub fn follow_plan(&self, plan_id: Uuid) -> RunSubscription {
        RunSubscription {
            receiver: self.sender.subscribe(),
            plan_id,
            run_id: None,
            finished: false,
        }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: OrchestratorEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Events of a single run, identified by the plan it executes
#[derive(Debug)]
pub struct RunSubscription {
    receiver: broadcast::Receiver<OrchestratorEvent>,
    plan_id: Uuid,
    run_id: Option<Uuid>,
    finished: bool,
}

impl RunSubscription {
    /// Run being followed, once its `RunStarted` event has arrived
    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Next event of the followed run.
    ///
    /// Returns `None` after `RunFinished` or when the bus is dropped. Events
    /// of other runs are skipped. Lagged events are lost with a warning, and
    /// a lag before `RunStarted` ends the subscription.
    pub async fn recv(&mut self) -> Option<OrchestratorEvent> {
        if self.finished {
            return None;
        }
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(plan_id = %self.plan_id, skipped, "Run subscription lagged");
                    if self.run_id.is_none() {
                        // The run's start may be among the lost events
                        self.finished = true;
                        return None;
                    }
                    continue;
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            };

            match (&event, self.run_id) {
                (OrchestratorEvent::RunStarted { run_id, plan_id, .. }, None)
                    if *plan_id == self.plan_id =>
                {
                    self.run_id = Some(*run_id);
                }
                (_, Some(run_id)) if event.run_id() == run_id => {}
                _ => continue,
            }

            if matches!(event, OrchestratorEvent::RunFinished { .. }) {
                self.finished = true;
            }
            return Some(event);
        }
    }
}
