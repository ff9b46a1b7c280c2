use super::*;
use crate::orchestrator::RunState;
use crate::plan::StepId;
use uuid::Uuid;

#[tokio::test]
async fn test_publish_subscribe() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let run_id = Uuid::new_v4();
    bus.publish(OrchestratorEvent::RunStarted {
        run_id,
        plan_id: Uuid::nil(),
        conversation_id: "conv-1".to_string(),
        steps: 2,
    });

    let event = rx.recv().await.unwrap();
    assert_eq!(event.run_id(), run_id);
    match event {
        OrchestratorEvent::RunStarted { steps, .. } => assert_eq!(steps, 2),
        _ => panic!("unexpected event type"),
    }
}

#[tokio::test]
async fn test_multiple_subscribers() {
    let bus = EventBus::new(16);
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    let run_id = Uuid::new_v4();
    let count = bus.publish(OrchestratorEvent::RunFinished {
        run_id,
        state: RunState::Completed,
    });
    assert_eq!(count, 2);
    assert_eq!(rx1.recv().await.unwrap().run_id(), run_id);
    assert_eq!(rx2.recv().await.unwrap().run_id(), run_id);
}

#[test]
fn test_publish_without_subscribers() {
    let bus = EventBus::default();
    let delivered = bus.publish(OrchestratorEvent::RunCancelled {
        run_id: Uuid::nil(),
        cancelled_steps: 1,
    });
    assert_eq!(delivered, 0);
}

#[test]
fn test_event_serialization() {
    let event = OrchestratorEvent::StepSkipped {
        run_id: Uuid::nil(),
        step_id: StepId::from("assess"),
        failed_dependencies: vec![StepId::from("discover")],
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"type\":\"step_skipped\""));
    assert!(json.contains("\"step_id\":\"assess\""));
}

fn started(run_id: Uuid, plan_id: Uuid) -> OrchestratorEvent {
    OrchestratorEvent::RunStarted {
        run_id,
        plan_id,
        conversation_id: "conv-1".to_string(),
        steps: 1,
    }
}

fn finished(run_id: Uuid) -> OrchestratorEvent {
    OrchestratorEvent::RunFinished {
        run_id,
        state: RunState::Completed,
    }
}

#[tokio::test]
async fn test_follow_plan_yields_only_its_run() {
    let bus = EventBus::new(16);
    let plan_id = Uuid::new_v4();
    let mut followed = bus.follow_plan(plan_id);

    let (ours, other) = (Uuid::new_v4(), Uuid::new_v4());
    bus.publish(started(other, Uuid::new_v4()));
    bus.publish(started(ours, plan_id));
    bus.publish(OrchestratorEvent::StepSkipped {
        run_id: other,
        step_id: StepId::from("assess"),
        failed_dependencies: vec![],
    });
    bus.publish(finished(other));
    bus.publish(finished(ours));

    let first = followed.recv().await.unwrap();
    assert!(matches!(first, OrchestratorEvent::RunStarted { .. }));
    assert_eq!(followed.run_id(), Some(ours));

    let last = followed.recv().await.unwrap();
    assert_eq!(last.run_id(), ours);
    assert!(matches!(last, OrchestratorEvent::RunFinished { .. }));
    assert!(followed.recv().await.is_none());
}

#[tokio::test]
async fn test_follow_plan_ends_when_bus_is_dropped() {
    let bus = EventBus::new(4);
    let mut followed = bus.follow_plan(Uuid::new_v4());
    drop(bus);
    assert!(followed.recv().await.is_none());
    assert!(followed.run_id().is_none());
}

#[tokio::test]
async fn test_lag_before_run_start_ends_subscription() {
    let bus = EventBus::new(1);
    let plan_id = Uuid::new_v4();
    let mut followed = bus.follow_plan(plan_id);

    let run_id = Uuid::new_v4();
    bus.publish(started(run_id, plan_id));
    bus.publish(finished(run_id));

    assert!(followed.recv().await.is_none());
    assert!(followed.recv().await.is_none());
}
