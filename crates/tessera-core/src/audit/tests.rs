use super::*;
use crate::capability::Capability;
use crate::plan::StepId;
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_content_hash_is_stable_sha256_hex() {
    let a = content_hash(&json!({"region": "westeurope"}));
    let b = content_hash(&json!({"region": "westeurope"}));
    let c = content_hash(&json!({"region": "northeurope"}));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
}

#[test]
fn test_event_carries_hash_not_payload() {
    let payload = json!({"secret_inventory": ["vm-1", "vm-2"]});
    let event = AuditEvent::new(Uuid::nil(), AuditEventKind::StepCompleted)
        .with_step(StepId::from("discovery"), Capability::Discovery)
        .with_payload(&payload)
        .with_status("success");

    let line = serde_json::to_string(&event).unwrap();
    assert!(!line.contains("vm-1"));
    assert!(line.contains(&content_hash(&payload)));
    assert!(line.contains("\"kind\":\"step_completed\""));
}

#[tokio::test]
async fn test_memory_sink_tracks_flush() {
    let sink = MemoryAuditSink::new();
    sink.append(AuditEvent::new(Uuid::nil(), AuditEventKind::RunStarted))
        .await
        .unwrap();
    assert_eq!(sink.flushed().await, 0);

    sink.flush().await.unwrap();
    assert_eq!(sink.events().await.len(), 1);
    assert_eq!(sink.flushed().await, 1);
}

#[tokio::test]
async fn test_jsonl_sink_appends_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("runs.jsonl");
    let run_id = Uuid::new_v4();

    let sink = JsonlAuditSink::open(&path).await.unwrap();
    sink.append(AuditEvent::new(run_id, AuditEventKind::RunStarted))
        .await
        .unwrap();
    sink.append(AuditEvent::new(run_id, AuditEventKind::RunFinished).with_status("completed"))
        .await
        .unwrap();
    sink.flush().await.unwrap();
    drop(sink);

    // reopening appends rather than truncating
    let sink = JsonlAuditSink::open(&path).await.unwrap();
    sink.append(AuditEvent::new(run_id, AuditEventKind::RunStarted))
        .await
        .unwrap();
    sink.flush().await.unwrap();

    let contents = tokio::fs::read_to_string(sink.path()).await.unwrap();
    let events: Vec<AuditEvent> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].status.as_deref(), Some("completed"));
    assert!(events.iter().all(|e| e.run_id == run_id));
}
