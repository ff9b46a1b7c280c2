use super::*;
use crate::capability::Capability;

#[test]
fn test_planning_error_is_ambiguous_request() {
    let error = Error::Planning(PlanningError::UnknownCapability("billing".to_string()));

    let msg = error.user_message();
    assert!(msg.contains("ambiguous"));
    assert!(msg.contains("billing"));
    assert!(error.is_fatal());
}

#[test]
fn test_rollback_incomplete_requires_manual_action() {
    let error = Error::RollbackIncomplete {
        unreverted: vec!["vnet-prod-01".to_string(), "nsg-web".to_string()],
    };

    let msg = error.user_message();
    assert!(msg.contains("2 resource(s)"));
    assert!(msg.contains("vnet-prod-01"));

    let suggestion = error.suggestion().unwrap();
    assert!(suggestion.contains("Manual intervention"));
    assert!(error.is_fatal());
}

#[test]
fn test_context_too_large_prompts_simplification() {
    let error = Error::ContextTooLarge {
        required: 12_000,
        budget: 8_000,
    };

    let output = format_error_for_chat(&error);
    assert!(output.contains("12000"));
    assert!(output.contains("Simplify"));
}

#[test]
fn test_transient_step_failure_is_not_fatal() {
    let error = Error::StepFailure {
        kind: FailureKind::Unavailable,
        message: "compliance api returned 503".to_string(),
    };
    assert!(!error.is_fatal());
    assert!(error.suggestion().is_some());

    let rejected = Error::StepFailure {
        kind: FailureKind::Rejected,
        message: "bad request".to_string(),
    };
    assert!(rejected.is_fatal());
    assert!(rejected.suggestion().is_none());
}

#[test]
fn test_format_error_for_cli() {
    let error = Error::Planning(PlanningError::CapabilityNotAvailable(Capability::Cost));

    let output = format_error_for_cli(&error);
    assert!(output.contains("cost"));
    assert!(output.contains("Rephrase"));
}
