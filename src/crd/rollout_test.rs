use super::*;

fn minimal_spec() -> RolloutSpec {
    RolloutSpec {
        target_ref: "payments".to_string(),
        stable_handle: "payments-stable".to_string(),
        canary_handle: "payments-canary".to_string(),
        steps: vec![10, 50, 100],
        step_interval_seconds: 30,
        slo: SloConfig::default(),
        abort: AbortConfig::default(),
    }
}

#[test]
fn spec_round_trips_through_json_with_camel_case_fields() {
    let spec = minimal_spec();
    let value = serde_json::to_value(&spec).expect("serialize");

    assert_eq!(value["targetRef"], "payments");
    assert_eq!(value["stableHandle"], "payments-stable");
    assert_eq!(value["stepIntervalSeconds"], 30);

    let round_tripped: RolloutSpec = serde_json::from_value(value).expect("deserialize");
    assert_eq!(round_tripped.target_ref, spec.target_ref);
    assert_eq!(round_tripped.steps, spec.steps);
}

#[test]
fn spec_missing_optional_sections_defaults_to_empty() {
    let json = serde_json::json!({
        "targetRef": "payments",
    });
    let spec: RolloutSpec = serde_json::from_value(json).expect("deserialize");

    assert_eq!(spec.stable_handle, "");
    assert_eq!(spec.canary_handle, "");
    assert!(spec.steps.is_empty());
    assert_eq!(spec.step_interval_seconds, 0);
    assert_eq!(spec.slo.p95_max_ms, 0.0);
    assert_eq!(spec.abort.min_error_budget_percent, 0.0);
}

#[test]
fn status_phase_none_serializes_without_key() {
    let status = RolloutStatus::default();
    let value = serde_json::to_value(&status).expect("serialize");
    assert!(value.get("phase").is_none());
}

#[test]
fn status_round_trips_with_observed_generation() {
    let status = RolloutStatus {
        phase: Some(Phase::Progressing),
        current_step_index: 1,
        current_weight: 50,
        last_transition: Some("2026-01-01T00:00:00Z".to_string()),
        message: Some("Advanced to step 1 (50% traffic)".to_string()),
        p95_ms: 42.0,
        error_rate: 0.001,
        error_budget_remaining: 80.0,
        observed_generation: 3,
    };

    let value = serde_json::to_value(&status).expect("serialize");
    assert_eq!(value["observedGeneration"], 3);
    assert_eq!(value["currentWeight"], 50);

    let round_tripped: RolloutStatus = serde_json::from_value(value).expect("deserialize");
    assert_eq!(round_tripped, status);
}

#[test]
fn terminal_phases_are_sticky_by_classification() {
    assert!(Phase::Succeeded.is_terminal());
    assert!(Phase::Failed.is_terminal());
    assert!(!Phase::Pending.is_terminal());
    assert!(!Phase::Progressing.is_terminal());
}

#[test]
fn phase_serializes_as_plain_string_variant() {
    let value = serde_json::to_value(Phase::Progressing).expect("serialize");
    assert_eq!(value, serde_json::json!("Progressing"));
}
