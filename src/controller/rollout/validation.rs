//! Runtime validation of `RolloutSpec` constraints that the CRD's OpenAPI
//! schema cannot express on its own (ordering, cross-field relationships).

use crate::crd::rollout::Rollout;

const MAX_STEP_INTERVAL_SECONDS: i64 = 24 * 60 * 60;

pub fn validate_rollout(rollout: &Rollout) -> Result<(), String> {
    let spec = &rollout.spec;

    if !spec.steps.is_empty() {
        let mut previous = 0;
        for (i, &step) in spec.steps.iter().enumerate() {
            if !(0..=100).contains(&step) {
                return Err(format!("spec.steps[{i}] must be 0-100, got {step}"));
            }
            if step <= previous {
                return Err(format!(
                    "spec.steps must be strictly increasing, step {i} ({step}) does not exceed the previous step ({previous})"
                ));
            }
            previous = step;
        }
        if *spec.steps.last().expect("checked non-empty above") != 100 {
            return Err("spec.steps must end at 100".to_string());
        }
    }

    if spec.step_interval_seconds < 0 || spec.step_interval_seconds > MAX_STEP_INTERVAL_SECONDS {
        return Err(format!(
            "spec.stepIntervalSeconds must be in [0, {MAX_STEP_INTERVAL_SECONDS}], got {}",
            spec.step_interval_seconds
        ));
    }

    if spec.slo.p95_max_ms < 0.0 {
        return Err("spec.slo.p95MaxMs must be >= 0".to_string());
    }
    if !(0.0..=1.0).contains(&spec.slo.error_rate_max) && spec.slo.error_rate_max != 0.0 {
        return Err("spec.slo.errorRateMax must be 0 (disabled) or in [0, 1]".to_string());
    }
    if !(0.0..=100.0).contains(&spec.abort.min_error_budget_percent) {
        return Err("spec.abort.minErrorBudgetPercent must be in [0, 100]".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::rollout::{AbortConfig, RolloutSpec, SloConfig};

    fn valid_rollout() -> Rollout {
        Rollout::new(
            "payments",
            RolloutSpec {
                target_ref: "payments".to_string(),
                stable_handle: "payments-stable".to_string(),
                canary_handle: "payments-canary".to_string(),
                steps: vec![10, 50, 100],
                step_interval_seconds: 30,
                slo: SloConfig::default(),
                abort: AbortConfig::default(),
            },
        )
    }

    #[test]
    fn accepts_well_formed_spec() {
        assert!(validate_rollout(&valid_rollout()).is_ok());
    }

    #[test]
    fn accepts_empty_steps_deferring_to_defaults() {
        let mut rollout = valid_rollout();
        rollout.spec.steps = vec![];
        assert!(validate_rollout(&rollout).is_ok());
    }

    #[test]
    fn rejects_non_increasing_steps() {
        let mut rollout = valid_rollout();
        rollout.spec.steps = vec![50, 50, 100];
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn rejects_steps_not_ending_at_100() {
        let mut rollout = valid_rollout();
        rollout.spec.steps = vec![10, 50];
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn rejects_step_out_of_range() {
        let mut rollout = valid_rollout();
        rollout.spec.steps = vec![10, 150];
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn rejects_negative_step_interval() {
        let mut rollout = valid_rollout();
        rollout.spec.step_interval_seconds = -1;
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn rejects_excessive_step_interval() {
        let mut rollout = valid_rollout();
        rollout.spec.step_interval_seconds = MAX_STEP_INTERVAL_SECONDS + 1;
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn rejects_error_rate_max_outside_unit_interval() {
        let mut rollout = valid_rollout();
        rollout.spec.slo.error_rate_max = 1.5;
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn zero_error_rate_max_is_valid_as_disabled() {
        let mut rollout = valid_rollout();
        rollout.spec.slo.error_rate_max = 0.0;
        assert!(validate_rollout(&rollout).is_ok());
    }

    #[test]
    fn rejects_min_error_budget_percent_out_of_range() {
        let mut rollout = valid_rollout();
        rollout.spec.abort.min_error_budget_percent = 150.0;
        assert!(validate_rollout(&rollout).is_err());
    }
}
