//! Force bounds handed to the solver, with optional rate limiting.
//!
//! Absolute bounds (`maxForce` / `minForce`) are broadcast to every axis.
//! `maxForceVariation` turns the bounds into a band around the last applied
//! force: a bound is re-centered to `force ± Δ` when it was never supplied,
//! or when it lies `Δ` or more away from the current force.

use crate::types::{ActuatorState, ForcePointActuatorConfig};
use tracing::warn;

/// Activate the bounds implied by the configuration, then compute them.
///
/// Rate limiting needs both a floor and a ceiling, so a variation activates
/// both bounds even when no absolute limit is configured.
pub fn init_limit(state: &mut ActuatorState, config: &ForcePointActuatorConfig) {
    let rate_limited = config.max_force_variation.is_some();
    state.has_lambda_max = config.max_force.is_some() || rate_limited;
    state.has_lambda_min = config.min_force.is_some() || rate_limited;

    update_limit(state, config);
}

/// Refresh `lambda_min` / `lambda_max` from the configuration and the
/// current force.
///
/// Order matters: the absolute broadcast overwrites any band computed on the
/// previous call, and the band then overrides an absolute bound only when
/// that bound is unset or already `Δ` away from the force.
pub fn update_limit(state: &mut ActuatorState, config: &ForcePointActuatorConfig) {
    if let Some(max) = config.max_force {
        state.lambda_max.fill(max);
    }

    if let Some(min) = config.min_force {
        state.lambda_min.fill(min);
    }

    if let Some(delta) = config.max_force_variation {
        let axes = state
            .lambda_min
            .iter_mut()
            .zip(state.lambda_max.iter_mut())
            .zip(state.force.iter());

        for ((lo, hi), &force) in axes {
            if (*lo - force).abs() >= delta || config.min_force.is_none() {
                *lo = force - delta;
            }
            if (*hi - force).abs() >= delta || config.max_force.is_none() {
                *hi = force + delta;
            }
        }
    }

    if !bounds_are_ordered(state) {
        warn!(
            lambda_min = ?state.lambda_min,
            lambda_max = ?state.lambda_max,
            force = ?state.force,
            "actuator bounds are crossed; the solver will see an infeasible box"
        );
    }
}

/// `lambda_min[j] <= lambda_max[j]` on every axis where both bounds are
/// active.  Trivially true when either bound is inactive.
pub fn bounds_are_ordered(state: &ActuatorState) -> bool {
    if !(state.has_lambda_min && state.has_lambda_max) {
        return true;
    }
    state
        .lambda_min
        .iter()
        .zip(&state.lambda_max)
        .all(|(lo, hi)| lo <= hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state_with_force(force: Vec<f64>) -> ActuatorState {
        let dimension = force.len();
        ActuatorState {
            dimension,
            force,
            lambda_min: vec![0.0; dimension],
            lambda_max: vec![0.0; dimension],
            lambda_init: vec![0.0; dimension],
            ..Default::default()
        }
    }

    #[test]
    fn absolute_bounds_are_broadcast() {
        let config = ForcePointActuatorConfig {
            max_force: Some(4.0),
            min_force: Some(-1.0),
            ..Default::default()
        };
        let mut state = state_with_force(vec![0.0; 3]);
        init_limit(&mut state, &config);

        assert!(state.has_lambda_max && state.has_lambda_min);
        assert_eq!(state.lambda_max, vec![4.0; 3]);
        assert_eq!(state.lambda_min, vec![-1.0; 3]);
    }

    #[test]
    fn only_configured_bounds_are_active() {
        let config = ForcePointActuatorConfig {
            max_force: Some(4.0),
            ..Default::default()
        };
        let mut state = state_with_force(vec![0.0]);
        init_limit(&mut state, &config);

        assert!(state.has_lambda_max);
        assert!(!state.has_lambda_min);
        assert!(state.bounds().lambda_min.is_none());
    }

    #[test]
    fn variation_activates_both_bounds() {
        let config = ForcePointActuatorConfig {
            direction: [1.0, 0.0, 0.0],
            max_force_variation: Some(0.5),
            ..Default::default()
        };
        let mut state = state_with_force(vec![2.0]);
        init_limit(&mut state, &config);

        assert!(state.has_lambda_max && state.has_lambda_min);
        assert_relative_eq!(state.lambda_min[0], 1.5);
        assert_relative_eq!(state.lambda_max[0], 2.5);
    }

    /// Absolute bounds farther than Δ from the force collapse onto the band.
    #[test]
    fn distant_absolute_bounds_are_recentered() {
        let config = ForcePointActuatorConfig {
            direction: [1.0, 0.0, 0.0],
            max_force: Some(10.0),
            min_force: Some(-10.0),
            max_force_variation: Some(1.0),
            ..Default::default()
        };
        let mut state = state_with_force(vec![3.0]);
        init_limit(&mut state, &config);

        assert_relative_eq!(state.lambda_min[0], 2.0);
        assert_relative_eq!(state.lambda_max[0], 4.0);
    }

    /// An absolute bound closer than Δ to the force is tighter than the band
    /// and is kept.
    #[test]
    fn nearby_absolute_bound_wins_over_band() {
        let config = ForcePointActuatorConfig {
            direction: [1.0, 0.0, 0.0],
            max_force: Some(3.5),
            min_force: Some(-10.0),
            max_force_variation: Some(1.0),
            ..Default::default()
        };
        let mut state = state_with_force(vec![3.0]);
        update_limit(&mut state, &config);

        assert_relative_eq!(state.lambda_max[0], 3.5);
        assert_relative_eq!(state.lambda_min[0], 2.0);
    }

    #[test]
    fn band_follows_each_axis_independently() {
        let config = ForcePointActuatorConfig {
            max_force_variation: Some(0.25),
            ..Default::default()
        };
        let mut state = state_with_force(vec![1.0, -2.0, 0.0]);
        init_limit(&mut state, &config);

        assert_eq!(state.lambda_min, vec![0.75, -2.25, -0.25]);
        assert_eq!(state.lambda_max, vec![1.25, -1.75, 0.25]);
    }

    #[test]
    fn update_is_idempotent_for_fixed_force() {
        let config = ForcePointActuatorConfig {
            direction: [0.0, 1.0, 0.0],
            max_force: Some(5.0),
            min_force: Some(0.0),
            max_force_variation: Some(2.0),
            ..Default::default()
        };
        let mut state = state_with_force(vec![1.0]);
        update_limit(&mut state, &config);
        let first = state.clone();
        update_limit(&mut state, &config);
        assert_eq!(state, first);
    }

    #[test]
    fn crossed_bounds_are_detected() {
        let mut state = state_with_force(vec![0.0]);
        state.has_lambda_min = true;
        state.has_lambda_max = true;
        state.lambda_min[0] = 1.0;
        state.lambda_max[0] = -1.0;
        assert!(!bounds_are_ordered(&state));

        state.has_lambda_max = false;
        assert!(bounds_are_ordered(&state));
    }
}
