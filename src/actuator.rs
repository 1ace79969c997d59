//! Actuator capability trait and the point-force actuator.
//!
//! Per solver iteration the host calls, in order:
//!
//! 1. [`Actuator::build_constraint_matrix`]: write this actuator's rows,
//! 2. [`Actuator::bounds`] / [`Actuator::constraint_violation`]: initial
//!    values for the QP,
//! 3. [`Actuator::store_results`]: consume the solved multipliers.

use crate::draw::{arrow_to, VisualParams};
use crate::jacobian::ConstraintMatrix;
use crate::limits::{init_limit, update_limit};
use crate::types::{
    ActuationMode, ActuatorBounds, ActuatorError, ActuatorState, ForcePointActuatorConfig,
    MechanicalState, Result,
};
use std::fmt::Debug;
use tracing::{debug, error, trace, warn};

// ─────────────────────────────────────────────────────────────
//  Actuator trait
// ─────────────────────────────────────────────────────────────

/// Contract between an actuator and the host solve loop.
pub trait Actuator: Debug + Send {
    fn name(&self) -> &str;

    /// One-time setup against the body.  A missing body is not an error:
    /// the actuator logs it and deactivates itself.
    fn init(&mut self, body: Option<&dyn MechanicalState>) -> Result<()>;

    /// Recompute mode and bounds from the current configuration.
    fn reinit(&mut self);

    /// `true` only after a successful `init` against a body.  Inactive
    /// actuators must not be given rows.
    fn is_active(&self) -> bool;

    /// Write this actuator's rows starting at `start_row` and return how
    /// many rows were written.
    fn build_constraint_matrix(
        &mut self,
        body: &dyn MechanicalState,
        matrix: &mut ConstraintMatrix,
        start_row: usize,
    ) -> usize;

    /// Write the free violation of each owned row into the global vector.
    fn constraint_violation(&self, res: &mut [f64]);

    /// Consume this actuator's slice of the solved multipliers and deltas.
    fn store_results(&mut self, lambda: &[f64], delta: &[f64]);

    fn draw(&self, body: &dyn MechanicalState, params: &mut VisualParams<'_>);

    fn bounds(&self) -> ActuatorBounds<'_>;

    fn constraint_index(&self) -> usize;

    fn row_count(&self) -> usize;
}

// ─────────────────────────────────────────────────────────────
//  Shared result post-processing
// ─────────────────────────────────────────────────────────────

/// Bookkeeping common to every actuator, run after the actuator has stored
/// its own results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultHistory {
    /// Number of result slices stored since the last (re)initialisation.
    pub iterations: u64,
    pub last_lambda: Vec<f64>,
    pub last_delta: Vec<f64>,
}

impl ResultHistory {
    pub fn record(&mut self, name: &str, lambda: &[f64], delta: &[f64]) {
        self.iterations += 1;
        self.last_lambda.clear();
        self.last_lambda.extend_from_slice(lambda);
        self.last_delta.clear();
        self.last_delta.extend_from_slice(delta);
        trace!(actuator = name, iteration = self.iterations, ?lambda, ?delta, "stored results");
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─────────────────────────────────────────────────────────────
//  Point-force actuator
// ─────────────────────────────────────────────────────────────

/// Controllable force applied at a set of body points, either along a
/// fixed direction (one scalar) or free in 3D (three scalars).
#[derive(Debug, Clone)]
pub struct ForcePointActuator {
    name: String,
    config: ForcePointActuatorConfig,
    state: ActuatorState,
    active: bool,
    history: ResultHistory,
}

impl ForcePointActuator {
    /// Create an actuator.  Nothing is resolved until [`Actuator::init`],
    /// and the actuator stays inactive until then.
    pub fn new(name: impl Into<String>, config: ForcePointActuatorConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: ActuatorState::default(),
            active: false,
            history: ResultHistory::default(),
        }
    }

    pub fn config(&self) -> &ForcePointActuatorConfig {
        &self.config
    }

    pub fn state(&self) -> &ActuatorState {
        &self.state
    }

    pub fn history(&self) -> &ResultHistory {
        &self.history
    }

    pub fn mode(&self) -> ActuationMode {
        self.config.mode()
    }

    pub fn dimension(&self) -> usize {
        self.state.dimension
    }

    /// Applied force component(s), in solver units (impulse per step).
    pub fn force(&self) -> &[f64] {
        &self.state.force
    }

    /// Applied force converted to physical units.
    pub fn physical_force(&self, dt: f64) -> Vec<f64> {
        self.state.force.iter().map(|f| f / dt).collect()
    }

    pub fn displacement(&self) -> f64 {
        self.state.displacement
    }

    /// Replace the configuration and reinitialise.  Switching between free
    /// and fixed direction changes the dimension.
    pub fn set_config(&mut self, config: ForcePointActuatorConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.reinit();
        Ok(())
    }

    /// Refresh the bounds from the current force.
    pub fn update_limit(&mut self) {
        update_limit(&mut self.state, &self.config);
    }

    fn init_data(&mut self) {
        let dimension = self.config.dimension();
        let state = &mut self.state;

        state.dimension = dimension;
        state.epsilon = self.config.penalty;

        state.lambda_init.resize(dimension, 0.0);
        state.lambda_max.resize(dimension, 0.0);
        state.lambda_min.resize(dimension, 0.0);

        state.has_lambda_init = self.config.init_force.is_some();
        if let Some(init) = self.config.init_force {
            state.lambda_init[0] = init;
        }

        state.force = vec![self.config.init_force.unwrap_or(0.0); dimension];
        state.row_count = dimension;
    }

    fn valid_points<'a>(&'a self, body: &'a dyn MechanicalState) -> impl Iterator<Item = usize> + 'a {
        let size = body.size();
        self.config.indices.iter().copied().filter(move |&index| {
            let valid = index < size;
            if !valid {
                trace!(actuator = %self.name, index, size, "skipping stale point index");
            }
            valid
        })
    }
}

impl Actuator for ForcePointActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, body: Option<&dyn MechanicalState>) -> Result<()> {
        self.active = false;
        self.config.validate()?;

        self.reinit();

        self.active = body.is_some();
        if !self.active {
            let err = ActuatorError::MissingMechanicalState(self.name.clone());
            error!(
                actuator = %self.name,
                "{err}; the object is deactivated. Add a mechanical state to the scene to fix this"
            );
        }
        debug!(
            actuator = %self.name,
            dimension = self.state.dimension,
            active = self.active,
            "initialised force point actuator"
        );
        Ok(())
    }

    fn reinit(&mut self) {
        self.init_data();
        init_limit(&mut self.state, &self.config);
        self.history.reset();
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn build_constraint_matrix(
        &mut self,
        body: &dyn MechanicalState,
        matrix: &mut ConstraintMatrix,
        start_row: usize,
    ) -> usize {
        self.state.constraint_index = start_row;
        let mode = self.config.mode();

        let points: Vec<usize> = self.valid_points(body).collect();
        for axis in 0..mode.dimension() {
            let block = mode.row_direction(axis);
            let mut row = matrix.write_line(start_row + axis);
            for &point in &points {
                row.add_col(point, block);
            }
        }

        self.state.row_count = mode.dimension();
        self.state.row_count
    }

    /// The violation is not known at build time; each owned row reports 0
    /// and the host folds the projected displacement in itself.
    fn constraint_violation(&self, res: &mut [f64]) {
        let start = self.state.constraint_index;
        for row in start..start + self.state.dimension {
            if let Some(v) = res.get_mut(row) {
                *v = 0.0;
            }
        }
    }

    fn store_results(&mut self, lambda: &[f64], delta: &[f64]) {
        if let Some(&d) = delta.first() {
            self.state.displacement = d;
        }

        {
            let force = &mut self.state.force;
            if lambda.len() < force.len() {
                warn!(
                    actuator = %self.name,
                    expected = force.len(),
                    got = lambda.len(),
                    "short multiplier slice; keeping previous force on missing axes"
                );
            }
            for (f, &l) in force.iter_mut().zip(lambda) {
                *f = l;
            }
        }

        self.update_limit();

        self.history.record(&self.name, lambda, delta);
    }

    fn draw(&self, body: &dyn MechanicalState, params: &mut VisualParams<'_>) {
        if !params.display_flags.show_interaction_force_fields || !self.config.show_force {
            return;
        }

        let scale = self.config.visu_scale;
        let force = &self.state.force;
        let (axis, length) = match self.config.mode() {
            ActuationMode::Free => {
                let f = [
                    force.first().copied().unwrap_or(0.0),
                    force.get(1).copied().unwrap_or(0.0),
                    force.get(2).copied().unwrap_or(0.0),
                ];
                (f, scale)
            }
            ActuationMode::Fixed { direction } => {
                let magnitude = force.first().copied().unwrap_or(0.0);
                (direction, (magnitude + 1.0).ln() * scale)
            }
        };

        let tool = &mut *params.draw_tool;
        tool.set_lighting_enabled(true);
        for point in self.valid_points(body) {
            let Some(position) = body.position(point) else { continue };
            if let Some(arrow) = arrow_to(position, axis, length) {
                tool.draw_arrow(arrow.from, arrow.to, arrow.radius, arrow.color, arrow.subdivisions);
            }
        }
        tool.restore_last_state();
    }

    fn bounds(&self) -> ActuatorBounds<'_> {
        self.state.bounds()
    }

    fn constraint_index(&self) -> usize {
        self.state.constraint_index
    }

    fn row_count(&self) -> usize {
        self.state.row_count
    }
}
