//! Host-side assembly of several actuators into one constraint system.
//!
//! This is the bookkeeping a QP solver needs around the actuators: row
//! offsets, the global Jacobian, per-row bounds / initial guesses /
//! penalties, and scattering the solution back.  Solving the QP is left to
//! the caller.

use crate::actuator::Actuator;
use crate::draw::VisualParams;
use crate::jacobian::ConstraintMatrix;
use crate::types::{ActuatorError, MechanicalState, Result};
use sprs::CsMat;
use std::ops::Range;
use tracing::{debug, warn};

/// Per-row initial values of the QP, `num_rows` entries each.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintBounds {
    /// `-∞` where no floor is active.
    pub lower: Vec<f64>,
    /// `+∞` where no ceiling is active.
    pub upper: Vec<f64>,
    /// 0 where no initial guess is configured.
    pub initial_guess: Vec<f64>,
    /// `None` where the actuator does not weight its energy.
    pub penalties: Vec<Option<f64>>,
}

#[derive(Debug, Default)]
pub struct ConstraintAssembly {
    actuators: Vec<Box<dyn Actuator>>,
    ranges: Vec<Range<usize>>,
    matrix: ConstraintMatrix,
    num_rows: usize,
}

impl ConstraintAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actuator and return its position.
    pub fn add(&mut self, actuator: Box<dyn Actuator>) -> usize {
        self.actuators.push(actuator);
        self.ranges.push(0..0);
        self.actuators.len() - 1
    }

    pub fn actuators(&self) -> &[Box<dyn Actuator>] {
        &self.actuators
    }

    pub fn actuator(&self, id: usize) -> Option<&dyn Actuator> {
        self.actuators.get(id).map(|a| a.as_ref())
    }

    /// Rows owned by actuator `id` after the last [`build`](Self::build).
    pub fn rows_of(&self, id: usize) -> Option<Range<usize>> {
        self.ranges.get(id).cloned()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn matrix(&self) -> &ConstraintMatrix {
        &self.matrix
    }

    /// Initialise every actuator against `body`.
    ///
    /// An actuator that fails to initialise stays inactive and the others
    /// are still initialised.  The first error is returned.
    pub fn init_all(&mut self, body: Option<&dyn MechanicalState>) -> Result<()> {
        let mut first_err = None;
        for actuator in &mut self.actuators {
            if let Err(err) = actuator.init(body) {
                warn!(actuator = actuator.name(), %err, "actuator left inactive");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Rebuild the constraint matrix, giving each active actuator the next
    /// free rows.  Returns the total number of rows.
    pub fn build(&mut self, body: &dyn MechanicalState) -> usize {
        self.matrix.clear();
        let mut offset = 0;
        for (actuator, range) in self.actuators.iter_mut().zip(self.ranges.iter_mut()) {
            if !actuator.is_active() {
                *range = offset..offset;
                continue;
            }
            let rows = actuator.build_constraint_matrix(body, &mut self.matrix, offset);
            *range = offset..offset + rows;
            offset += rows;
        }
        self.num_rows = offset;
        debug!(
            actuators = self.actuators.len(),
            rows = self.num_rows,
            blocks = self.matrix.nnz_blocks(),
            "assembled constraint matrix"
        );
        self.num_rows
    }

    /// Global Jacobian, `num_rows × 3 * num_points`.
    pub fn jacobian(&self, num_points: usize) -> CsMat<f64> {
        let csr = self.matrix.to_csr(num_points);
        debug_assert_eq!(csr.rows(), self.num_rows);
        csr
    }

    /// Free violation of every row.
    pub fn violations(&self) -> Vec<f64> {
        let mut res = vec![0.0; self.num_rows];
        for (actuator, range) in self.actuators.iter().zip(&self.ranges) {
            if !range.is_empty() {
                actuator.constraint_violation(&mut res);
            }
        }
        res
    }

    pub fn bounds(&self) -> ConstraintBounds {
        let n = self.num_rows;
        let mut out = ConstraintBounds {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
            initial_guess: vec![0.0; n],
            penalties: vec![None; n],
        };

        for (actuator, range) in self.actuators.iter().zip(&self.ranges) {
            let b = actuator.bounds();
            for (local, row) in range.clone().enumerate() {
                if let Some(&lo) = b.lambda_min.and_then(|v| v.get(local)) {
                    out.lower[row] = lo;
                }
                if let Some(&hi) = b.lambda_max.and_then(|v| v.get(local)) {
                    out.upper[row] = hi;
                }
                if let Some(&init) = b.lambda_init.and_then(|v| v.get(local)) {
                    out.initial_guess[row] = init;
                }
                out.penalties[row] = b.epsilon;
            }
        }
        out
    }

    /// Hand each actuator its slice of the solution.
    pub fn store_results(&mut self, lambda: &[f64], delta: &[f64]) -> Result<()> {
        if lambda.len() != self.num_rows || delta.len() != self.num_rows {
            return Err(ActuatorError::shape(format!(
                "expected {} multipliers and deltas, got {} and {}",
                self.num_rows,
                lambda.len(),
                delta.len()
            )));
        }
        for (actuator, range) in self.actuators.iter_mut().zip(&self.ranges) {
            if range.is_empty() {
                continue;
            }
            actuator.store_results(&lambda[range.clone()], &delta[range.clone()]);
        }
        Ok(())
    }

    pub fn draw(&self, body: &dyn MechanicalState, params: &mut VisualParams<'_>) {
        for actuator in self.actuators.iter().filter(|a| a.is_active()) {
            actuator.draw(body, params);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ForcePointActuator;
    use crate::types::{ForcePointActuatorConfig, PointCloud};
    use ndarray::Array2;

    fn body(n: usize) -> PointCloud {
        PointCloud::new(Array2::zeros((n, 3))).unwrap()
    }

    #[test]
    fn inactive_actuators_get_no_rows() {
        let mut assembly = ConstraintAssembly::new();
        let id = assembly.add(Box::new(ForcePointActuator::new("a", Default::default())));
        assembly.init_all(None).unwrap();

        assert_eq!(assembly.build(&body(2)), 0);
        assert_eq!(assembly.rows_of(id), Some(0..0));
        assert!(assembly.store_results(&[], &[]).is_ok());
    }

    #[test]
    fn result_length_is_checked() {
        let mut assembly = ConstraintAssembly::new();
        assembly.add(Box::new(ForcePointActuator::new(
            "a",
            ForcePointActuatorConfig {
                direction: [1.0, 0.0, 0.0],
                ..Default::default()
            },
        )));
        let b = body(1);
        assembly.init_all(Some(&b)).unwrap();
        assembly.build(&b);

        let err = assembly.store_results(&[1.0, 2.0], &[0.0]).unwrap_err();
        assert!(matches!(err, ActuatorError::Shape(_)));
    }

    #[test]
    fn failed_init_is_left_out_of_the_solve() {
        let mut assembly = ConstraintAssembly::new();
        let bad = assembly.add(Box::new(ForcePointActuator::new(
            "bad",
            ForcePointActuatorConfig {
                direction: [1.0, 0.0, 0.0],
                min_force: Some(1.0),
                max_force: Some(0.0),
                ..Default::default()
            },
        )));
        let good = assembly.add(Box::new(ForcePointActuator::new(
            "good",
            ForcePointActuatorConfig {
                direction: [0.0, 1.0, 0.0],
                max_force: Some(10.0),
                max_force_variation: Some(1.0),
                ..Default::default()
            },
        )));
        let b = body(1);

        let err = assembly.init_all(Some(&b)).unwrap_err();
        assert!(matches!(err, ActuatorError::InvalidConfig(_)));
        assert!(!assembly.actuator(bad).unwrap().is_active());
        assert!(assembly.actuator(good).unwrap().is_active());

        assert_eq!(assembly.build(&b), 1);
        assert_eq!(assembly.rows_of(bad), Some(0..0));
        assert_eq!(assembly.rows_of(good), Some(0..1));
        assert_eq!(assembly.bounds().upper, vec![1.0]);

        // the whole solution lands on the remaining actuator
        assembly.store_results(&[7.0], &[0.3]).unwrap();
        let bounds = assembly.bounds();
        assert_eq!(bounds.lower, vec![6.0]);
        assert_eq!(bounds.upper, vec![8.0]);
    }

    #[test]
    fn uninitialised_actuators_get_no_rows() {
        let mut assembly = ConstraintAssembly::new();
        let id = assembly.add(Box::new(ForcePointActuator::new("fresh", Default::default())));
        assert_eq!(assembly.build(&body(3)), 0);
        assert_eq!(assembly.rows_of(id), Some(0..0));
    }
}
