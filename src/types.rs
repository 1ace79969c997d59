use ndarray::Array2;
use serde::Deserialize;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Only setup-time operations (configuration, initialisation, assembly
/// bookkeeping) can fail.  The per-iteration hot path absorbs anomalies
/// locally instead of returning errors.  The FFI layer translates these into
/// integer return codes + a thread-local error message.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// The actuator was initialised without a deformable body to act on.
    #[error("there is no mechanical state associated with actuator `{0}`")]
    MissingMechanicalState(String),

    /// A configuration value is out of its admissible range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration document could not be deserialised.
    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Shape mismatch in input data.
    #[error("shape error: {0}")]
    Shape(String),

    /// A required pointer argument was null (C API only).
    #[error("null pointer passed for `{0}`")]
    NullPointer(&'static str),
}

impl ActuatorError {
    /// Create an invalid config error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

// ─────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────

/// Directions with a norm below this value select free (3-axis) mode.
pub const FREE_DIRECTION_TOLERANCE: f64 = 1e-10;

pub const DEFAULT_VISU_SCALE: f64 = 0.1;

/// Number of force axes in free mode.
pub const SPATIAL_DIMENSION: usize = 3;

#[inline]
pub fn norm3(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

// ─────────────────────────────────────────────────────────────
//  Configuration
// ─────────────────────────────────────────────────────────────

/// Declared parameters of a point-force actuator.
///
/// Optional parameters are `Option`s: whether a bound was *supplied* changes
/// how the bounds are computed, so "unset" and "set to the default value"
/// must stay distinguishable.  Keys follow the scene format (`maxForce`,
/// `maxForceVariation`, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForcePointActuatorConfig {
    /// Points of the body the force is applied to.
    #[serde(default)]
    pub indices: Vec<usize>,

    /// Direction of the force.  `[0, 0, 0]` lets the solver optimise it.
    #[serde(default)]
    pub direction: [f64; 3],

    #[serde(default)]
    pub max_force: Option<f64>,

    #[serde(default)]
    pub min_force: Option<f64>,

    /// Initial force if any.  Treated as 0 when unset.
    #[serde(default)]
    pub init_force: Option<f64>,

    /// Maximum change of the force between two solver iterations.
    #[serde(default)]
    pub max_force_variation: Option<f64>,

    /// Priority of the actuator in the solver's energy criterion.  0 means
    /// no limitation on the energy transferred by this actuator.
    #[serde(default)]
    pub penalty: Option<f64>,

    #[serde(default)]
    pub show_force: bool,

    #[serde(default = "default_visu_scale")]
    pub visu_scale: f64,
}

fn default_visu_scale() -> f64 {
    DEFAULT_VISU_SCALE
}

impl Default for ForcePointActuatorConfig {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            direction: [0.0; 3],
            max_force: None,
            min_force: None,
            init_force: None,
            max_force_variation: None,
            penalty: None,
            show_force: false,
            visu_scale: DEFAULT_VISU_SCALE,
        }
    }
}

impl ForcePointActuatorConfig {
    /// Parse a JSON configuration document and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.  Does not look at `indices`: stale indices are
    /// legal and skipped at matrix-build time.
    pub fn validate(&self) -> Result<()> {
        if self.direction.iter().any(|v| !v.is_finite()) {
            return Err(ActuatorError::invalid_config(format!(
                "direction must be finite, got {:?}",
                self.direction
            )));
        }

        let scalars = [
            ("maxForce", self.max_force),
            ("minForce", self.min_force),
            ("initForce", self.init_force),
            ("maxForceVariation", self.max_force_variation),
            ("penalty", self.penalty),
        ];
        for (key, value) in scalars {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ActuatorError::invalid_config(format!("{key} must be finite, got {v}")));
                }
            }
        }

        if let (Some(lo), Some(hi)) = (self.min_force, self.max_force) {
            if lo > hi {
                return Err(ActuatorError::invalid_config(format!(
                    "minForce ({lo}) is greater than maxForce ({hi})"
                )));
            }
        }
        if let Some(delta) = self.max_force_variation {
            if delta < 0.0 {
                return Err(ActuatorError::invalid_config(format!(
                    "maxForceVariation must be non-negative, got {delta}"
                )));
            }
        }
        if let Some(eps) = self.penalty {
            if eps < 0.0 {
                return Err(ActuatorError::invalid_config(format!(
                    "penalty must be non-negative, got {eps}"
                )));
            }
        }
        if !(self.visu_scale.is_finite() && self.visu_scale >= 0.0) {
            return Err(ActuatorError::invalid_config(format!(
                "visuScale must be a non-negative number, got {}",
                self.visu_scale
            )));
        }
        Ok(())
    }

    /// Operating mode derived from `direction`.
    pub fn mode(&self) -> ActuationMode {
        let n = norm3(&self.direction);
        if n < FREE_DIRECTION_TOLERANCE {
            ActuationMode::Free
        } else {
            let d = self.direction;
            ActuationMode::Fixed {
                direction: [d[0] / n, d[1] / n, d[2] / n],
            }
        }
    }

    /// Number of scalar forces (and constraint rows) of the actuator.
    pub fn dimension(&self) -> usize {
        self.mode().dimension()
    }
}

/// Whether the force direction is solved for or prescribed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuationMode {
    /// Three independent force components along the world axes.
    Free,
    /// One scalar force along a unit direction.
    Fixed { direction: [f64; 3] },
}

impl ActuationMode {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Free => SPATIAL_DIMENSION,
            Self::Fixed { .. } => 1,
        }
    }

    /// Unit Jacobian block of row `axis` (`axis < dimension()`).
    pub fn row_direction(&self, axis: usize) -> [f64; 3] {
        match self {
            Self::Free => {
                let mut dir = [0.0; 3];
                dir[axis] = 1.0;
                dir
            }
            Self::Fixed { direction } => *direction,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Actuator state  (mutable across solve iterations)
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActuatorState {
    /// 1 in fixed mode, 3 in free mode.
    pub dimension: usize,
    /// Applied force component(s).  Divide by the time step to get a
    /// physical force.
    pub force: Vec<f64>,
    /// Last reported violation at the actuation point.
    pub displacement: f64,
    pub lambda_min: Vec<f64>,
    pub lambda_max: Vec<f64>,
    pub lambda_init: Vec<f64>,
    pub has_lambda_min: bool,
    pub has_lambda_max: bool,
    pub has_lambda_init: bool,
    /// Penalty exposed to the solver, only when explicitly configured.
    pub epsilon: Option<f64>,
    /// First row of this actuator in the global constraint matrix.
    pub constraint_index: usize,
    pub row_count: usize,
}

/// Initial values handed to the solver.  A field is `None` when the
/// corresponding bound or guess is inactive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorBounds<'a> {
    pub lambda_min: Option<&'a [f64]>,
    pub lambda_max: Option<&'a [f64]>,
    pub lambda_init: Option<&'a [f64]>,
    pub epsilon: Option<f64>,
}

impl ActuatorState {
    pub fn bounds(&self) -> ActuatorBounds<'_> {
        ActuatorBounds {
            lambda_min: self.has_lambda_min.then_some(self.lambda_min.as_slice()),
            lambda_max: self.has_lambda_max.then_some(self.lambda_max.as_slice()),
            lambda_init: self.has_lambda_init.then_some(self.lambda_init.as_slice()),
            epsilon: self.epsilon,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Deformable body
// ─────────────────────────────────────────────────────────────

/// Read-only view of the body an actuator acts upon.
pub trait MechanicalState {
    /// Current number of points.  May change between solver passes.
    fn size(&self) -> usize;

    /// Position of point `index`, `None` when out of range.
    fn position(&self, index: usize) -> Option<[f64; 3]>;
}

/// Plain point set backed by an `n × 3` array.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub positions: Array2<f64>,
}

impl PointCloud {
    pub fn new(positions: Array2<f64>) -> Result<Self> {
        if positions.ncols() != 3 {
            return Err(ActuatorError::shape(format!(
                "positions must have 3 columns, got {}",
                positions.ncols()
            )));
        }
        Ok(Self { positions })
    }

    /// Build from a row-major `[x0, y0, z0, x1, ...]` buffer.
    pub fn from_flat(coords: &[f64]) -> Result<Self> {
        if coords.len() % 3 != 0 {
            return Err(ActuatorError::shape(format!(
                "flat coordinate buffer length {} is not a multiple of 3",
                coords.len()
            )));
        }
        let positions = Array2::from_shape_vec((coords.len() / 3, 3), coords.to_vec())
            .map_err(|e| ActuatorError::shape(e.to_string()))?;
        Ok(Self { positions })
    }
}

impl MechanicalState for PointCloud {
    fn size(&self) -> usize {
        self.positions.nrows()
    }

    fn position(&self, index: usize) -> Option<[f64; 3]> {
        if index >= self.positions.nrows() {
            return None;
        }
        let row = self.positions.row(index);
        Some([row[0], row[1], row[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_keys_follow_scene_names() {
        let config = ForcePointActuatorConfig::from_json(
            r#"{
                "indices": [0, 4],
                "direction": [0.0, 2.0, 0.0],
                "maxForce": 10.0,
                "maxForceVariation": 0.5,
                "penalty": 0.01
            }"#,
        )
        .unwrap();
        assert_eq!(config.indices, vec![0, 4]);
        assert_eq!(config.max_force, Some(10.0));
        assert_eq!(config.min_force, None);
        assert_eq!(config.max_force_variation, Some(0.5));
        assert_eq!(config.penalty, Some(0.01));
        assert_eq!(config.visu_scale, DEFAULT_VISU_SCALE);
        assert!(!config.show_force);
        assert_eq!(config.mode(), ActuationMode::Fixed { direction: [0.0, 1.0, 0.0] });
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = ForcePointActuatorConfig::from_json(r#"{ "maxforce": 1.0 }"#).unwrap_err();
        assert!(matches!(err, ActuatorError::Parse(_)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let config = ForcePointActuatorConfig {
            min_force: Some(2.0),
            max_force: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ActuatorError::InvalidConfig(_))));
    }

    #[test]
    fn negative_variation_is_rejected() {
        let config = ForcePointActuatorConfig {
            max_force_variation: Some(-1.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_direction_selects_free_mode() {
        let mut config = ForcePointActuatorConfig::default();
        config.direction = [1e-12, 0.0, 0.0];
        assert_eq!(config.dimension(), 3);
        config.direction = [0.0, 0.0, -3.0];
        assert_eq!(config.dimension(), 1);
        assert_eq!(config.mode().row_direction(0), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn point_cloud_from_flat() {
        let body = PointCloud::from_flat(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(body.size(), 2);
        assert_eq!(body.position(1), Some([3.0, 4.0, 5.0]));
        assert_eq!(body.position(2), None);
        assert!(PointCloud::from_flat(&[1.0, 2.0]).is_err());
    }
}
