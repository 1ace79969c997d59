//! **Ariadne**: point-force actuators for QP-based inverse control of
//! deformable bodies.
//!
//! An actuator contributes rows to the constraint matrix of a quadratic
//! program and receives the solved multipliers back as applied forces:
//!
//! 1. **Configuration** (`types`): declared parameters, state, errors.
//! 2. **Bounds** (`limits`): absolute force limits and the rate-limiting
//!    band around the last applied force.
//! 3. **Rows** (`jacobian`): sparse constraint rows, exported as `sprs`
//!    matrices.
//! 4. **Actuator** (`actuator`): the `Actuator` trait and
//!    `ForcePointActuator`.
//! 5. **Assembly** (`assembly`): row offsets and per-row QP data for a set
//!    of actuators.
//! 6. **Drawing** (`draw`): force arrows through a `DrawTool` back-end.
//! 7. **FFI** (`ffi`): C-compatible handle API.

pub mod types;
pub mod limits;
pub mod jacobian;
pub mod actuator;
pub mod assembly;
pub mod draw;
pub mod ffi;

pub use actuator::{Actuator, ForcePointActuator, ResultHistory};
pub use assembly::{ConstraintAssembly, ConstraintBounds};
pub use jacobian::ConstraintMatrix;
pub use types::{
    ActuationMode, ActuatorBounds, ActuatorError, ActuatorState, ForcePointActuatorConfig,
    MechanicalState, PointCloud, Result,
};
