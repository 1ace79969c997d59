//! C-compatible API for host simulators.
//!
//! All functions are `#[no_mangle] extern "C"` so a C / C++ solve loop can
//! drive an actuator without linking against Rust types.
//!
//! Memory convention:
//!   - Caller allocates flat arrays and passes pointers + lengths.
//!   - The opaque `*mut ActuatorHandle` is created by Rust and freed by Rust
//!     via `ariadne_actuator_free`.
//!   - Fallible functions return 0 on success and a non-zero code on error;
//!     the message is kept per thread and read with `ariadne_last_error`.

use crate::actuator::{Actuator, ForcePointActuator};
use crate::jacobian::ConstraintMatrix;
use crate::types::{ActuatorError, ForcePointActuatorConfig, MechanicalState, PointCloud};
use std::cell::RefCell;
use std::ffi::{c_char, CStr};
use std::slice;

pub const ARIADNE_OK: i32 = 0;
pub const ARIADNE_ERROR: i32 = 1;
/// An output buffer was too small; the required size was written back.
pub const ARIADNE_BUFFER_TOO_SMALL: i32 = 2;

// ─────────────────────────────────────────────────────────────
//  Error reporting
// ─────────────────────────────────────────────────────────────

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

fn set_last_error(err: &ActuatorError) {
    LAST_ERROR.with(|e| *e.borrow_mut() = err.to_string());
}

fn clear_last_error() {
    LAST_ERROR.with(|e| e.borrow_mut().clear());
}

fn report(result: Result<(), ActuatorError>) -> i32 {
    match result {
        Ok(()) => {
            clear_last_error();
            ARIADNE_OK
        }
        Err(err) => {
            set_last_error(&err);
            ARIADNE_ERROR
        }
    }
}

/// Copy the last error message of this thread into `buf` (not
/// NUL-terminated).  Returns the number of bytes written, 0 when there is
/// no error.  A message longer than `len` is cut on a UTF-8 character
/// boundary, so the written bytes are always valid UTF-8.
///
/// # Safety
/// `buf` must be valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn ariadne_last_error(buf: *mut u8, len: usize) -> i32 {
    if buf.is_null() {
        return 0;
    }
    LAST_ERROR.with(|e| {
        let msg = e.borrow();
        let mut n = msg.len().min(len).min(i32::MAX as usize);
        while !msg.is_char_boundary(n) {
            n -= 1;
        }
        slice::from_raw_parts_mut(buf, n).copy_from_slice(&msg.as_bytes()[..n]);
        n as i32
    })
}

// ─────────────────────────────────────────────────────────────
//  Opaque handle
// ─────────────────────────────────────────────────────────────

/// Actuator plus the body snapshot and row buffer it works against.
pub struct ActuatorHandle {
    pub actuator: ForcePointActuator,
    pub body: Option<PointCloud>,
    pub matrix: ConstraintMatrix,
}

unsafe fn handle_mut<'a>(handle: *mut ActuatorHandle) -> Result<&'a mut ActuatorHandle, ActuatorError> {
    handle.as_mut().ok_or(ActuatorError::NullPointer("handle"))
}

/// Create an actuator from a NUL-terminated JSON configuration
/// (`{"indices": [..], "direction": [..], "maxForce": ..}`).
///
/// Returns null on error.
///
/// # Safety
/// `name` and `config_json` must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn ariadne_actuator_create(
    name: *const c_char,
    config_json: *const c_char,
) -> *mut ActuatorHandle {
    let built = (|| -> Result<ActuatorHandle, ActuatorError> {
        if name.is_null() {
            return Err(ActuatorError::NullPointer("name"));
        }
        if config_json.is_null() {
            return Err(ActuatorError::NullPointer("config_json"));
        }
        let name = CStr::from_ptr(name).to_string_lossy().into_owned();
        let text = CStr::from_ptr(config_json)
            .to_str()
            .map_err(|e| ActuatorError::invalid_config(format!("configuration is not UTF-8: {e}")))?;
        let config = ForcePointActuatorConfig::from_json(text)?;
        Ok(ActuatorHandle {
            actuator: ForcePointActuator::new(name, config),
            body: None,
            matrix: ConstraintMatrix::new(),
        })
    })();

    match built {
        Ok(handle) => {
            clear_last_error();
            Box::into_raw(Box::new(handle))
        }
        Err(err) => {
            set_last_error(&err);
            std::ptr::null_mut()
        }
    }
}

/// Free a handle.
///
/// # Safety
/// `handle` must be a pointer returned by `ariadne_actuator_create`.
#[no_mangle]
pub unsafe extern "C" fn ariadne_actuator_free(handle: *mut ActuatorHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ─────────────────────────────────────────────────────────────
//  Body & lifecycle
// ─────────────────────────────────────────────────────────────

/// Replace the body snapshot with `num_points` row-major positions.
///
/// # Safety
/// Valid handle; `positions` valid for `num_points * 3` values.
#[no_mangle]
pub unsafe extern "C" fn ariadne_set_positions(
    handle: *mut ActuatorHandle,
    positions: *const f64,
    num_points: usize,
) -> i32 {
    report((|| -> Result<(), ActuatorError> {
        let h = handle_mut(handle)?;
        if positions.is_null() && num_points > 0 {
            return Err(ActuatorError::NullPointer("positions"));
        }
        let coords = if num_points == 0 {
            &[][..]
        } else {
            slice::from_raw_parts(positions, num_points * 3)
        };
        h.body = Some(PointCloud::from_flat(coords)?);
        Ok(())
    })())
}

/// Initialise the actuator.  Without prior `ariadne_set_positions` the
/// actuator is deactivated (see `ariadne_is_active`), which is not an error.
///
/// # Safety
/// Valid handle.
#[no_mangle]
pub unsafe extern "C" fn ariadne_init(handle: *mut ActuatorHandle) -> i32 {
    report((|| -> Result<(), ActuatorError> {
        let h = handle_mut(handle)?;
        let body = h.body.as_ref().map(|b| b as &dyn MechanicalState);
        h.actuator.init(body)
    })())
}

/// Re-resolve mode and bounds from the stored configuration.
///
/// # Safety
/// Valid handle.
#[no_mangle]
pub unsafe extern "C" fn ariadne_reinit(handle: *mut ActuatorHandle) -> i32 {
    report((|| -> Result<(), ActuatorError> {
        handle_mut(handle)?.actuator.reinit();
        Ok(())
    })())
}

/// # Safety
/// Valid handle.
#[no_mangle]
pub unsafe extern "C" fn ariadne_is_active(handle: *const ActuatorHandle) -> bool {
    handle.as_ref().is_some_and(|h| h.actuator.is_active())
}

/// Number of scalar forces (1 or 3), 0 for a null handle.
///
/// # Safety
/// Valid handle.
#[no_mangle]
pub unsafe extern "C" fn ariadne_dimension(handle: *const ActuatorHandle) -> usize {
    handle.as_ref().map_or(0, |h| h.actuator.dimension())
}

// ─────────────────────────────────────────────────────────────
//  Solver interface
// ─────────────────────────────────────────────────────────────

/// Build the actuator rows starting at `start_row` and write them as COO
/// triplets `(row, dof, value)` with `dof = 3 * point + axis`.
///
/// If `capacity` is too small, nothing is copied, `*out_nnz` receives the
/// required size and `ARIADNE_BUFFER_TOO_SMALL` is returned.
///
/// # Safety
/// Valid handle; output arrays valid for `capacity` entries; scalar
/// outputs valid.
#[no_mangle]
pub unsafe extern "C" fn ariadne_build_rows(
    handle: *mut ActuatorHandle,
    start_row: usize,
    out_rows: *mut usize,
    out_cols: *mut usize,
    out_vals: *mut f64,
    capacity: usize,
    out_nnz: *mut usize,
    out_row_count: *mut usize,
) -> i32 {
    let h = match handle_mut(handle) {
        Ok(h) => h,
        Err(err) => {
            set_last_error(&err);
            return ARIADNE_ERROR;
        }
    };
    if out_nnz.is_null() || out_row_count.is_null() {
        set_last_error(&ActuatorError::NullPointer("out_nnz / out_row_count"));
        return ARIADNE_ERROR;
    }

    let empty = PointCloud::default();
    let body = h.body.as_ref().unwrap_or(&empty);

    h.matrix.clear();
    *out_row_count = h.actuator.build_constraint_matrix(body, &mut h.matrix, start_row);

    let triplets = h.matrix.triplets(body.size());
    *out_nnz = triplets.len();
    if triplets.len() > capacity {
        set_last_error(&ActuatorError::shape(format!(
            "row buffer holds {capacity} entries, {} needed",
            triplets.len()
        )));
        return ARIADNE_BUFFER_TOO_SMALL;
    }
    if !triplets.is_empty() && (out_rows.is_null() || out_cols.is_null() || out_vals.is_null()) {
        set_last_error(&ActuatorError::NullPointer("out_rows / out_cols / out_vals"));
        return ARIADNE_ERROR;
    }

    for (i, (row, col, val)) in triplets.into_iter().enumerate() {
        *out_rows.add(i) = row;
        *out_cols.add(i) = col;
        *out_vals.add(i) = val;
    }
    clear_last_error();
    ARIADNE_OK
}

/// Write the initial bounds into `dimension`-sized buffers.  Inactive
/// entries are written as `-inf` / `+inf` / 0; the `out_has_*` flags tell
/// which ones are active.  `out_epsilon` is NaN when no penalty is set.
///
/// # Safety
/// Valid handle; array outputs valid for `ariadne_dimension` entries;
/// scalar outputs valid.
#[no_mangle]
pub unsafe extern "C" fn ariadne_bounds(
    handle: *const ActuatorHandle,
    out_min: *mut f64,
    out_max: *mut f64,
    out_init: *mut f64,
    out_has_min: *mut bool,
    out_has_max: *mut bool,
    out_has_init: *mut bool,
    out_epsilon: *mut f64,
) -> i32 {
    let Some(h) = handle.as_ref() else {
        set_last_error(&ActuatorError::NullPointer("handle"));
        return ARIADNE_ERROR;
    };
    if [out_min, out_max, out_init, out_epsilon].iter().any(|p| p.is_null())
        || [out_has_min, out_has_max, out_has_init].iter().any(|p| p.is_null())
    {
        set_last_error(&ActuatorError::NullPointer("bounds output"));
        return ARIADNE_ERROR;
    }

    let dim = h.actuator.dimension();
    let bounds = h.actuator.bounds();
    let fill = |out: *mut f64, values: Option<&[f64]>, inactive: f64| {
        let out = slice::from_raw_parts_mut(out, dim);
        match values {
            Some(v) => out.copy_from_slice(&v[..dim]),
            None => out.fill(inactive),
        }
    };
    fill(out_min, bounds.lambda_min, f64::NEG_INFINITY);
    fill(out_max, bounds.lambda_max, f64::INFINITY);
    fill(out_init, bounds.lambda_init, 0.0);

    *out_has_min = bounds.lambda_min.is_some();
    *out_has_max = bounds.lambda_max.is_some();
    *out_has_init = bounds.lambda_init.is_some();
    *out_epsilon = bounds.epsilon.unwrap_or(f64::NAN);

    clear_last_error();
    ARIADNE_OK
}

/// Store this actuator's slice of the solved multipliers and deltas.
///
/// # Safety
/// Valid handle; `lambda` / `delta` valid for their lengths.
#[no_mangle]
pub unsafe extern "C" fn ariadne_store_results(
    handle: *mut ActuatorHandle,
    lambda: *const f64,
    num_lambda: usize,
    delta: *const f64,
    num_delta: usize,
) -> i32 {
    report((|| -> Result<(), ActuatorError> {
        let h = handle_mut(handle)?;
        let lambda = if num_lambda == 0 {
            &[][..]
        } else if lambda.is_null() {
            return Err(ActuatorError::NullPointer("lambda"));
        } else {
            slice::from_raw_parts(lambda, num_lambda)
        };
        let delta = if num_delta == 0 {
            &[][..]
        } else if delta.is_null() {
            return Err(ActuatorError::NullPointer("delta"));
        } else {
            slice::from_raw_parts(delta, num_delta)
        };
        h.actuator.store_results(lambda, delta);
        Ok(())
    })())
}

/// Copy the applied force (solver units) into `out_force`.
///
/// # Safety
/// Valid handle; `out_force` valid for `capacity` entries.
#[no_mangle]
pub unsafe extern "C" fn ariadne_force(
    handle: *const ActuatorHandle,
    out_force: *mut f64,
    capacity: usize,
) -> i32 {
    let Some(h) = handle.as_ref() else {
        set_last_error(&ActuatorError::NullPointer("handle"));
        return ARIADNE_ERROR;
    };
    let force = h.actuator.force();
    if capacity < force.len() {
        set_last_error(&ActuatorError::shape(format!(
            "force buffer holds {capacity} entries, {} needed",
            force.len()
        )));
        return ARIADNE_BUFFER_TOO_SMALL;
    }
    if force.is_empty() {
        clear_last_error();
        return ARIADNE_OK;
    }
    if out_force.is_null() {
        set_last_error(&ActuatorError::NullPointer("out_force"));
        return ARIADNE_ERROR;
    }
    slice::from_raw_parts_mut(out_force, force.len()).copy_from_slice(force);
    clear_last_error();
    ARIADNE_OK
}

/// Last stored displacement, NaN for a null handle.
///
/// # Safety
/// Valid handle.
#[no_mangle]
pub unsafe extern "C" fn ariadne_displacement(handle: *const ActuatorHandle) -> f64 {
    handle.as_ref().map_or(f64::NAN, |h| h.actuator.displacement())
}
