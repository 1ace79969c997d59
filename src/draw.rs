//! Rendering seam for force arrows.
//!
//! The crate never talks to a graphics API: it emits arrows through the
//! [`DrawTool`] trait.  [`ArrowRecorder`] is a headless implementation that
//! simply keeps what was drawn.

use crate::types::norm3;

pub type RgbaColor = [f32; 4];

pub const FORCE_ARROW_COLOR: RgbaColor = [0.0, 0.0, 0.8, 1.0];
pub const ARROW_SUBDIVISIONS: u32 = 4;

/// Arrow radius relative to its length.
const ARROW_RADIUS_RATIO: f64 = 1.0 / 20.0;

/// Back-end drawing primitives used by the actuators.
pub trait DrawTool {
    fn set_lighting_enabled(&mut self, enabled: bool);

    fn draw_arrow(&mut self, from: [f64; 3], to: [f64; 3], radius: f64, color: RgbaColor, subdivisions: u32);

    /// Undo state changes made since drawing started (lighting, ...).
    fn restore_last_state(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayFlags {
    pub show_interaction_force_fields: bool,
}

pub struct VisualParams<'a> {
    pub display_flags: DisplayFlags,
    pub draw_tool: &'a mut dyn DrawTool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arrow {
    pub from: [f64; 3],
    pub to: [f64; 3],
    pub radius: f64,
    pub color: RgbaColor,
    pub subdivisions: u32,
}

/// Arrow ending at `tip`, pointing along `axis`, `length` times as long as
/// `axis`.  `None` when the geometry is not finite.
pub fn arrow_to(tip: [f64; 3], axis: [f64; 3], length: f64) -> Option<Arrow> {
    let from = [
        tip[0] - axis[0] * length,
        tip[1] - axis[1] * length,
        tip[2] - axis[2] * length,
    ];
    let radius = norm3(&axis) * length.abs() * ARROW_RADIUS_RATIO;
    if from.iter().any(|v| !v.is_finite()) || !radius.is_finite() {
        return None;
    }
    Some(Arrow {
        from,
        to: tip,
        radius,
        color: FORCE_ARROW_COLOR,
        subdivisions: ARROW_SUBDIVISIONS,
    })
}

/// Records every arrow instead of rendering it.
#[derive(Debug, Clone, Default)]
pub struct ArrowRecorder {
    pub arrows: Vec<Arrow>,
    pub lighting_enabled: bool,
    saved_lighting: Vec<bool>,
}

impl DrawTool for ArrowRecorder {
    fn set_lighting_enabled(&mut self, enabled: bool) {
        self.saved_lighting.push(self.lighting_enabled);
        self.lighting_enabled = enabled;
    }

    fn draw_arrow(&mut self, from: [f64; 3], to: [f64; 3], radius: f64, color: RgbaColor, subdivisions: u32) {
        self.arrows.push(Arrow { from, to, radius, color, subdivisions });
    }

    fn restore_last_state(&mut self) {
        if let Some(previous) = self.saved_lighting.pop() {
            self.lighting_enabled = previous;
        }
    }
}
