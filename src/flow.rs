//! Motion estimation contract and the estimators shipped with the crate.

pub mod lucas_kanade;
pub mod pyramid;

use crate::{
    foundation::error::{FlowError, FlowResult, ensure_size},
    frame::{GrayFrame, MotionField},
};

pub use lucas_kanade::PyramidLucasKanade;

/// Fixed estimator parameters. These are configuration constants, never derived at runtime.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FlowParams {
    /// Ratio between consecutive pyramid levels, in (0, 1).
    pub pyramid_scale: f64,
    /// Pyramid levels including the full-resolution one.
    pub levels: u32,
    /// Side of the averaging window.
    pub window_size: u32,
    /// Refinement iterations per level.
    pub iterations: u32,
    /// Pre-smoothing neighborhood size (odd). Checked but not applied: the blur derives its
    /// extent from `poly_sigma`.
    pub poly_n: u32,
    /// Pre-smoothing gaussian sigma.
    pub poly_sigma: f64,
    pub flags: u32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            pyramid_scale: 0.5,
            levels: 3,
            window_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
            flags: 0,
        }
    }
}

impl FlowParams {
    pub fn validate(&self) -> FlowResult<()> {
        if !(self.pyramid_scale > 0.0 && self.pyramid_scale < 1.0) {
            return Err(FlowError::validation("pyramid_scale must be in (0, 1)"));
        }
        if self.levels == 0 {
            return Err(FlowError::validation("levels must be >= 1"));
        }
        if self.window_size < 3 {
            return Err(FlowError::validation("window_size must be >= 3"));
        }
        if self.iterations == 0 {
            return Err(FlowError::validation("iterations must be >= 1"));
        }
        if self.poly_n < 3 || self.poly_n.is_multiple_of(2) {
            return Err(FlowError::validation("poly_n must be odd and >= 3"));
        }
        if !self.poly_sigma.is_finite() || self.poly_sigma <= 0.0 {
            return Err(FlowError::validation("poly_sigma must be > 0"));
        }
        if self.flags != 0 {
            return Err(FlowError::validation(format!(
                "unsupported flow flags {:#x}",
                self.flags
            )));
        }
        Ok(())
    }
}

/// Dense motion between two frames of the same size.
pub trait MotionEstimator {
    /// Motion from `reference` to `current`, one `(dy, dx)` per pixel.
    fn estimate(
        &self,
        reference: &GrayFrame,
        current: &GrayFrame,
        params: &FlowParams,
    ) -> FlowResult<MotionField>;
}

impl<T: MotionEstimator + ?Sized> MotionEstimator for Box<T> {
    fn estimate(
        &self,
        reference: &GrayFrame,
        current: &GrayFrame,
        params: &FlowParams,
    ) -> FlowResult<MotionField> {
        (**self).estimate(reference, current, params)
    }
}

/// Reports no motion anywhere. Useful for tests and for freezing the effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroMotion;

impl MotionEstimator for ZeroMotion {
    fn estimate(
        &self,
        reference: &GrayFrame,
        current: &GrayFrame,
        _params: &FlowParams,
    ) -> FlowResult<MotionField> {
        ensure_size(reference.size(), current.size())?;
        Ok(MotionField::zeros(reference.size()))
    }
}
