//! Dense coarse-to-fine Lucas–Kanade.
//!
//! Both frames are pre-smoothed (gaussian, `poly_sigma`), decimated into a pyramid, and
//! flow is refined from the coarsest level down. At each level every pixel solves the 2x2
//! normal equations accumulated over a `window_size` box:
//!
//! ```text
//! | Σ Ix·Ix  Σ Ix·Iy | |dx|     | Σ Ix·It |
//! | Σ Ix·Iy  Σ Iy·Iy | |dy| = - | Σ Iy·It |
//! ```
//!
//! where `It` is the difference between the current frame warped by the running estimate and
//! the reference. Identical inputs produce `It == 0` everywhere and therefore an exactly zero
//! field.

use tracing::trace;

use crate::{
    flow::{
        FlowParams, MotionEstimator,
        pyramid::{Plane, box_sum, build_pyramid},
    },
    foundation::error::{FlowResult, ensure_size},
    frame::{Displacement, GrayFrame, MotionField},
};

/// Relative conditioning threshold below which a window is treated as textureless.
const MIN_EIGEN_RATIO: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Default)]
pub struct PyramidLucasKanade;

impl PyramidLucasKanade {
    pub fn new() -> Self {
        Self
    }
}

impl MotionEstimator for PyramidLucasKanade {
    #[tracing::instrument(level = "trace", skip_all)]
    fn estimate(
        &self,
        reference: &GrayFrame,
        current: &GrayFrame,
        params: &FlowParams,
    ) -> FlowResult<MotionField> {
        ensure_size(reference.size(), current.size())?;
        params.validate()?;

        let sigma = params.poly_sigma as f32;
        let prev = Plane::from_gray(reference).smoothed(sigma)?;
        let next = Plane::from_gray(current).smoothed(sigma)?;

        let prev_pyr = build_pyramid(prev, params.levels as usize, params.pyramid_scale)?;
        let next_pyr = build_pyramid(next, params.levels as usize, params.pyramid_scale)?;

        let radius = (params.window_size / 2) as usize;
        let coarsest = &prev_pyr[prev_pyr.len() - 1];
        let mut u = Plane::zeros(coarsest.width, coarsest.height);
        let mut v = Plane::zeros(coarsest.width, coarsest.height);

        for level in (0..prev_pyr.len()).rev() {
            let i0 = &prev_pyr[level];
            let i1 = &next_pyr[level];
            if u.width != i0.width || u.height != i0.height {
                let gain_x = i0.width as f32 / u.width as f32;
                let gain_y = i0.height as f32 / u.height as f32;
                u = upscale_flow(&u, i0.width, i0.height, gain_x);
                v = upscale_flow(&v, i0.width, i0.height, gain_y);
            }
            refine_level(i0, i1, &mut u, &mut v, radius, params.iterations as usize);
            trace!(level, width = i0.width, height = i0.height, "refined flow level");
        }

        let size = reference.size();
        Ok(MotionField::from_fn(size, |row, col| {
            let k = row * u.width + col;
            Displacement::new(v.data[k], u.data[k])
        }))
    }
}

/// Resamples a flow component to a finer grid and rescales its magnitude to match.
///
/// Flow is signed, so this stays off the `[0, 1]`-clamping image filters.
fn upscale_flow(flow: &Plane, width: usize, height: usize, gain: f32) -> Plane {
    let sx = flow.width as f32 / width as f32;
    let sy = flow.height as f32 / height as f32;
    let mut out = Plane::zeros(width, height);
    for y in 0..height {
        for x in 0..width {
            // pixel-centre alignment
            let fx = (x as f32 + 0.5) * sx - 0.5;
            let fy = (y as f32 + 0.5) * sy - 0.5;
            out.data[y * width + x] = flow.sample(fx, fy) * gain;
        }
    }
    out
}

fn gradients(img: &Plane) -> (Plane, Plane) {
    let mut gx = Plane::zeros(img.width, img.height);
    let mut gy = Plane::zeros(img.width, img.height);
    for y in 0..img.height as isize {
        for x in 0..img.width as isize {
            let k = y as usize * img.width + x as usize;
            gx.data[k] = 0.5 * (img.at_clamped(x + 1, y) - img.at_clamped(x - 1, y));
            gy.data[k] = 0.5 * (img.at_clamped(x, y + 1) - img.at_clamped(x, y - 1));
        }
    }
    (gx, gy)
}

fn product(a: &Plane, b: &Plane) -> Plane {
    Plane {
        width: a.width,
        height: a.height,
        data: a.data.iter().zip(&b.data).map(|(x, y)| x * y).collect(),
    }
}

fn refine_level(
    i0: &Plane,
    i1: &Plane,
    u: &mut Plane,
    v: &mut Plane,
    radius: usize,
    iterations: usize,
) {
    let (gx, gy) = gradients(i0);
    let sxx = box_sum(&product(&gx, &gx), radius);
    let sxy = box_sum(&product(&gx, &gy), radius);
    let syy = box_sum(&product(&gy, &gy), radius);
    let max_step = radius.max(1) as f32;

    let mut it = Plane::zeros(i0.width, i0.height);
    for _ in 0..iterations {
        for y in 0..i0.height {
            for x in 0..i0.width {
                let k = y * i0.width + x;
                let warped = i1.sample(x as f32 + u.data[k], y as f32 + v.data[k]);
                it.data[k] = warped - i0.data[k];
            }
        }
        let sxt = box_sum(&product(&gx, &it), radius);
        let syt = box_sum(&product(&gy, &it), radius);

        for k in 0..u.data.len() {
            let (a, b, c) = (sxx.data[k], sxy.data[k], syy.data[k]);
            let det = a * c - b * b;
            let trace = a + c;
            if trace <= f32::EPSILON || det <= MIN_EIGEN_RATIO * trace * trace {
                continue;
            }
            let du = (-c * sxt.data[k] + b * syt.data[k]) / det;
            let dv = (b * sxt.data[k] - a * syt.data[k]) / det;
            if !du.is_finite() || !dv.is_finite() {
                continue;
            }
            u.data[k] += du.clamp(-max_step, max_step);
            v.data[k] += dv.clamp(-max_step, max_step);
        }
    }
}
