//! Forward (scatter) warping of the persistent pixel buffer.
//!
//! Each source pixel is copied to `(i + round(dy), j + round(dx))`. Sources are visited in
//! row-major order and always read from an untouched snapshot of the input, so a pixel that was
//! already overwritten this pass is never re-scattered. Collisions resolve to the last write in
//! scan order. Pixels whose displacement rounds to zero stay where they are without writing, so
//! they never undo an arrival. Destinations nobody writes to keep their previous value.

use crate::{
    foundation::error::{FlowResult, ensure_size},
    frame::{MotionField, PixelBuffer},
};

/// What happens to a destination that lands outside the grid.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    /// Discard the write.
    #[default]
    Drop,
    /// Pin the destination to the nearest edge row/column.
    Clamp,
    /// Wrap around modulo the grid size.
    Wrap,
}

impl BoundsPolicy {
    /// Maps a possibly out-of-range coordinate into `[0, len)`, or `None` to drop it.
    pub fn resolve(self, v: i64, len: usize) -> Option<usize> {
        let n = len as i64;
        if (0..n).contains(&v) {
            return Some(v as usize);
        }
        match self {
            Self::Drop => None,
            Self::Clamp => Some(v.clamp(0, n - 1) as usize),
            Self::Wrap => Some(v.rem_euclid(n) as usize),
        }
    }
}

impl std::str::FromStr for BoundsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "clamp" => Ok(Self::Clamp),
            "wrap" => Ok(Self::Wrap),
            other => Err(format!("unknown bounds policy '{other}' (drop|clamp|wrap)")),
        }
    }
}

fn round_offset(v: f32) -> i64 {
    if v.is_finite() { v.round() as i64 } else { 0 }
}

/// Scatters `buffer` along `field` and returns the next buffer state.
pub fn forward_warp(
    buffer: &PixelBuffer,
    field: &MotionField,
    bounds: BoundsPolicy,
) -> FlowResult<PixelBuffer> {
    ensure_size(buffer.size(), field.size())?;

    let size = buffer.size();
    let (height, width) = (size.height as usize, size.width as usize);
    let src = buffer.as_raw();
    let mut out = buffer.clone();
    let dst = out.as_raw_mut();

    for i in 0..height {
        for j in 0..width {
            let d = field.get(i, j);
            let (dy, dx) = (round_offset(d.dy), round_offset(d.dx));
            if dy == 0 && dx == 0 {
                continue;
            }
            let Some(ii) = bounds.resolve((i as i64).saturating_add(dy), height) else {
                continue;
            };
            let Some(jj) = bounds.resolve((j as i64).saturating_add(dx), width) else {
                continue;
            };
            let s = (i * width + j) * 4;
            let t = (ii * width + jj) * 4;
            dst[t..t + 4].copy_from_slice(&src[s..s + 4]);
        }
    }

    Ok(out)
}
