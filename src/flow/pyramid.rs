//! Float planes for the estimator, with smoothing and decimation delegated to `image::imageops`.

use image::{ImageBuffer, Luma, imageops};

use crate::{
    foundation::error::{FlowError, FlowResult},
    frame::GrayFrame,
};

/// Smallest side a pyramid level may have.
pub const MIN_LEVEL_SIDE: usize = 8;

/// `imageops` clamps f32 samples to `[0, 1]`, so intensity planes are stored normalized.
type LumaF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Single-channel f32 image used by the estimator.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Intensities scaled into `[0, 1]`.
    pub fn from_gray(frame: &GrayFrame) -> Self {
        let size = frame.size();
        Self {
            width: size.width as usize,
            height: size.height as usize,
            data: frame
                .as_slice()
                .iter()
                .map(|&v| f32::from(v) / 255.0)
                .collect(),
        }
    }

    fn from_image(img: LumaF32) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width: width as usize,
            height: height as usize,
            data: img.into_raw(),
        }
    }

    fn to_image(&self) -> FlowResult<LumaF32> {
        ImageBuffer::from_raw(self.width as u32, self.height as u32, self.data.clone())
            .ok_or_else(|| FlowError::validation("plane data does not match its dimensions"))
    }

    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Border-clamped read.
    pub fn at_clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.at(cx, cy)
    }

    /// Bilinear sample with clamped borders. Integer coordinates return the stored value exactly.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as usize, y0 as usize);
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Gaussian blur; `imageops::blur` sizes the kernel from `sigma`.
    pub fn smoothed(&self, sigma: f32) -> FlowResult<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(FlowError::validation("gaussian sigma must be > 0"));
        }
        Ok(Self::from_image(imageops::blur(&self.to_image()?, sigma)))
    }

    /// Triangle-filtered resample, which also low-passes when shrinking.
    pub fn resized(&self, width: usize, height: usize) -> FlowResult<Self> {
        let img = self.to_image()?;
        Ok(Self::from_image(imageops::resize(
            &img,
            width as u32,
            height as u32,
            imageops::FilterType::Triangle,
        )))
    }
}

/// Windowed sum over a `(2 * radius + 1)^2` box. The window is cut at the borders.
///
/// Accumulates the normal-equation terms, so it works on a summed-area table rather than on
/// `[0, 1]`-clamped image filters.
pub fn box_sum(src: &Plane, radius: usize) -> Plane {
    let (w, h) = (src.width, src.height);
    let stride = w + 1;
    let mut table = vec![0.0f64; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0.0f64;
        for x in 0..w {
            row += f64::from(src.at(x, y));
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
        }
    }

    let mut out = Plane::zeros(w, h);
    for y in 0..h {
        let (y0, y1) = (y.saturating_sub(radius), (y + radius + 1).min(h));
        for x in 0..w {
            let (x0, x1) = (x.saturating_sub(radius), (x + radius + 1).min(w));
            let sum = table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
                + table[y0 * stride + x0];
            out.data[y * w + x] = sum as f32;
        }
    }
    out
}

/// Finest level first; each coarser level is the previous one resized by `scale`.
/// Stops early once a level would drop below [`MIN_LEVEL_SIDE`].
pub fn build_pyramid(base: Plane, levels: usize, scale: f64) -> FlowResult<Vec<Plane>> {
    if !(scale > 0.0 && scale < 1.0) {
        return Err(FlowError::validation("pyramid scale must be in (0, 1)"));
    }

    let mut out = vec![base];
    while out.len() < levels.max(1) {
        let Some(prev) = out.last() else { break };
        let w = (prev.width as f64 * scale).round() as usize;
        let h = (prev.height as f64 * scale).round() as usize;
        if w < MIN_LEVEL_SIDE || h < MIN_LEVEL_SIDE {
            break;
        }
        let next = prev.resized(w, h)?;
        out.push(next);
    }
    Ok(out)
}
