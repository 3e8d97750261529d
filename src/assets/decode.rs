use std::path::Path;

use anyhow::Context;
use image::{RgbaImage, imageops::FilterType};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    foundation::{core::FrameSize, error::FlowResult},
    frame::PixelBuffer,
};

/// Source rectangle `(x, y, width, height)` that covers `target` with the source's aspect ratio
/// preserved: the longer side is cropped symmetrically.
pub fn cover_crop_rect(src_width: u32, src_height: u32, target: FrameSize) -> (u32, u32, u32, u32) {
    let target_ratio = f64::from(target.width) / f64::from(target.height);
    let current_ratio = f64::from(src_width) / f64::from(src_height);

    let mut crop_w = f64::from(src_width);
    let mut crop_h = f64::from(src_height);
    if target_ratio > current_ratio {
        crop_h = crop_w / target_ratio;
    } else if target_ratio < current_ratio {
        crop_w = target_ratio * crop_h;
    }

    let crop_w = (crop_w.round() as u32).clamp(1, src_width);
    let crop_h = (crop_h.round() as u32).clamp(1, src_height);
    let x = (src_width - crop_w) / 2;
    let y = (src_height - crop_h) / 2;
    (x, y, crop_w, crop_h)
}

/// Centre-crops `img` to the aspect ratio of `size`, then scales it to exactly `size`.
pub fn fit_to_size(img: &RgbaImage, size: FrameSize) -> FlowResult<PixelBuffer> {
    size.validate()?;
    let (w, h) = img.dimensions();
    let (x, y, cw, ch) = cover_crop_rect(w, h, size);
    let cropped = image::imageops::crop_imm(img, x, y, cw, ch).to_image();
    let scaled = if (cw, ch) == (size.width, size.height) {
        cropped
    } else {
        image::imageops::resize(&cropped, size.width, size.height, FilterType::Triangle)
    };
    PixelBuffer::from_rgba_image(scaled)
}

pub fn decode_still_image(bytes: &[u8], size: FrameSize) -> FlowResult<PixelBuffer> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    fit_to_size(&dyn_img.to_rgba8(), size)
}

pub fn load_still_image(path: &Path, size: FrameSize) -> FlowResult<PixelBuffer> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    decode_still_image(&bytes, size)
}

/// A locally generated stand-in for "any picture": a two-colour vertical gradient with a
/// scattering of opaque rectangles. Same seed, same image.
pub fn random_still_image(size: FrameSize, seed: u64) -> FlowResult<PixelBuffer> {
    size.validate()?;
    let mut rng = StdRng::seed_from_u64(seed);
    let top: [u8; 3] = rng.random();
    let bottom: [u8; 3] = rng.random();

    let h = size.height.max(2) as f32 - 1.0;
    let mut buf = PixelBuffer::from_fn(size, |row, _| {
        let t = row as f32 / h;
        let mix = |a: u8, b: u8| (f32::from(a) * (1.0 - t) + f32::from(b) * t).round() as u8;
        [
            mix(top[0], bottom[0]),
            mix(top[1], bottom[1]),
            mix(top[2], bottom[2]),
            255,
        ]
    });

    let rects = 8 + rng.random_range(0..8u32);
    for _ in 0..rects {
        let rw = rng.random_range(1..=size.width.div_ceil(3));
        let rh = rng.random_range(1..=size.height.div_ceil(3));
        let x0 = rng.random_range(0..size.width);
        let y0 = rng.random_range(0..size.height);
        let [r, g, b]: [u8; 3] = rng.random();
        for row in y0..(y0 + rh).min(size.height) {
            for col in x0..(x0 + rw).min(size.width) {
                buf.set_pixel(row as usize, col as usize, [r, g, b, 255]);
            }
        }
    }
    Ok(buf)
}
