use crate::{
    foundation::{
        core::FrameSize,
        error::{FlowError, FlowResult},
    },
    frame::{GrayFrame, PixelBuffer},
};

// BT.601 luma weights in Q14 (0.299, 0.587, 0.114); they sum to 1 << 14.
const R_Q14: u32 = 4899;
const G_Q14: u32 = 9617;
const B_Q14: u32 = 1868;

pub fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    let y = u32::from(r) * R_Q14 + u32::from(g) * G_Q14 + u32::from(b) * B_Q14;
    ((y + (1 << 13)) >> 14).min(255) as u8
}

/// Converts tightly packed RGBA8 to a gray frame. Alpha is ignored.
pub fn gray_from_rgba8(size: FrameSize, rgba: &[u8]) -> FlowResult<GrayFrame> {
    if rgba.len() != size.pixel_count() * 4 {
        return Err(FlowError::validation(format!(
            "gray_from_rgba8 expects {} bytes for {size}, got {}",
            size.pixel_count() * 4,
            rgba.len()
        )));
    }
    let data = rgba
        .chunks_exact(4)
        .map(|px| luma_u8(px[0], px[1], px[2]))
        .collect();
    GrayFrame::new(size, data)
}

pub fn gray_from_pixels(buffer: &PixelBuffer) -> FlowResult<GrayFrame> {
    gray_from_rgba8(buffer.size(), buffer.as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_extremes_are_exact() {
        assert_eq!(luma_u8(0, 0, 0), 0);
        assert_eq!(luma_u8(255, 255, 255), 255);
    }

    #[test]
    fn luma_follows_bt601_weights() {
        assert_eq!(luma_u8(255, 0, 0), 76);
        assert_eq!(luma_u8(0, 255, 0), 150);
        assert_eq!(luma_u8(0, 0, 255), 29);
    }

    #[test]
    fn gray_from_pixels_ignores_alpha() {
        let size = FrameSize::new(2, 1);
        let buf = PixelBuffer::new(size, vec![10, 10, 10, 0, 200, 200, 200, 255]).unwrap();
        let gray = gray_from_pixels(&buf).unwrap();
        assert_eq!(gray.as_slice(), &[10, 200]);
    }

    #[test]
    fn gray_from_rgba8_rejects_short_input() {
        assert!(gray_from_rgba8(FrameSize::new(2, 2), &[0; 12]).is_err());
    }
}
