use std::time::Duration;

use crate::foundation::error::{FlowError, FlowResult};

/// Working raster size in pixels. Fixed for the lifetime of an effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn validate(self) -> FlowResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FlowError::validation("frame width/height must be non-zero"));
        }
        Ok(())
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of `(row, col)`.
    pub fn index(self, row: usize, col: usize) -> usize {
        row * self.width as usize + col
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::square(256)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> FlowResult<Self> {
        if den == 0 {
            return Err(FlowError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(FlowError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration(self) -> Duration {
        Duration::from_nanos(u64::from(self.den) * 1_000_000_000 / u64::from(self.num))
    }

    /// Nearest whole rate, at least 1.
    pub fn rounded(self) -> u32 {
        (self.as_f64().round() as u32).max(1)
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 60, den: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_index_is_row_major() {
        let s = FrameSize::new(4, 3);
        assert_eq!(s.index(0, 0), 0);
        assert_eq!(s.index(0, 3), 3);
        assert_eq!(s.index(1, 0), 4);
        assert_eq!(s.index(2, 3), 11);
        assert_eq!(s.pixel_count(), 12);
    }

    #[test]
    fn frame_size_rejects_zero() {
        assert!(FrameSize::new(0, 4).validate().is_err());
        assert!(FrameSize::new(4, 0).validate().is_err());
        FrameSize::default().validate().unwrap();
    }

    #[test]
    fn fps_rejects_zero_parts() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 0).is_err());
    }

    #[test]
    fn fps_rounding_and_period() {
        let ntsc = Fps::new(30_000, 1001).unwrap();
        assert_eq!(ntsc.rounded(), 30);
        let fps = Fps::new(50, 1).unwrap();
        assert_eq!(fps.frame_duration(), Duration::from_millis(20));
    }
}
