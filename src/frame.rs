use crate::foundation::{
    core::FrameSize,
    error::{FlowError, FlowResult},
};

/// Single-channel 8-bit intensity frame, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    size: FrameSize,
    data: Vec<u8>,
}

impl GrayFrame {
    pub fn new(size: FrameSize, data: Vec<u8>) -> FlowResult<Self> {
        size.validate()?;
        if data.len() != size.pixel_count() {
            return Err(FlowError::validation(format!(
                "gray frame data has {} bytes, expected {} for {size}",
                data.len(),
                size.pixel_count()
            )));
        }
        Ok(Self { size, data })
    }

    pub fn filled(size: FrameSize, value: u8) -> Self {
        Self {
            size,
            data: vec![value; size.pixel_count()],
        }
    }

    pub fn from_fn(size: FrameSize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(size.pixel_count());
        for row in 0..size.height as usize {
            for col in 0..size.width as usize {
                data.push(f(row, col));
            }
        }
        Self { size, data }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[self.size.index(row, col)]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Straight-alpha RGBA8 raster, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    size: FrameSize,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(size: FrameSize, data: Vec<u8>) -> FlowResult<Self> {
        size.validate()?;
        let expected = size
            .pixel_count()
            .checked_mul(4)
            .ok_or_else(|| FlowError::validation("pixel buffer size overflow"))?;
        if data.len() != expected {
            return Err(FlowError::validation(format!(
                "pixel buffer data has {} bytes, expected {expected} for {size}",
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    pub fn filled(size: FrameSize, rgba: [u8; 4]) -> Self {
        Self {
            size,
            data: rgba.repeat(size.pixel_count()),
        }
    }

    pub fn from_fn(size: FrameSize, mut f: impl FnMut(usize, usize) -> [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(size.pixel_count() * 4);
        for row in 0..size.height as usize {
            for col in 0..size.width as usize {
                data.extend_from_slice(&f(row, col));
            }
        }
        Self { size, data }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn pixel(&self, row: usize, col: usize) -> [u8; 4] {
        let i = self.size.index(row, col) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, row: usize, col: usize, rgba: [u8; 4]) {
        let i = self.size.index(row, col) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn to_rgba_image(&self) -> FlowResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.size.width, self.size.height, self.data.clone())
            .ok_or_else(|| FlowError::validation("pixel buffer does not fit an RGBA image"))
    }

    pub fn from_rgba_image(img: image::RgbaImage) -> FlowResult<Self> {
        let (width, height) = img.dimensions();
        Self::new(FrameSize::new(width, height), img.into_raw())
    }
}

/// Per-pixel displacement: row delta then column delta.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Displacement {
    pub dy: f32,
    pub dx: f32,
}

impl Displacement {
    pub const ZERO: Self = Self { dy: 0.0, dx: 0.0 };

    pub const fn new(dy: f32, dx: f32) -> Self {
        Self { dy, dx }
    }

    pub fn magnitude(self) -> f32 {
        (self.dy * self.dy + self.dx * self.dx).sqrt()
    }
}

/// Dense motion from a reference frame to the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionField {
    size: FrameSize,
    cells: Vec<Displacement>,
}

impl MotionField {
    pub fn zeros(size: FrameSize) -> Self {
        Self {
            size,
            cells: vec![Displacement::ZERO; size.pixel_count()],
        }
    }

    pub fn new(size: FrameSize, cells: Vec<Displacement>) -> FlowResult<Self> {
        size.validate()?;
        if cells.len() != size.pixel_count() {
            return Err(FlowError::validation(format!(
                "motion field has {} cells, expected {} for {size}",
                cells.len(),
                size.pixel_count()
            )));
        }
        Ok(Self { size, cells })
    }

    pub fn from_fn(size: FrameSize, mut f: impl FnMut(usize, usize) -> Displacement) -> Self {
        let mut cells = Vec::with_capacity(size.pixel_count());
        for row in 0..size.height as usize {
            for col in 0..size.width as usize {
                cells.push(f(row, col));
            }
        }
        Self { size, cells }
    }

    /// Builds a field from row-major `(dy, dx)` rows. Handy for small literal fields.
    pub fn from_rows(rows: &[&[(f32, f32)]]) -> FlowResult<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != width) {
            return Err(FlowError::validation("motion field rows must have equal length"));
        }
        let cells = rows
            .iter()
            .flat_map(|r| r.iter().map(|&(dy, dx)| Displacement::new(dy, dx)))
            .collect();
        Self::new(FrameSize::new(width as u32, height as u32), cells)
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> Displacement {
        self.cells[self.size.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, d: Displacement) {
        let i = self.size.index(row, col);
        self.cells[i] = d;
    }

    pub fn cells(&self) -> &[Displacement] {
        &self.cells
    }

    pub fn max_magnitude(&self) -> f32 {
        self.cells
            .iter()
            .map(|d| d.magnitude())
            .fold(0.0, f32::max)
    }

    pub fn mean_motion(&self) -> Displacement {
        if self.cells.is_empty() {
            return Displacement::ZERO;
        }
        let n = self.cells.len() as f32;
        let (sy, sx) = self
            .cells
            .iter()
            .fold((0.0f32, 0.0f32), |(sy, sx), d| (sy + d.dy, sx + d.dx));
        Displacement::new(sy / n, sx / n)
    }

    pub fn is_static(&self, threshold: f32) -> bool {
        self.max_magnitude() <= threshold
    }
}
