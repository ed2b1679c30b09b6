use crate::{
    FrameError,
    helpers::{PixelUnpack, expect_dims},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Decoded camera frame (or a region of it), stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Frame {
    /// Side of the square region cropped from the frame centre, where the
    /// fingertip is expected to sit over the lens.
    pub const DEFAULT_ROI_SIZE: usize = 200;

    pub fn new(width: usize, height: usize, pixels: Vec<Rgb>) -> Result<Self, FrameError> {
        expect_dims(width, height, 1, pixels.len())?;
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Tightly packed 8-bit RGB triplets.
    pub fn from_rgb_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, FrameError> {
        expect_dims(width, height, 3, bytes.len())?;
        Self::new(width, height, bytes.unpack_rgb())
    }

    /// Packed `0xAARRGGBB` pixels as handed out by most bitmap APIs.
    pub fn from_argb(width: usize, height: usize, pixels: &[u32]) -> Result<Self, FrameError> {
        expect_dims(width, height, 1, pixels.len())?;
        Self::new(width, height, pixels.unpack_rgb())
    }

    pub fn from_rows(rows: Vec<Vec<Rgb>>) -> Result<Self, FrameError> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or_default();

        let mut pixels = Vec::with_capacity(width.saturating_mul(height));
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != width {
                return Err(FrameError::RaggedRows {
                    row,
                    expected: width,
                    actual: values.len(),
                });
            }
            pixels.extend(values);
        }

        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Crops a `size`x`size` square around the centre, clipped to the frame.
    pub fn center_roi(&self, size: usize) -> Result<Self, FrameError> {
        if self.is_empty() {
            return Err(FrameError::EmptyFrame);
        }
        if size == 0 {
            return Err(FrameError::InvalidRoi);
        }

        let half = size / 2;
        let (cx, cy) = (self.width / 2, self.height / 2);
        let left = cx.saturating_sub(half);
        let top = cy.saturating_sub(half);
        let right = (cx + half).min(self.width);
        let bottom = (cy + half).min(self.height);

        if right <= left || bottom <= top {
            return Err(FrameError::InvalidRoi);
        }

        let pixels = (top..bottom)
            .flat_map(|y| {
                let start = y * self.width;
                self.pixels[start + left..start + right].iter().copied()
            })
            .collect();

        Self::new(right - left, bottom - top, pixels)
    }
}
