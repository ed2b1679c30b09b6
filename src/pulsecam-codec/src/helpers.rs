use crate::{FrameError, Rgb};

pub(crate) trait PixelUnpack {
    fn unpack_rgb(&self) -> Vec<Rgb>;
}

impl PixelUnpack for [u8] {
    fn unpack_rgb(&self) -> Vec<Rgb> {
        self.chunks_exact(3)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
            .collect()
    }
}

impl PixelUnpack for [u32] {
    /// Packed `0xAARRGGBB` pixels, alpha ignored.
    fn unpack_rgb(&self) -> Vec<Rgb> {
        self.iter()
            .map(|&argb| {
                Rgb::new(
                    ((argb >> 16) & 0xFF) as u8,
                    ((argb >> 8) & 0xFF) as u8,
                    (argb & 0xFF) as u8,
                )
            })
            .collect()
    }
}

pub(crate) fn expect_len(expected: usize, actual: usize) -> Result<(), FrameError> {
    if expected != actual {
        return Err(FrameError::BufferSizeMismatch { expected, actual });
    }
    Ok(())
}

/// `width * height * channels` must equal `actual`. Dimensions whose product
/// overflows can never match a real buffer.
pub(crate) fn expect_dims(
    width: usize,
    height: usize,
    channels: usize,
    actual: usize,
) -> Result<(), FrameError> {
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or(FrameError::BufferSizeMismatch {
            expected: usize::MAX,
            actual,
        })?;
    expect_len(expected, actual)
}
