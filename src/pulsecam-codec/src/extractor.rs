use crate::{Frame, FrameError, Sample};

/// Reduces a frame to its mean red, green, blue and luma.
pub struct ColorSampleExtractor;

impl ColorSampleExtractor {
    pub fn extract(frame: &Frame, t: u64) -> Result<Sample, FrameError> {
        if frame.is_empty() {
            return Err(FrameError::EmptyFrame);
        }

        let (mut red, mut green, mut blue) = (0_u64, 0_u64, 0_u64);
        for px in frame.pixels() {
            red += u64::from(px.r);
            green += u64::from(px.g);
            blue += u64::from(px.b);
        }

        let n = frame.pixels().len() as f64;
        Ok(Sample::from_rgb(
            red as f64 / n,
            green as f64 / n,
            blue as f64 / n,
            t,
        ))
    }

    /// Crops the centre region first, the way frames from the camera are
    /// analysed.
    pub fn extract_roi(frame: &Frame, roi_size: usize, t: u64) -> Result<Sample, FrameError> {
        Self::extract(&frame.center_roi(roi_size)?, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rgb;

    #[test]
    fn empty_frame_fails_fast() {
        let frame = Frame::new(0, 0, Vec::new()).unwrap();
        assert_eq!(
            ColorSampleExtractor::extract(&frame, 0).unwrap_err(),
            FrameError::EmptyFrame
        );
    }

    #[test]
    fn means_over_all_pixels() {
        let frame = Frame::new(
            2,
            1,
            vec![Rgb::new(200, 100, 0), Rgb::new(100, 50, 20)],
        )
        .unwrap();
        let sample = ColorSampleExtractor::extract(&frame, 3).unwrap();
        assert_eq!(sample.red, 150.0);
        assert_eq!(sample.green, 75.0);
        assert_eq!(sample.blue, 10.0);
        assert_eq!(sample.t, 3);

        let expected = 0.299 * 150.0 + 0.587 * 75.0 + 0.114 * 10.0;
        assert!((sample.brightness - expected).abs() < 1e-9);
    }

    #[test]
    fn roi_ignores_the_border() {
        // Bright red centre pixel surrounded by black.
        let mut pixels = vec![Rgb::default(); 9];
        pixels[4] = Rgb::new(240, 30, 10);
        let frame = Frame::new(3, 3, pixels).unwrap();

        let sample = ColorSampleExtractor::extract_roi(&frame, 1, 0);
        assert_eq!(sample.unwrap_err(), FrameError::InvalidRoi);

        let sample = ColorSampleExtractor::extract_roi(&frame, 2, 0).unwrap();
        // 2x2 window starting at (0,0): one lit pixel out of four.
        assert_eq!(sample.red, 60.0);
    }
}
