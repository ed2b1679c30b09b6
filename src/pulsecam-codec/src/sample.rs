/// Per-frame colour means. `t` is the frame index within the session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub brightness: f64,
    pub t: u64,
}

impl Sample {
    /// ITU-R BT.601 luma weights.
    pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

    /// Builds a sample from channel means, deriving brightness from them.
    pub fn from_rgb(red: f64, green: f64, blue: f64, t: u64) -> Self {
        Self {
            red,
            green,
            blue,
            brightness: Self::luma(red, green, blue),
            t,
        }
    }

    pub fn luma(red: f64, green: f64, blue: f64) -> f64 {
        let [wr, wg, wb] = Self::LUMA_WEIGHTS;
        wr * red + wg * green + wb * blue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_of_white_is_white() {
        assert!((Sample::luma(255.0, 255.0, 255.0) - 255.0).abs() < 1e-9);
    }

    #[test]
    fn from_rgb_fills_brightness() {
        let sample = Sample::from_rgb(200.0, 100.0, 50.0, 7);
        let expected = 0.299 * 200.0 + 0.587 * 100.0 + 0.114 * 50.0;
        assert!((sample.brightness - expected).abs() < 1e-9);
        assert_eq!(sample.t, 7);
    }

    #[test]
    fn json_shape() {
        let sample = Sample::from_rgb(1.0, 2.0, 3.0, 4);
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["red"], 1.0);
        assert_eq!(json["t"], 4);
    }
}
