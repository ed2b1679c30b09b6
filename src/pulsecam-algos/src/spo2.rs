use serde::{Deserialize, Serialize};

use crate::{
    PpgConfig, SignalConditioner,
    helpers::stats::{mean, median, peak_to_peak},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spo2Config {
    pub min_samples: usize,
    pub window: usize,
    pub min_window: usize,
    pub min_ratio: f64,
    pub max_ratio: f64,
    /// Linear calibration `intercept - slope * ratio`, empirical.
    pub intercept: f64,
    pub slope: f64,
    pub ceiling: f64,
    /// Readings below this are treated as sensor error.
    pub floor: f64,
    pub floor_substitute: f64,
    /// Reported when the buffers are too short to measure.
    pub placeholder: f64,
}

impl Default for Spo2Config {
    fn default() -> Self {
        Self {
            min_samples: 30,
            window: 30,
            min_window: 10,
            min_ratio: 0.4,
            max_ratio: 2.0,
            intercept: 104.0,
            slope: 17.0,
            ceiling: 100.0,
            floor: 90.0,
            floor_substitute: 95.0,
            placeholder: 98.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spo2Source {
    Placeholder,
    /// Median over this many accepted windows.
    Windowed { windows: usize },
    WholeSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spo2Reading {
    pub percentage: f64,
    pub ratio: Option<f64>,
    pub source: Spo2Source,
}

/// Ratio-of-ratios estimate using green as the second wavelength.
#[derive(Debug, Clone)]
pub struct OxygenSaturationEstimator {
    config: Spo2Config,
    conditioner: SignalConditioner,
}

impl OxygenSaturationEstimator {
    pub fn new(config: &PpgConfig) -> Self {
        Self {
            config: config.spo2.clone(),
            conditioner: SignalConditioner::new(config.conditioner.clone()),
        }
    }

    pub fn estimate(&self, red: &[f64], green: &[f64]) -> Spo2Reading {
        if red.len() < self.config.min_samples || green.len() < self.config.min_samples {
            return Spo2Reading {
                percentage: self.config.placeholder,
                ratio: None,
                source: Spo2Source::Placeholder,
            };
        }

        let red = self.conditioner.condition(red);
        let green = self.conditioner.condition(green);
        let (ratio, source) = self.ratio_of_ratios(&red, &green);
        let percentage = self.to_percentage(ratio);
        debug!("spo2 ratio {ratio:.3} from {source:?} -> {percentage:.1}%");

        Spo2Reading {
            percentage,
            ratio: Some(ratio),
            source,
        }
    }

    /// Median of the per-window ratios that fall in the plausible band,
    /// falling back to one ratio over the whole buffers.
    pub fn ratio_of_ratios(&self, red: &[f64], green: &[f64]) -> (f64, Spo2Source) {
        let n = red.len().min(green.len());
        let window = self.config.window.min(n / 3).max(1);

        let full_windows = if window >= self.config.min_window {
            n / window
        } else {
            0
        };

        // trailing samples short of a full window are not scored
        let ratios: Vec<f64> = (0..full_windows)
            .map(|k| k * window..(k + 1) * window)
            .filter_map(|range| window_ratio(&red[range.clone()], &green[range]))
            .filter(|r| *r > self.config.min_ratio && *r < self.config.max_ratio)
            .collect();

        match median(&ratios) {
            Some(ratio) => (ratio, Spo2Source::Windowed { windows: ratios.len() }),
            None => (whole_signal_ratio(&red[..n], &green[..n]), Spo2Source::WholeSignal),
        }
    }

    pub fn to_percentage(&self, ratio: f64) -> f64 {
        let spo2 = self.config.intercept - self.config.slope * ratio;
        if spo2.is_nan() || spo2 < self.config.floor {
            self.config.floor_substitute
        } else {
            spo2.min(self.config.ceiling)
        }
    }
}

/// AC/DC of red over AC/DC of green, when all four are positive.
fn window_ratio(red: &[f64], green: &[f64]) -> Option<f64> {
    let (red_ac, red_dc) = (peak_to_peak(red), mean(red));
    let (green_ac, green_dc) = (peak_to_peak(green), mean(green));
    if red_ac > 0.0 && red_dc > 0.0 && green_ac > 0.0 && green_dc > 0.0 {
        Some((red_ac / red_dc) / (green_ac / green_dc))
    } else {
        None
    }
}

fn whole_signal_ratio(red: &[f64], green: &[f64]) -> f64 {
    let ac_dc = |signal: &[f64]| {
        let dc = mean(signal);
        if dc != 0.0 { peak_to_peak(signal) / dc } else { 0_f64 }
    };

    let (red, green) = (ac_dc(red), ac_dc(green));
    let ratio = if green != 0.0 { red / green } else { 0_f64 };
    if ratio.is_finite() { ratio } else { 0_f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::{noisy_sinusoid, sinusoid};

    fn estimator() -> OxygenSaturationEstimator {
        OxygenSaturationEstimator::new(&PpgConfig::default())
    }

    #[test]
    fn short_buffers_get_placeholder() {
        let red = sinusoid(1.2, 20.0, 170.0, 29, 30.0);
        let green = sinusoid(1.2, 6.0, 80.0, 100, 30.0);
        let reading = estimator().estimate(&red, &green);
        assert_eq!(reading.percentage, 98.0);
        assert_eq!(reading.source, Spo2Source::Placeholder);
        assert_eq!(reading.ratio, None);
    }

    #[test]
    fn calibration_curve() {
        let estimator = estimator();
        assert!((estimator.to_percentage(0.5) - 95.5).abs() < 1e-9);
        assert!((estimator.to_percentage(0.6) - 93.8).abs() < 1e-9);
        assert_eq!(estimator.to_percentage(0.0), 100.0);
        // below 90 is read as a sensor error
        assert_eq!(estimator.to_percentage(1.0), 95.0);
        assert_eq!(estimator.to_percentage(f64::NAN), 95.0);
    }

    #[test]
    fn windowed_ratio_uses_median() {
        let red = sinusoid(1.2, 3.0, 100.0, 300, 30.0);
        let green = sinusoid(1.2, 10.0, 200.0, 300, 30.0);
        let (ratio, source) = estimator().ratio_of_ratios(&red, &green);
        assert!((ratio - 0.6).abs() < 0.02, "ratio {ratio}");
        assert_eq!(source, Spo2Source::Windowed { windows: 10 });
    }

    #[test]
    fn partial_trailing_window_is_ignored() {
        let red = sinusoid(1.2, 3.0, 100.0, 100, 30.0);
        let green = sinusoid(1.2, 10.0, 200.0, 100, 30.0);
        let (ratio, source) = estimator().ratio_of_ratios(&red, &green);
        assert!((ratio - 0.6).abs() < 0.02, "ratio {ratio}");
        assert_eq!(source, Spo2Source::Windowed { windows: 3 });
    }

    #[test]
    fn falls_back_to_whole_signal() {
        // a negative baseline never yields a positive DC
        let red = sinusoid(1.2, 3.0, -50.0, 90, 30.0);
        let green = sinusoid(1.2, 10.0, 200.0, 90, 30.0);
        let (_, source) = estimator().ratio_of_ratios(&red, &green);
        assert_eq!(source, Spo2Source::WholeSignal);
    }

    #[test]
    fn readings_stay_in_band() {
        let estimator = estimator();
        for seed in 0..30 {
            let red = noisy_sinusoid(1.1, 15.0, 170.0, 300, 30.0, 3.0, seed);
            let green = noisy_sinusoid(1.1, 5.0, 80.0, 300, 30.0, 3.0, seed + 100);
            let reading = estimator.estimate(&red, &green);
            assert!(
                (90.0..=100.0).contains(&reading.percentage),
                "seed {seed}: {reading:?}"
            );
        }
    }
}
