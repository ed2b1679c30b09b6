use pulsecam_codec::Sample;
use pulsecam_types::SignalQuality;
use serde::{Deserialize, Serialize};

use crate::helpers::stats::{mean, mean_abs_diff, peak_to_peak, snr};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_samples: usize,
    pub amplitude_scale: f64,
    pub amplitude_weight: f64,
    pub snr_scale: f64,
    pub snr_weight: f64,
    pub variation_scale: f64,
    pub variation_weight: f64,

    pub too_dark_brightness: f64,
    pub too_bright_brightness: f64,
    /// Frame-to-frame red change regarded as motion.
    pub motion_threshold: f64,
    pub motion_window: usize,
    pub snr_window: usize,
    pub min_strength: f64,
    pub good_strength: f64,
    pub fair_strength: f64,
    pub good_snr: f64,
    pub fair_snr: f64,
    pub good_motion_fraction: f64,
    pub fair_motion_fraction: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            amplitude_scale: 200.0,
            amplitude_weight: 0.5,
            snr_scale: 8.0,
            snr_weight: 0.35,
            variation_scale: 70.0,
            variation_weight: 0.15,

            too_dark_brightness: 20.0,
            too_bright_brightness: 240.0,
            motion_threshold: 20.0,
            motion_window: 5,
            snr_window: 10,
            min_strength: 25.0,
            good_strength: 40.0,
            fair_strength: 30.0,
            good_snr: 1.5,
            fair_snr: 1.2,
            good_motion_fraction: 0.7,
            fair_motion_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityScore {
    InsufficientData,
    Score(f64),
}

impl QualityScore {
    pub fn value(self) -> f64 {
        match self {
            QualityScore::InsufficientData => 0_f64,
            QualityScore::Score(score) => score,
        }
    }

    pub fn is_sufficient(self) -> bool {
        matches!(self, QualityScore::Score(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    config: QualityConfig,
}

impl QualityAssessor {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Blend of pulsatile amplitude, mean/deviation ratio and smoothness.
    pub fn score(&self, signal: &[f64]) -> QualityScore {
        if signal.len() < self.config.min_samples {
            return QualityScore::InsufficientData;
        }

        let c = &self.config;
        let amplitude = (peak_to_peak(signal) / c.amplitude_scale).clamp(0.0, 1.0);
        let snr = (snr(signal) / c.snr_scale).clamp(0.0, 1.0);
        let variation = (mean_abs_diff(signal) / c.variation_scale).clamp(0.0, 1.0);

        QualityScore::Score(
            c.amplitude_weight * amplitude
                + c.snr_weight * snr
                + c.variation_weight * (1.0 - variation),
        )
    }

    /// Per-frame label shown while acquiring.
    ///
    /// `recent_red` holds the latest red means (newest last), `recent_diffs`
    /// the absolute frame-to-frame red changes.
    pub fn classify(
        &self,
        sample: &Sample,
        recent_red: &[f64],
        recent_diffs: &[f64],
    ) -> SignalQuality {
        let c = &self.config;
        if sample.brightness < c.too_dark_brightness {
            return SignalQuality::TooDark;
        }
        if sample.brightness > c.too_bright_brightness {
            return SignalQuality::TooBright;
        }

        let strength = 0.7 * sample.red + 0.3 * sample.green;
        let motion = if recent_diffs.len() >= c.motion_window {
            mean(&recent_diffs[recent_diffs.len() - c.motion_window..])
        } else {
            0_f64
        };
        let short_snr = if recent_red.len() >= c.snr_window {
            snr(&recent_red[recent_red.len() - c.snr_window..])
        } else {
            1_f64
        };

        if strength < c.min_strength || motion > c.motion_threshold {
            return SignalQuality::Poor;
        }

        let good = strength >= c.good_strength
            && motion <= c.motion_threshold * c.good_motion_fraction
            && short_snr >= c.good_snr;
        let fair = strength >= c.fair_strength
            && motion <= c.motion_threshold * c.fair_motion_fraction
            && short_snr >= c.fair_snr;

        if good || fair {
            SignalQuality::Good
        } else {
            SignalQuality::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::{noisy_sinusoid, sinusoid};

    #[test]
    fn short_signal_is_insufficient() {
        let score = QualityAssessor::default().score(&[100.0; 9]);
        assert_eq!(score, QualityScore::InsufficientData);
        assert_eq!(score.value(), 0.0);
        assert!(!score.is_sufficient());
    }

    #[test]
    fn flat_signal_only_scores_smoothness() {
        let score = QualityAssessor::default().score(&[100.0; 20]);
        assert!((score.value() - 0.15).abs() < 1e-12, "score {score:?}");
    }

    #[test]
    fn fingertip_signal_scores_in_range() {
        let signal = sinusoid(1.2, 20.0, 160.0, 300, 30.0);
        let score = QualityAssessor::default().score(&signal).value();
        assert!((0.5..0.7).contains(&score), "score {score}");
    }

    #[test]
    fn quality_drops_as_noise_grows() {
        let assessor = QualityAssessor::default();
        let trials = 25;
        let averages: Vec<f64> = [0.0, 10.0, 20.0, 40.0]
            .iter()
            .map(|&noise| {
                (0..trials)
                    .map(|seed| {
                        let signal = noisy_sinusoid(1.2, 110.0, 150.0, 300, 30.0, noise, seed);
                        assessor.score(&signal).value()
                    })
                    .sum::<f64>()
                    / trials as f64
            })
            .collect();

        for pair in averages.windows(2) {
            assert!(pair[1] < pair[0], "quality not decreasing: {averages:?}");
        }
    }

    fn sample(red: f64, green: f64, blue: f64) -> Sample {
        Sample::from_rgb(red, green, blue, 0)
    }

    #[test]
    fn classify_brightness_extremes() {
        let assessor = QualityAssessor::default();
        assert_eq!(assessor.classify(&sample(10.0, 10.0, 10.0), &[], &[]), SignalQuality::TooDark);
        assert_eq!(
            assessor.classify(&sample(250.0, 250.0, 250.0), &[], &[]),
            SignalQuality::TooBright
        );
    }

    #[test]
    fn classify_steady_finger_is_good() {
        let assessor = QualityAssessor::default();
        let red = [170.0, 172.0, 174.0, 172.0, 170.0, 168.0, 166.0, 168.0, 170.0, 172.0];
        let diffs = [2.0; 5];
        assert_eq!(
            assessor.classify(&sample(170.0, 80.0, 60.0), &red, &diffs),
            SignalQuality::Good
        );
    }

    #[test]
    fn classify_motion_is_poor() {
        let assessor = QualityAssessor::default();
        let diffs = [30.0; 5];
        assert_eq!(
            assessor.classify(&sample(170.0, 80.0, 60.0), &[], &diffs),
            SignalQuality::Poor
        );
    }

    #[test]
    fn classify_weak_strength_is_poor() {
        let assessor = QualityAssessor::default();
        // brightness clears the dark cutoff but strength stays under 25
        assert_eq!(
            assessor.classify(&sample(20.0, 30.0, 60.0), &[], &[]),
            SignalQuality::Poor
        );
    }
}
