use pulsecam_types::ConfidenceLevel;
use serde::{Deserialize, Serialize};

use crate::{
    PeakSet, PpgConfig,
    helpers::stats::{mean, std_dev},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Share of frame differences above the motion threshold that forces `Low`.
    pub max_motion_fraction: f64,
    pub good_sample_red: f64,
    pub min_stability_diffs: usize,
    pub default_stability: f64,
    pub good_sample_weight: f64,
    pub quality_weight: f64,
    pub regularity_weight: f64,
    pub stability_weight: f64,
    pub low_below: f64,
    pub high_above: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            max_motion_fraction: 0.2,
            good_sample_red: 50.0,
            min_stability_diffs: 10,
            default_stability: 0.5,
            good_sample_weight: 0.3,
            quality_weight: 0.3,
            regularity_weight: 0.2,
            stability_weight: 0.2,
            low_below: 0.5,
            high_above: 0.75,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceCalculator {
    config: ConfidenceConfig,
    motion_threshold: f64,
}

impl ConfidenceCalculator {
    pub fn new(config: &PpgConfig) -> Self {
        Self {
            config: config.confidence.clone(),
            motion_threshold: config.quality.motion_threshold,
        }
    }

    pub fn calculate(&self, raw_red: &[f64], quality: f64, peaks: &PeakSet) -> ConfidenceLevel {
        let diffs: Vec<f64> = raw_red.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        let moving = diffs.iter().filter(|&&d| d > self.motion_threshold).count();
        let moving_fraction = moving as f64 / diffs.len().max(1) as f64;
        if !diffs.is_empty() && moving_fraction > self.config.max_motion_fraction {
            return ConfidenceLevel::Low;
        }

        let score = self.combined_score(raw_red, &diffs, quality, peaks);
        if score < self.config.low_below {
            ConfidenceLevel::Low
        } else if score > self.config.high_above {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }

    fn combined_score(&self, raw_red: &[f64], diffs: &[f64], quality: f64, peaks: &PeakSet) -> f64 {
        let c = &self.config;
        let good_ratio = if raw_red.is_empty() {
            0_f64
        } else {
            raw_red.iter().filter(|&&r| r > c.good_sample_red).count() as f64 / raw_red.len() as f64
        };

        c.good_sample_weight * good_ratio
            + c.quality_weight * quality.clamp(0.0, 1.0)
            + c.regularity_weight * peak_regularity(peaks)
            + c.stability_weight * self.stability(diffs)
    }

    fn stability(&self, diffs: &[f64]) -> f64 {
        if diffs.len() < self.config.min_stability_diffs {
            return self.config.default_stability;
        }

        1.0 - (mean(diffs) / self.motion_threshold).clamp(0.0, 1.0)
    }
}

/// 1 for perfectly even beat spacing, 0 once the coefficient of variation
/// reaches 0.5.
fn peak_regularity(peaks: &PeakSet) -> f64 {
    let intervals: Vec<f64> = peaks.intervals().into_iter().map(|i| i as f64).collect();
    let mean = mean(&intervals);
    if intervals.len() < 2 || mean <= 0.0 {
        return 0_f64;
    }

    let cv = std_dev(&intervals) / mean;
    1.0 - 2.0 * cv.clamp(0.0, 0.5)
}
