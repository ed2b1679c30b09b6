use serde::{Deserialize, Serialize};

use crate::helpers::stats::std_dev;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    pub low_pass_cutoff_hz: f64,
    /// Cutoff of the low-pass used as the baseline of the high-pass stage.
    pub high_pass_cutoff_hz: f64,
    /// Multiple of the first-derivative deviation above which a jump is suspect.
    pub motion_sigma: f64,
    pub acceleration_sigma: f64,
    /// Fraction of the motion threshold a neighbour must stay under to count as clean.
    pub neighbour_relaxation: f64,
    pub artifact_search_radius: usize,
    pub detrend_max_half_width: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            low_pass_cutoff_hz: 4.0,
            high_pass_cutoff_hz: 0.67,
            motion_sigma: 4.0,
            acceleration_sigma: 2.0,
            neighbour_relaxation: 0.8,
            artifact_search_radius: 7,
            detrend_max_half_width: 30,
        }
    }
}

/// Motion-artifact removal, band limiting and baseline removal for one channel.
///
/// Every stage returns a fresh buffer of the same length as its input.
#[derive(Debug, Clone, Default)]
pub struct SignalConditioner {
    config: ConditionerConfig,
}

impl SignalConditioner {
    pub const MIN_FILTER_LEN: usize = 5;
    pub const MIN_ARTIFACT_LEN: usize = 10;
    pub const MIN_DETREND_LEN: usize = 10;

    pub fn new(config: ConditionerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.config
    }

    pub fn condition(&self, raw: &[f64]) -> Vec<f64> {
        if raw.len() < Self::MIN_FILTER_LEN {
            return raw.to_vec();
        }

        let cleaned = self.remove_motion_artifacts(raw);
        let smoothed = low_pass(&cleaned, self.config.low_pass_cutoff_hz);
        let pulsatile = high_pass(&smoothed, self.config.high_pass_cutoff_hz);
        detrend(&pulsatile, self.config.detrend_max_half_width)
    }

    pub fn remove_motion_artifacts(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n < Self::MIN_ARTIFACT_LEN {
            return signal.to_vec();
        }

        let first = derivative(signal);
        let second = derivative(&first);

        let sigma = std_dev(&first);
        let threshold = self.config.motion_sigma * sigma;
        let acceleration_threshold = self.config.acceleration_sigma * sigma;
        let clean_threshold = threshold * self.config.neighbour_relaxation;
        let radius = self.config.artifact_search_radius;

        let mut cleaned = signal.to_vec();
        for i in 1..n - 1 {
            let corrupted =
                first[i].abs() > threshold && second[i].abs() > acceleration_threshold;
            if !corrupted {
                continue;
            }

            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            let before = (lo..i).rev().find(|&j| first[j].abs() <= clean_threshold);
            let after = (i + 1..=hi).find(|&j| first[j].abs() <= clean_threshold);

            cleaned[i] = match (before, after) {
                (Some(b), Some(a)) => {
                    let t = (i - b) as f64 / (a - b) as f64;
                    signal[b] + (signal[a] - signal[b]) * t
                }
                _ => weighted_neighbour_mean(signal, &first, i, lo..=hi, threshold)
                    .unwrap_or(signal[i]),
            };
        }

        cleaned
    }
}

/// Same-length derivative, the first element repeats the second.
fn derivative(signal: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(signal.len());
    if signal.len() < 2 {
        out.resize(signal.len(), 0_f64);
        return out;
    }

    out.push(signal[1] - signal[0]);
    out.extend(signal.windows(2).map(|w| w[1] - w[0]));
    out
}

fn weighted_neighbour_mean(
    signal: &[f64],
    first: &[f64],
    index: usize,
    range: std::ops::RangeInclusive<usize>,
    threshold: f64,
) -> Option<f64> {
    let (sum, weights) = range
        .filter(|&j| j != index && first[j].abs() <= threshold)
        .map(|j| {
            let weight = 1.0 / (j.abs_diff(index) as f64 + 1.0);
            (signal[j] * weight, weight)
        })
        .fold((0_f64, 0_f64), |(s, w), (vs, vw)| (s + vs, w + vw));

    (weights > 0.0).then(|| sum / weights)
}

pub fn gaussian_window_len(cutoff_hz: f64) -> usize {
    let raw = 12.0 / cutoff_hz;
    if raw.is_finite() && raw > 0.0 {
        raw.round().clamp(5.0, 15.0) as usize
    } else {
        15
    }
}

fn gaussian_weights(window: usize) -> Vec<f64> {
    let sigma = window as f64 / 6.0;
    let half = (window / 2) as f64;
    let raw: Vec<f64> = (0..window)
        .map(|j| {
            let x = j as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Gaussian-weighted moving average. Samples within half a window of
/// either end pass through unfiltered.
pub fn low_pass(signal: &[f64], cutoff_hz: f64) -> Vec<f64> {
    let window = gaussian_window_len(cutoff_hz);
    if signal.len() < SignalConditioner::MIN_FILTER_LEN || signal.len() < window {
        return signal.to_vec();
    }

    let weights = gaussian_weights(window);
    let half = window / 2;
    let mut out = signal.to_vec();
    for (i, value) in out.iter_mut().enumerate().take(signal.len() - half).skip(half) {
        *value = weights
            .iter()
            .enumerate()
            .map(|(j, w)| signal[i - half + j] * w)
            .sum();
    }

    out
}

const HIGH_PASS_SMOOTHING: [f64; 5] = [0.2, 0.3, 0.5, 0.3, 0.2];
const HIGH_PASS_NORM: f64 = 1.5;
const EDGE_DAMPING: f64 = 0.5;

/// Subtracts a slow low-pass baseline, then lightly smooths the residue.
pub fn high_pass(signal: &[f64], cutoff_hz: f64) -> Vec<f64> {
    let n = signal.len();
    if n < SignalConditioner::MIN_FILTER_LEN {
        return signal.to_vec();
    }

    let baseline = low_pass(signal, cutoff_hz);
    let residue: Vec<f64> = signal.iter().zip(&baseline).map(|(s, b)| s - b).collect();

    (0..n)
        .map(|i| {
            if i < 2 || i >= n - 2 {
                residue[i] * EDGE_DAMPING
            } else {
                HIGH_PASS_SMOOTHING
                    .iter()
                    .enumerate()
                    .map(|(k, w)| residue[i + k - 2] * w)
                    .sum::<f64>()
                    / HIGH_PASS_NORM
            }
        })
        .collect()
}

/// Removes a centred moving-average baseline of half-width
/// `min(len / 3, max_half_width)`.
pub fn detrend(signal: &[f64], max_half_width: usize) -> Vec<f64> {
    let n = signal.len();
    if n < SignalConditioner::MIN_DETREND_LEN {
        return signal.to_vec();
    }

    let half_width = (n / 3).min(max_half_width);
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0_f64);
    for value in signal {
        prefix.push(prefix[prefix.len() - 1] + value);
    }

    signal
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let lo = i.saturating_sub(half_width);
            let hi = (i + half_width).min(n - 1);
            let baseline = (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64;
            value - baseline
        })
        .collect()
}
