use serde::{Deserialize, Serialize};

use crate::helpers::stats::{mean, median, peak_to_peak, std_dev};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakStrategy {
    /// Local-window maximum above a global amplitude floor.
    Adaptive,
    /// Smoothed threshold crossing, template correlation and rhythm check.
    #[default]
    TemplateMatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    pub strategy: PeakStrategy,
    /// Fastest rhythm the detector will resolve, sets the minimum peak spacing.
    pub max_heart_rate: f64,
    pub min_distance_floor: usize,
    pub template_half_width: usize,
    pub template_peaks: usize,
    pub min_correlation: f64,
    pub flat_window_range: f64,
    pub rhythm_tolerance: f64,
    pub adaptive_window_secs: f64,
    pub adaptive_amplitude_fraction: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            strategy: PeakStrategy::default(),
            max_heart_rate: 220.0,
            min_distance_floor: 3,
            template_half_width: 5,
            template_peaks: 3,
            min_correlation: 0.7,
            flat_window_range: 0.1,
            rhythm_tolerance: 0.3,
            adaptive_window_secs: 0.2,
            adaptive_amplitude_fraction: 0.15,
        }
    }
}

/// Ascending, deduplicated sample indices of detected beats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakSet(Vec<usize>);

impl PeakSet {
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gaps between consecutive peaks, in samples.
    pub fn intervals(&self) -> Vec<usize> {
        self.0.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[derive(Debug, Clone)]
pub struct PeakDetector {
    config: PeakConfig,
    sampling_rate: f64,
}

const SMOOTHING: [f64; 5] = [0.1, 0.2, 0.4, 0.2, 0.1];

impl PeakDetector {
    pub fn new(config: PeakConfig, sampling_rate: f64) -> Self {
        Self {
            config,
            sampling_rate,
        }
    }

    pub fn with_strategy(self, strategy: PeakStrategy) -> Self {
        Self {
            config: PeakConfig {
                strategy,
                ..self.config
            },
            ..self
        }
    }

    pub fn min_peak_distance(&self) -> usize {
        let spacing = (60.0 / self.config.max_heart_rate * self.sampling_rate).floor();
        let spacing = if spacing.is_finite() && spacing > 0.0 {
            spacing as usize
        } else {
            0
        };
        spacing.max(self.config.min_distance_floor)
    }

    pub fn detect(&self, signal: &[f64]) -> PeakSet {
        let peaks = match self.config.strategy {
            PeakStrategy::TemplateMatched => self.detect_template_matched(signal),
            PeakStrategy::Adaptive => self.detect_adaptive(signal),
        };
        PeakSet::new(peaks)
    }

    fn detect_template_matched(&self, signal: &[f64]) -> Vec<usize> {
        if signal.len() < SMOOTHING.len() {
            return Vec::new();
        }

        let smoothed = smooth(signal);
        let mean = mean(&smoothed);
        let threshold = threshold_factor(peak_to_peak(&smoothed)) * std_dev(&smoothed);

        let candidates: Vec<usize> = (2..smoothed.len() - 2)
            .filter(|&i| {
                let s = &smoothed;
                s[i] > s[i - 1]
                    && s[i] > s[i + 1]
                    && s[i] >= s[i - 2]
                    && s[i] >= s[i + 2]
                    && s[i] > mean + threshold
                    && s[i] - s[i - 2] > 0.0
                    && s[i] - s[i + 2] > 0.0
            })
            .collect();

        let matched = self.match_template(&smoothed, candidates);
        let spaced = enforce_min_distance(&smoothed, matched, self.min_peak_distance());
        self.check_rhythm(spaced)
    }

    fn detect_adaptive(&self, signal: &[f64]) -> Vec<usize> {
        let half = ((self.sampling_rate * self.config.adaptive_window_secs) as usize).max(1);
        if signal.len() < 2 * half + 1 {
            return Vec::new();
        }

        let floor = mean(signal) + peak_to_peak(signal) * self.config.adaptive_amplitude_fraction;
        let candidates: Vec<usize> = (half..signal.len() - half)
            .filter(|&i| {
                let local_max = signal[i - half..i + half]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                signal[i] == local_max
                    && signal[i] > signal[i - 1]
                    && signal[i] > signal[i + 1]
                    && signal[i] > floor
            })
            .collect();

        enforce_min_distance(signal, candidates, self.min_peak_distance())
    }

    /// Keeps candidates whose shape correlates with the averaged shape of
    /// the strongest beats.
    fn match_template(&self, signal: &[f64], candidates: Vec<usize>) -> Vec<usize> {
        if candidates.len() < 2 {
            return candidates;
        }

        let half = self.config.template_half_width;
        let full_window = |p: usize| p >= half && p + half < signal.len();

        let mut strongest = candidates.clone();
        strongest.sort_by(|&a, &b| signal[b].total_cmp(&signal[a]).then(a.cmp(&b)));
        let windows: Vec<Vec<f64>> = strongest
            .into_iter()
            .filter(|&p| full_window(p))
            .filter_map(|p| min_max_normalise(&signal[p - half..=p + half]))
            .take(self.config.template_peaks)
            .collect();
        if windows.is_empty() {
            return candidates;
        }

        let mut template = vec![0_f64; 2 * half + 1];
        for window in &windows {
            for (t, v) in template.iter_mut().zip(window) {
                *t += v / windows.len() as f64;
            }
        }

        let matched: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&p| full_window(p))
            .filter(|&p| {
                let window = &signal[p - half..=p + half];
                peak_to_peak(window) >= self.config.flat_window_range
                    && correlation(&template, window)
                        .is_some_and(|r| r > self.config.min_correlation)
            })
            .collect();
        if matched.is_empty() {
            return candidates;
        }

        let mut kept: Vec<usize> = candidates
            .into_iter()
            .filter(|&p| !full_window(p))
            .chain(matched)
            .collect();
        kept.sort_unstable();
        kept
    }

    /// Drops the later peak of every interval outside the tolerance band
    /// around the median interval.
    fn check_rhythm(&self, peaks: Vec<usize>) -> Vec<usize> {
        if peaks.len() < 3 {
            return peaks;
        }

        let intervals: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
        let Some(median) = median(&intervals) else {
            return peaks;
        };
        let lo = median * (1.0 - self.config.rhythm_tolerance);
        let hi = median * (1.0 + self.config.rhythm_tolerance);

        let mut corrected = peaks;
        for (i, &interval) in intervals.iter().enumerate().rev() {
            if (interval < lo || interval > hi) && i + 1 < corrected.len() {
                corrected.remove(i + 1);
            }
        }

        corrected
    }
}

fn smooth(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    (0..n)
        .map(|i| {
            if i < 2 || i + 2 >= n {
                signal[i]
            } else {
                SMOOTHING
                    .iter()
                    .enumerate()
                    .map(|(k, w)| signal[i + k - 2] * w)
                    .sum()
            }
        })
        .collect()
}

fn threshold_factor(amplitude: f64) -> f64 {
    if amplitude > 100.0 {
        0.45
    } else if amplitude > 50.0 {
        0.35
    } else {
        0.25
    }
}

/// Greedy acceptance by descending amplitude. Returns ascending indices.
fn enforce_min_distance(signal: &[f64], candidates: Vec<usize>, min_distance: usize) -> Vec<usize> {
    let mut by_amplitude = candidates;
    by_amplitude.sort_by(|&a, &b| signal[b].total_cmp(&signal[a]).then(a.cmp(&b)));

    let mut accepted: Vec<usize> = Vec::with_capacity(by_amplitude.len());
    for p in by_amplitude {
        if accepted.iter().all(|&a| p.abs_diff(a) >= min_distance) {
            accepted.push(p);
        }
    }

    accepted.sort_unstable();
    accepted
}

fn min_max_normalise(window: &[f64]) -> Option<Vec<f64>> {
    let min = window.iter().copied().fold(f64::INFINITY, f64::min);
    let range = peak_to_peak(window);
    (range > f64::EPSILON).then(|| window.iter().map(|v| (v - min) / range).collect())
}

/// Pearson correlation of two equal-length windows.
fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (ma, mb) = (mean(a), mean(b));
    let (mut num, mut da, mut db) = (0_f64, 0_f64, 0_f64);
    for (x, y) in a.iter().zip(b) {
        num += (x - ma) * (y - mb);
        da += (x - ma).powi(2);
        db += (y - mb).powi(2);
    }

    let denom = (da * db).sqrt();
    (denom > f64::EPSILON).then(|| num / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SignalConditioner, test_signals::{noisy_sinusoid, sinusoid}};

    fn detector() -> PeakDetector {
        PeakDetector::new(PeakConfig::default(), 30.0)
    }

    #[test]
    fn min_distance_at_camera_rate() {
        assert_eq!(detector().min_peak_distance(), 8);
        assert_eq!(PeakDetector::new(PeakConfig::default(), 10.0).min_peak_distance(), 3);
    }

    #[test]
    fn peak_set_is_sorted_and_unique() {
        let set = PeakSet::new(vec![30, 5, 30, 12]);
        assert_eq!(set.indices(), &[5, 12, 30]);
        assert_eq!(set.intervals(), vec![7, 18]);
    }

    #[test]
    fn threshold_tiers() {
        assert_eq!(threshold_factor(150.0), 0.45);
        assert_eq!(threshold_factor(75.0), 0.35);
        assert_eq!(threshold_factor(10.0), 0.25);
    }

    #[test]
    fn short_and_flat_signals_have_no_peaks() {
        assert!(detector().detect(&[1.0, 2.0, 1.0]).is_empty());
        assert!(detector().detect(&[5.0; 100]).is_empty());
        let adaptive = detector().with_strategy(PeakStrategy::Adaptive);
        assert!(adaptive.detect(&[5.0; 100]).is_empty());
    }

    #[test]
    fn sinusoid_peaks_follow_period() {
        let raw = sinusoid(1.2, 20.0, 160.0, 300, 30.0);
        let conditioned = SignalConditioner::default().condition(&raw);
        for strategy in [PeakStrategy::TemplateMatched, PeakStrategy::Adaptive] {
            let peaks = detector().with_strategy(strategy).detect(&conditioned);
            assert!(peaks.len() >= 8, "{strategy:?} found {peaks:?}");
            // the filter edges can leave a truncated beat, so only look inside
            let interior: Vec<usize> =
                peaks.indices().iter().copied().filter(|p| (20..280).contains(p)).collect();
            for pair in interior.windows(2) {
                let interval = pair[1] - pair[0];
                assert!((24..=26).contains(&interval), "{strategy:?} interval {interval}");
            }
        }
    }

    #[test]
    fn peaks_respect_min_distance_on_noise() {
        for strategy in [PeakStrategy::TemplateMatched, PeakStrategy::Adaptive] {
            let detector = detector().with_strategy(strategy);
            let min_distance = detector.min_peak_distance();
            for seed in 0..20 {
                let signal = noisy_sinusoid(2.5, 3.0, 0.0, 240, 30.0, 4.0, seed);
                let peaks = detector.detect(&signal);
                for pair in peaks.indices().windows(2) {
                    assert!(pair[1] > pair[0]);
                    assert!(
                        pair[1] - pair[0] >= min_distance,
                        "{strategy:?} seed {seed}: {peaks:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn rhythm_check_drops_later_peak_of_irregular_interval() {
        let corrected = detector().check_rhythm(vec![0, 25, 50, 60, 75, 100]);
        assert_eq!(corrected, vec![0, 25, 50, 100]);
    }

    #[test]
    fn rhythm_check_keeps_regular_train() {
        let peaks = vec![3, 28, 52, 77, 101];
        assert_eq!(detector().check_rhythm(peaks.clone()), peaks);
    }

    fn bump(signal: &mut [f64], centre: usize, height: f64) {
        for (i, v) in signal.iter_mut().enumerate() {
            let x = i as f64 - centre as f64;
            *v += height * (-(x * x) / 8.0).exp();
        }
    }

    #[test]
    fn template_rejects_misshapen_candidate() {
        let mut signal = vec![0_f64; 90];
        bump(&mut signal, 10, 1.0);
        bump(&mut signal, 30, 0.95);
        bump(&mut signal, 50, 0.9);
        // a bowl with a small bump in the middle
        for (i, v) in signal[65..=75].iter_mut().enumerate() {
            *v = [1.0, 0.9, 0.6, 0.3, 0.05, 0.1, 0.05, 0.3, 0.6, 0.9, 1.0][i] * 0.8;
        }

        let kept = detector().match_template(&signal, vec![10, 30, 50, 70]);
        assert_eq!(kept, vec![10, 30, 50]);
    }

    #[test]
    fn template_keeps_edge_candidates() {
        let mut signal = vec![0_f64; 60];
        bump(&mut signal, 2, 1.0);
        bump(&mut signal, 20, 1.0);
        bump(&mut signal, 40, 0.9);
        let kept = detector().match_template(&signal, vec![2, 20, 40]);
        assert_eq!(kept, vec![2, 20, 40]);
    }

    #[test]
    fn correlation_of_identical_and_inverted() {
        let a = [0.0, 1.0, 3.0, 1.0, 0.0];
        let b = [3.0, 2.0, 0.0, 2.0, 3.0];
        assert!((correlation(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        assert!(correlation(&a, &b).unwrap() < -0.9);
        assert_eq!(correlation(&a, &[1.0; 5]), None);
    }
}
