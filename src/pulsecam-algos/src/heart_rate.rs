use serde::{Deserialize, Serialize};

use crate::{
    PeakDetector, PeakSet, PpgConfig, PpgError, QualityAssessor, SignalConditioner,
    SpectralEstimator,
    helpers::stats::{median, peak_to_peak},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRateConfig {
    pub min_samples: usize,
    pub min_quality: f64,
    /// Smallest conditioned peak-to-peak amplitude treated as a pulse.
    pub min_amplitude: f64,
    /// Calibration factor applied to the time-domain rate. Empirical and
    /// unvalidated across devices.
    pub time_domain_correction: f64,
    pub min_peaks: usize,
    pub min_interval_bpm: f64,
    pub max_interval_bpm: f64,
    pub method_min_bpm: f64,
    pub method_max_bpm: f64,
    pub fusion_base_weight: f64,
    pub fusion_quality_slope: f64,
    pub min_valid_bpm: f64,
    pub max_valid_bpm: f64,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            min_samples: 25,
            min_quality: 0.35,
            min_amplitude: 2.0,
            time_domain_correction: 1.4,
            min_peaks: 3,
            min_interval_bpm: 40.0,
            max_interval_bpm: 180.0,
            method_min_bpm: 40.0,
            method_max_bpm: 250.0,
            fusion_base_weight: 0.7,
            fusion_quality_slope: 0.4,
            min_valid_bpm: 40.0,
            max_valid_bpm: 180.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateReading {
    pub bpm: f64,
    pub time_domain: Option<f64>,
    pub frequency_domain: Option<f64>,
    /// Quality score of the raw buffer.
    pub quality: f64,
    pub peaks: PeakSet,
}

/// Fuses a peak-interval rate and a spectral rate into one reading.
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    config: HeartRateConfig,
    sampling_rate: f64,
    conditioner: SignalConditioner,
    quality: QualityAssessor,
    peaks: PeakDetector,
    spectral: SpectralEstimator,
}

impl HeartRateEstimator {
    pub fn new(config: &PpgConfig) -> Self {
        Self {
            config: config.heart_rate.clone(),
            sampling_rate: config.sampling_rate,
            conditioner: SignalConditioner::new(config.conditioner.clone()),
            quality: QualityAssessor::new(config.quality.clone()),
            peaks: PeakDetector::new(config.peaks.clone(), config.sampling_rate),
            spectral: SpectralEstimator::new(config.spectral.clone(), config.sampling_rate),
        }
    }

    pub fn conditioner(&self) -> &SignalConditioner {
        &self.conditioner
    }

    pub fn estimate(&self, raw: &[f64]) -> Result<HeartRateReading, PpgError> {
        let quality = self.quality.score(raw).value();
        if raw.len() < self.config.min_samples || quality < self.config.min_quality {
            return Err(PpgError::InsufficientSignal {
                samples: raw.len(),
                quality,
            });
        }

        let conditioned = self.conditioner.condition(raw);
        let amplitude = peak_to_peak(&conditioned);
        if amplitude < self.config.min_amplitude {
            return Err(PpgError::WeakSignal { amplitude });
        }

        let peaks = self.peaks.detect(&conditioned);
        let time_domain = self.time_domain_from_peaks(&peaks);
        let frequency_domain = self.spectral.heart_rate(&conditioned);
        debug!(
            "{} samples, quality {quality:.2}, {} peaks, time {time_domain:?}, spectral {frequency_domain:?}",
            raw.len(),
            peaks.len()
        );

        let fused = self
            .fuse(time_domain, frequency_domain, quality)
            .ok_or(PpgError::NoRhythmDetected)?;

        Ok(HeartRateReading {
            bpm: self.clamp_to_valid(fused),
            time_domain,
            frequency_domain,
            quality,
            peaks,
        })
    }

    /// Peak-interval rate of an already conditioned signal.
    pub fn time_domain(&self, conditioned: &[f64]) -> Option<f64> {
        self.time_domain_from_peaks(&self.peaks.detect(conditioned))
    }

    pub fn time_domain_from_peaks(&self, peaks: &PeakSet) -> Option<f64> {
        if peaks.len() < self.config.min_peaks {
            return None;
        }

        let plausible = self.config.min_interval_bpm..=self.config.max_interval_bpm;
        let intervals: Vec<f64> = peaks
            .intervals()
            .into_iter()
            .map(|samples| samples as f64 / self.sampling_rate)
            .filter(|secs| plausible.contains(&(60.0 / secs)))
            .collect();

        let bpm = 60.0 / median(&intervals)? * self.config.time_domain_correction;
        (self.config.method_min_bpm..=self.config.method_max_bpm)
            .contains(&bpm)
            .then_some(bpm)
    }

    /// Quality-weighted blend. Cleaner signals lean on the time domain.
    pub fn fuse(
        &self,
        time_domain: Option<f64>,
        frequency_domain: Option<f64>,
        quality: f64,
    ) -> Option<f64> {
        match (time_domain, frequency_domain) {
            (Some(time), Some(frequency)) => {
                let c = &self.config;
                let w_freq = c.fusion_base_weight - c.fusion_quality_slope * quality;
                Some(time * (1.0 - w_freq) + frequency * w_freq)
            }
            (Some(bpm), None) | (None, Some(bpm)) => Some(bpm),
            (None, None) => None,
        }
    }

    pub fn clamp_to_valid(&self, bpm: f64) -> f64 {
        bpm.clamp(self.config.min_valid_bpm, self.config.max_valid_bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::noisy_sinusoid;

    fn estimator() -> HeartRateEstimator {
        HeartRateEstimator::new(&PpgConfig::default())
    }

    fn fingertip(seed: u64) -> Vec<f64> {
        noisy_sinusoid(1.2, 20.0, 160.0, 300, 30.0, 0.5, seed)
    }

    #[test]
    fn short_buffer_is_insufficient() {
        let raw = &fingertip(1)[..20];
        match estimator().estimate(raw) {
            Err(PpgError::InsufficientSignal { samples, .. }) => assert_eq!(samples, 20),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flat_buffer_is_insufficient() {
        assert!(matches!(
            estimator().estimate(&[0.0; 100]),
            Err(PpgError::InsufficientSignal { .. })
        ));
    }

    #[test]
    fn tiny_pulse_is_weak() {
        let raw = noisy_sinusoid(1.2, 0.5, 150.0, 300, 30.0, 0.0, 0);
        assert!(matches!(estimator().estimate(&raw), Err(PpgError::WeakSignal { .. })));
    }

    #[test]
    fn no_plausible_rate_is_no_rhythm() {
        let mut config = PpgConfig::default();
        // too few peaks for the time domain, 72 BPM above the spectral band
        config.heart_rate.min_peaks = 1_000;
        config.spectral.max_bpm = 60.0;

        let raw = fingertip(7);
        assert_eq!(
            HeartRateEstimator::new(&config).estimate(&raw),
            Err(PpgError::NoRhythmDetected)
        );
    }

    #[test]
    fn round_trip_at_72_bpm() {
        let reading = estimator().estimate(&fingertip(7)).unwrap();

        // 25-sample peak spacing scaled by the 1.4 calibration factor
        let time = reading.time_domain.unwrap();
        assert!((time - 100.8).abs() < 10.0, "time domain {time}");

        let frequency = reading.frequency_domain.unwrap();
        assert!((frequency - 72.0).abs() < 4.0, "frequency domain {frequency}");

        assert!(reading.bpm > frequency && reading.bpm < time, "fused {}", reading.bpm);
        assert!(reading.quality > 0.5);
    }

    #[test]
    fn correction_factor_is_configurable() {
        let mut config = PpgConfig::default();
        config.heart_rate.time_domain_correction = 1.0;
        let reading = HeartRateEstimator::new(&config).estimate(&fingertip(3)).unwrap();
        let time = reading.time_domain.unwrap();
        assert!((time - 72.0).abs() < 6.0, "time domain {time}");
    }

    #[test]
    fn estimates_stay_in_valid_band() {
        let estimator = estimator();
        for (seed, freq) in [0.5, 0.9, 1.2, 1.8, 2.6, 3.2].into_iter().enumerate() {
            for noise in [0.5, 4.0, 12.0] {
                let raw = noisy_sinusoid(freq, 25.0, 160.0, 300, 30.0, noise, seed as u64);
                if let Ok(reading) = estimator.estimate(&raw) {
                    assert!(
                        (40.0..=180.0).contains(&reading.bpm),
                        "{freq} Hz, noise {noise}: {}",
                        reading.bpm
                    );
                }
            }
        }
    }

    #[test]
    fn fusion_weights_follow_quality() {
        let estimator = estimator();
        let clean = estimator.fuse(Some(100.0), Some(70.0), 1.0).unwrap();
        assert!((clean - 91.0).abs() < 1e-9);
        let noisy = estimator.fuse(Some(100.0), Some(70.0), 0.0).unwrap();
        assert!((noisy - 79.0).abs() < 1e-9);
        assert_eq!(estimator.fuse(None, Some(70.0), 0.5), Some(70.0));
        assert_eq!(estimator.fuse(None, None, 0.5), None);
    }

    #[test]
    fn time_domain_needs_three_peaks() {
        let estimator = estimator();
        assert_eq!(estimator.time_domain_from_peaks(&PeakSet::new(vec![10, 35])), None);
        let bpm = estimator
            .time_domain_from_peaks(&PeakSet::new(vec![10, 40, 70, 100]))
            .unwrap();
        assert!((bpm - 84.0).abs() < 1e-9);
    }

    #[test]
    fn implausible_intervals_are_ignored() {
        // 5-sample gaps are 360 BPM and get filtered out
        let bpm = estimator()
            .time_domain_from_peaks(&PeakSet::new(vec![0, 5, 35, 65, 95]))
            .unwrap();
        assert!((bpm - 84.0).abs() < 1e-9);
    }
}
