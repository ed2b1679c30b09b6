use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::conditioner::detrend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    pub min_samples: usize,
    pub detrend_max_half_width: usize,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            band_low_hz: 0.67,
            band_high_hz: 3.33,
            min_bpm: 40.0,
            max_bpm: 250.0,
            min_samples: 10,
            detrend_max_half_width: 30,
        }
    }
}

/// Dominant cardiac frequency from a Hamming-windowed, zero-padded FFT.
#[derive(Debug, Clone)]
pub struct SpectralEstimator {
    config: SpectralConfig,
    sampling_rate: f64,
}

impl SpectralEstimator {
    pub fn new(config: SpectralConfig, sampling_rate: f64) -> Self {
        Self {
            config,
            sampling_rate,
        }
    }

    pub fn dominant_frequency(&self, signal: &[f64]) -> Option<f64> {
        if signal.len() < self.config.min_samples.max(2) {
            return None;
        }

        let detrended = detrend(signal, self.config.detrend_max_half_width);
        let spectrum = fft(&hamming(&detrended));
        let n = spectrum.len();
        let resolution = self.sampling_rate / n as f64;

        let lo = ((self.config.band_low_hz / resolution).floor() as usize).max(1);
        let hi = ((self.config.band_high_hz / resolution).floor() as usize)
            .min((n / 2).saturating_sub(1));
        if lo > hi {
            return None;
        }

        let (bin, magnitude) = (lo..=hi)
            .map(|k| (k, spectrum[k].norm()))
            .fold((0, 0_f64), |best, current| {
                if current.1 > best.1 { current } else { best }
            });

        (magnitude > 0.0).then(|| bin as f64 * resolution)
    }

    /// Dominant frequency in beats per minute. Out-of-range rates are
    /// rejected, not clamped.
    pub fn heart_rate(&self, signal: &[f64]) -> Option<f64> {
        let bpm = self.dominant_frequency(signal)? * 60.0;
        (self.config.min_bpm..=self.config.max_bpm)
            .contains(&bpm)
            .then_some(bpm)
    }
}

pub fn hamming(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return signal.to_vec();
    }

    signal
        .iter()
        .enumerate()
        .map(|(i, v)| v * (0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos()))
        .collect()
}

pub fn pad_to_power_of_two(signal: &[f64]) -> Vec<f64> {
    let mut padded = signal.to_vec();
    padded.resize(signal.len().next_power_of_two(), 0_f64);
    padded
}

/// Spectrum of a real signal, zero-padded to the next power of two.
pub fn fft(signal: &[f64]) -> Vec<Complex64> {
    let input: Vec<Complex64> = pad_to_power_of_two(signal)
        .into_iter()
        .map(|re| Complex64::new(re, 0.0))
        .collect();
    radix2(&input)
}

fn radix2(input: &[Complex64]) -> Vec<Complex64> {
    let n = input.len();
    if n <= 1 {
        return input.to_vec();
    }

    let even: Vec<Complex64> = input.iter().step_by(2).copied().collect();
    let odd: Vec<Complex64> = input.iter().skip(1).step_by(2).copied().collect();
    let even = radix2(&even);
    let odd = radix2(&odd);

    let mut out = vec![Complex64::new(0.0, 0.0); n];
    for k in 0..n / 2 {
        let twiddle = Complex64::from_polar(1.0, -2.0 * PI * k as f64 / n as f64) * odd[k];
        out[k] = even[k] + twiddle;
        out[k + n / 2] = even[k] - twiddle;
    }

    out
}
