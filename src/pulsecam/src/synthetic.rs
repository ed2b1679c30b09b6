//! Synthetic fingertip captures for demos and tests.

use pulsecam_codec::{Frame, FrameError, Sample};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPpg {
    pub bpm: f64,
    pub sampling_rate: f64,
    pub red_dc: f64,
    pub red_ac: f64,
    pub green_dc: f64,
    pub green_ac: f64,
    pub blue: f64,
    /// Slow respiratory drift added to every channel.
    pub wander: f64,
    pub wander_hz: f64,
    /// Standard deviation of the per-channel sensor noise.
    pub noise: f64,
    pub seed: Option<u64>,
}

impl Default for SyntheticPpg {
    fn default() -> Self {
        Self {
            bpm: 72.0,
            sampling_rate: 30.0,
            red_dc: 170.0,
            red_ac: 20.0,
            green_dc: 80.0,
            green_ac: 6.0,
            blue: 60.0,
            wander: 2.0,
            wander_hz: 0.25,
            noise: 0.5,
            seed: None,
        }
    }
}

impl SyntheticPpg {
    pub fn with_bpm(self, bpm: f64) -> Self {
        Self { bpm, ..self }
    }

    pub fn with_noise(self, noise: f64) -> Self {
        Self { noise, ..self }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn generate(&self, count: usize) -> Vec<Sample> {
        self.stream().take(count).collect()
    }

    /// Endless sample stream, one sample per frame.
    pub fn stream(&self) -> SyntheticStream {
        let seed = self.seed.unwrap_or_else(rand::random);
        SyntheticStream {
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, self.noise).ok().filter(|_| self.noise > 0.0),
            config: self.clone(),
            t: 0,
        }
    }
}

pub struct SyntheticStream {
    config: SyntheticPpg,
    rng: StdRng,
    noise: Option<Normal<f64>>,
    t: u64,
}

impl SyntheticStream {
    fn jitter(&mut self) -> f64 {
        match &self.noise {
            Some(normal) => normal.sample(&mut self.rng),
            None => 0_f64,
        }
    }
}

impl Iterator for SyntheticStream {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let c = &self.config;
        let secs = self.t as f64 / c.sampling_rate;
        let pulse = (2.0 * PI * c.bpm / 60.0 * secs).sin();
        let drift = c.wander * (2.0 * PI * c.wander_hz * secs).sin();

        let red = c.red_dc + c.red_ac * pulse + drift;
        let green = c.green_dc + c.green_ac * pulse + drift;
        let blue = c.blue + drift;
        let sample = Sample::from_rgb(
            red + self.jitter(),
            green + self.jitter(),
            blue + self.jitter(),
            self.t,
        );

        self.t += 1;
        Some(sample)
    }
}

/// Renders a sample as a uniform camera frame of packed ARGB pixels.
///
/// Each channel is dithered between its two nearest 8-bit levels so the
/// frame mean stays within `1 / (2 * width * height)` of the sample value.
pub fn render_frame(sample: &Sample, width: usize, height: usize) -> Result<Frame, FrameError> {
    let count = width.saturating_mul(height);
    let levels = |value: f64| {
        let value = value.clamp(0.0, 255.0);
        let base = value.floor();
        let raised = ((value - base) * count as f64).round() as usize;
        (base as u32, raised)
    };
    let channel = |(base, raised): (u32, usize), index: usize| {
        if index < raised { (base + 1).min(255) } else { base }
    };

    let (red, green, blue) = (levels(sample.red), levels(sample.green), levels(sample.blue));
    let pixels: Vec<u32> = (0..count)
        .map(|i| {
            0xFF00_0000 | (channel(red, i) << 16) | (channel(green, i) << 8) | channel(blue, i)
        })
        .collect();
    Frame::from_argb(width, height, &pixels)
}
