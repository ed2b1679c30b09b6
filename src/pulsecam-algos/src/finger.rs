use pulsecam_codec::Sample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::{HeartRateEstimator, PpgConfig, QualityAssessor, helpers::stats::mean};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerConfig {
    /// Mean red level a covered, flash-lit sensor reaches. Device dependent.
    pub red_threshold: f64,
    pub max_brightness: f64,
    pub red_green_ratio: f64,
    pub red_blue_ratio: f64,
    pub min_quality: f64,
    /// Number of recent samples averaged for the presence decision.
    pub window: usize,
    pub live_min_samples: usize,
    pub live_update_interval: usize,
    pub live_window: usize,
}

impl Default for FingerConfig {
    fn default() -> Self {
        Self {
            red_threshold: 140.0,
            max_brightness: 255.0,
            red_green_ratio: 1.2,
            red_blue_ratio: 1.3,
            min_quality: 0.4,
            window: 10,
            live_min_samples: 30,
            live_update_interval: 15,
            live_window: 90,
        }
    }
}

/// Decides whether a fingertip covers the lens and keeps a rough live
/// heart rate while it does.
#[derive(Debug, Clone)]
pub struct FingerPresenceDetector {
    config: FingerConfig,
    quality: QualityAssessor,
    heart_rate: HeartRateEstimator,
    red: VecDeque<f64>,
    green: VecDeque<f64>,
    blue: VecDeque<f64>,
    history: VecDeque<f64>,
    since_update: usize,
    present: bool,
    live_bpm: Option<f64>,
}

impl FingerPresenceDetector {
    pub fn new(config: &PpgConfig) -> Self {
        let finger = config.finger.clone();
        Self {
            red: VecDeque::with_capacity(finger.window + 1),
            green: VecDeque::with_capacity(finger.window + 1),
            blue: VecDeque::with_capacity(finger.window + 1),
            history: VecDeque::with_capacity(finger.live_window + 1),
            config: finger,
            quality: QualityAssessor::new(config.quality.clone()),
            heart_rate: HeartRateEstimator::new(config),
            since_update: 0,
            present: false,
            live_bpm: None,
        }
    }

    /// Channel rule alone: bright, red-dominant, not saturated.
    pub fn covers_sensor(&self, red: f64, green: f64, blue: f64) -> bool {
        let c = &self.config;
        red >= c.red_threshold
            && red <= c.max_brightness
            && red >= green * c.red_green_ratio
            && red >= blue * c.red_blue_ratio
    }

    pub fn update(&mut self, sample: &Sample) -> bool {
        let window = self.config.window;
        push_bounded(&mut self.red, sample.red, window);
        push_bounded(&mut self.green, sample.green, window);
        push_bounded(&mut self.blue, sample.blue, window);

        let quality = self.quality.score(self.red.make_contiguous()).value();
        let red = mean(self.red.make_contiguous());
        let green = mean(self.green.make_contiguous());
        let blue = mean(self.blue.make_contiguous());
        let was_present = self.present;
        self.present =
            self.covers_sensor(red, green, blue) && quality >= self.config.min_quality;
        if self.present != was_present {
            debug!("finger present: {} (quality {quality:.2})", self.present);
        }

        push_bounded(&mut self.history, sample.red, self.config.live_window);
        self.since_update += 1;
        if self.present
            && self.history.len() >= self.config.live_min_samples
            && self.since_update >= self.config.live_update_interval
        {
            self.since_update = 0;
            let conditioned = self
                .heart_rate
                .conditioner()
                .condition(self.history.make_contiguous());
            // keep the previous value when this window shows no rhythm
            if let Some(bpm) = self.heart_rate.time_domain(&conditioned) {
                self.live_bpm = Some(self.heart_rate.clamp_to_valid(bpm));
            }
        }

        self.present
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn live_bpm(&self) -> Option<f64> {
        self.live_bpm
    }

    pub fn reset(&mut self) {
        self.red.clear();
        self.green.clear();
        self.blue.clear();
        self.history.clear();
        self.since_update = 0;
        self.present = false;
        self.live_bpm = None;
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, capacity: usize) {
    buffer.push_back(value);
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}
