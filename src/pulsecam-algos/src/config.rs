use serde::{Deserialize, Serialize};

use crate::{
    ConditionerConfig, ConfidenceConfig, FingerConfig, HeartRateConfig, PeakConfig, QualityConfig,
    SpectralConfig, Spo2Config,
};

/// Every tunable of the pipeline. Thresholds marked as calibrations in the
/// stage configs were tuned empirically against reference devices and are
/// expected to need per-device adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpgConfig {
    /// Frames per second delivered by the camera.
    pub sampling_rate: f64,
    pub conditioner: ConditionerConfig,
    pub quality: QualityConfig,
    pub finger: FingerConfig,
    pub peaks: PeakConfig,
    pub spectral: SpectralConfig,
    pub heart_rate: HeartRateConfig,
    pub spo2: Spo2Config,
    pub confidence: ConfidenceConfig,
}

impl PpgConfig {
    pub const DEFAULT_SAMPLING_RATE: f64 = 30.0;
}

impl Default for PpgConfig {
    fn default() -> Self {
        Self {
            sampling_rate: Self::DEFAULT_SAMPLING_RATE,
            conditioner: ConditionerConfig::default(),
            quality: QualityConfig::default(),
            finger: FingerConfig::default(),
            peaks: PeakConfig::default(),
            spectral: SpectralConfig::default(),
            heart_rate: HeartRateConfig::default(),
            spo2: Spo2Config::default(),
            confidence: ConfidenceConfig::default(),
        }
    }
}
