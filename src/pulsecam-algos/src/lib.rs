#[macro_use]
extern crate log;

pub(crate) mod config;
pub use config::PpgConfig;

pub(crate) mod error;
pub use error::PpgError;

pub(crate) mod conditioner;
pub use conditioner::{ConditionerConfig, SignalConditioner};

pub(crate) mod quality;
pub use quality::{QualityAssessor, QualityConfig, QualityScore};

pub(crate) mod peaks;
pub use peaks::{PeakConfig, PeakDetector, PeakSet, PeakStrategy};

pub(crate) mod spectral;
pub use spectral::{SpectralConfig, SpectralEstimator};

pub(crate) mod heart_rate;
pub use heart_rate::{HeartRateConfig, HeartRateEstimator, HeartRateReading};

pub(crate) mod spo2;
pub use spo2::{OxygenSaturationEstimator, Spo2Config, Spo2Reading, Spo2Source};

pub(crate) mod finger;
pub use finger::{FingerConfig, FingerPresenceDetector};

pub(crate) mod confidence;
pub use confidence::{ConfidenceCalculator, ConfidenceConfig};

pub mod helpers;

#[cfg(test)]
pub(crate) mod test_signals;
