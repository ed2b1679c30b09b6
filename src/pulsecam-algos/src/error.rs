use pulsecam_codec::FrameError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PpgError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] FrameError),
    #[error("insufficient signal: {samples} samples at quality {quality:.2}")]
    InsufficientSignal { samples: usize, quality: f64 },
    #[error("no finger over the sensor")]
    FingerNotDetected,
    #[error("signal too weak: peak-to-peak amplitude {amplitude:.2}")]
    WeakSignal { amplitude: f64 },
    #[error("no heart rhythm detected")]
    NoRhythmDetected,
}
