use strum::Display;

/// Lifecycle of a single measurement. `Idle` is both the initial state and
/// where cancel/reset lead back to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum MeasurementState {
    #[default]
    Idle,
    Preparing,
    Measuring,
    Processing,
    Complete,
    Error,
}

impl MeasurementState {
    /// Samples are only looked at while the session is acquiring.
    pub fn is_acquiring(self) -> bool {
        matches!(self, Self::Preparing | Self::Measuring)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Live per-frame classification of what the sensor is seeing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalQuality {
    Good,
    Poor,
    TooDark,
    TooBright,
    #[default]
    Unknown,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Serialize,
    Deserialize,
)]
pub enum ConfidenceLevel {
    Low,
    #[default]
    Medium,
    High,
}
