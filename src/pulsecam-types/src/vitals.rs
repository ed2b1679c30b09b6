use chrono::NaiveDateTime;
use strum::Display;

use crate::ConfidenceLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum VitalStatus {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateEstimate {
    pub bpm: f64,
    pub confidence: ConfidenceLevel,
    pub time: NaiveDateTime,
}

impl HeartRateEstimate {
    pub fn status(&self) -> VitalStatus {
        if self.bpm < 60.0 {
            VitalStatus::Low
        } else if self.bpm > 100.0 {
            VitalStatus::High
        } else {
            VitalStatus::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spo2Estimate {
    pub percentage: f64,
    pub confidence: ConfidenceLevel,
    pub time: NaiveDateTime,
    /// Set when the value is the fixed fallback for too-short buffers rather
    /// than a measurement.
    pub placeholder: bool,
}

impl Spo2Estimate {
    pub fn status(&self) -> VitalStatus {
        if self.percentage < 95.0 {
            VitalStatus::Low
        } else {
            VitalStatus::Normal
        }
    }
}

/// Result of one completed measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub heart_rate: HeartRateEstimate,
    pub spo2: Spo2Estimate,
}

impl VitalSigns {
    pub fn confidence(&self) -> ConfidenceLevel {
        self.heart_rate.confidence
    }

    pub fn time(&self) -> NaiveDateTime {
        self.heart_rate.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn heart_rate(bpm: f64) -> HeartRateEstimate {
        HeartRateEstimate {
            bpm,
            confidence: ConfidenceLevel::Medium,
            time: base_time(),
        }
    }

    fn spo2(percentage: f64) -> Spo2Estimate {
        Spo2Estimate {
            percentage,
            confidence: ConfidenceLevel::Medium,
            time: base_time(),
            placeholder: false,
        }
    }

    #[test]
    fn heart_rate_status_bands() {
        assert_eq!(heart_rate(55.0).status(), VitalStatus::Low);
        assert_eq!(heart_rate(60.0).status(), VitalStatus::Normal);
        assert_eq!(heart_rate(100.0).status(), VitalStatus::Normal);
        assert_eq!(heart_rate(100.5).status(), VitalStatus::High);
    }

    #[test]
    fn spo2_status_bands() {
        assert_eq!(spo2(94.9).status(), VitalStatus::Low);
        assert_eq!(spo2(95.0).status(), VitalStatus::Normal);
        assert_eq!(spo2(100.0).status(), VitalStatus::Normal);
    }

    #[test]
    fn vital_signs_json() {
        let vitals = VitalSigns {
            heart_rate: heart_rate(72.0),
            spo2: spo2(97.0),
        };
        let json = serde_json::to_value(vitals).unwrap();
        assert_eq!(json["heart_rate"]["bpm"], 72.0);
        assert_eq!(json["spo2"]["placeholder"], false);
        assert_eq!(json["heart_rate"]["confidence"], "Medium");

        let back: VitalSigns = serde_json::from_value(json).unwrap();
        assert_eq!(back, vitals);
    }
}
