#[macro_use]
extern crate serde;

mod measurement;
pub use measurement::{ConfidenceLevel, MeasurementState, SignalQuality};

mod vitals;
pub use vitals::{HeartRateEstimate, Spo2Estimate, VitalSigns, VitalStatus};
