#[macro_use]
extern crate log;

mod session;
pub use session::{
    AnalysisJob, AnalysisOutcome, MeasurementError, MeasurementSession, SessionConfig,
    SessionHandle, SessionSnapshot,
};

mod monitor;
pub use monitor::SessionMonitor;

pub mod synthetic;

pub mod algo {
    pub use pulsecam_algos::*;
}

pub mod types {
    pub use pulsecam_codec::{ColorSampleExtractor, Frame, FrameError, Rgb, Sample};
    pub use pulsecam_types::*;
}
