#[macro_use]
extern crate serde;

mod frame;
pub use frame::{Frame, Rgb};

mod error;
pub use error::FrameError;

mod helpers;

mod sample;
pub use sample::Sample;

mod extractor;
pub use extractor::ColorSampleExtractor;
