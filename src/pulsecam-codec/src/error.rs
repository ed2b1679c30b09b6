use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{self:?}")]
pub enum FrameError {
    EmptyFrame,
    BufferSizeMismatch { expected: usize, actual: usize },
    RaggedRows { row: usize, expected: usize, actual: usize },
    InvalidRoi,
}
