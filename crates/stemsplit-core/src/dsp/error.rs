//! Signal processing errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DspError {
    #[error("signal of {len} samples is shorter than one {frame}-sample frame")]
    SignalTooShort { len: usize, frame: usize },

    #[error("magnitude {magnitude:?} and phase {phase:?} shapes differ")]
    ShapeMismatch {
        magnitude: (usize, usize),
        phase: (usize, usize),
    },

    #[error("expected {expected} bins per frame, got {actual}")]
    BinCount { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, DspError>;
