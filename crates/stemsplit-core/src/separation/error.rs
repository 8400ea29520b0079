//! Separation error types

use thiserror::Error;

use super::config::{ModelVariant, Stem};
use crate::dsp::DspError;

/// Errors that can occur during stem separation
#[derive(Error, Debug)]
pub enum SeparationError {
    /// No cached bytes and the remote probe failed for at least one stem model
    #[error("Model unavailable: {0}")]
    ModelUnavailable(ModelVariant),

    #[error("Model download failed: {0}")]
    DownloadFailure(String),

    /// Local model cache read/write failed (callers treat this as a cache miss)
    #[error("Model cache error: {0}")]
    CacheFailure(String),

    #[error("Inference failed for {stem}: {message}")]
    Inference { stem: Stem, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeparationError {
    pub(crate) fn inference(stem: Stem, message: impl Into<String>) -> Self {
        Self::Inference {
            stem,
            message: message.into(),
        }
    }
}

/// Malformed signals and spectrograms reach the caller as invalid input
impl From<DspError> for SeparationError {
    fn from(e: DspError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SeparationError>;
