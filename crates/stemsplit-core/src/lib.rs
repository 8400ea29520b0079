//! Stemsplit Core - spectrogram-mask stem separation

pub mod config;
pub mod dsp;
pub mod separation;

pub use separation::{
    ModelVariant, SeparationConfig, SeparationError, SeparationService, Stem, StemData,
    StereoBuffer,
};
