//! Signal processing primitives for spectrogram-domain separation
//!
//! ```text
//! signal ──► stft::StftAnalyzer ──► FrameSet (magnitude, phase)
//!                                        │ mask applied to magnitude
//!                                        ▼
//! signal ◄── istft::IstftSynthesizer ◄── masked magnitude + original phase
//! ```
//!
//! Both directions share the 4096-point [`fft`] kernel and the periodic
//! Hann window. [`resample`] converts to and from the model's 44.1 kHz.

pub mod error;
pub mod fft;
pub mod istft;
pub mod resample;
pub mod stft;

pub use error::DspError;
pub use istft::IstftSynthesizer;
pub use resample::{resample, resampled_length, MODEL_SAMPLE_RATE};
pub use stft::{FrameSet, StftAnalyzer, FRAME_LENGTH, FREQ_BINS, HOP_LENGTH};
