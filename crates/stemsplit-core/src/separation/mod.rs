//! Audio stem separation
//!
//! Splits a stereo mix into the stems of a model variant by spectrogram
//! masking: per-stem models estimate magnitudes, the estimates become soft
//! masks, and the masks are applied to the mixture's own spectrogram.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SeparationService                      │
//! │  • Worker thread, one request at a time                 │
//! │  • Progress + terminal response per request             │
//! │  • Keeps sessions of the last variant                   │
//! └─────────────────────────────────────────────────────────┘
//!            │                                │
//!            ▼                                ▼
//! ┌──────────────────────┐        ┌──────────────────────────┐
//! │    ModelManager      │        │        Separator          │
//! │  ModelStore (cache)  │        │  resample → STFT → pack   │
//! │  ModelFetcher (HTTP) │        │  → InferenceAdapter       │
//! └──────────────────────┘        │  → MaskEstimator → ISTFT  │
//!                                 └──────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod inference;
pub mod mask;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod tensor;

pub use config::{MaskParams, ModelUrls, ModelVariant, SeparationConfig, Stem};
pub use error::{Result, SeparationError};
pub use fetch::{HttpFetcher, ModelFetcher};
pub use inference::{InferenceAdapter, InferenceLoader, OrtInference, OrtLoader};
pub use mask::{apply_mask, MaskEstimator};
pub use model::{ModelManager, VariantModels};
pub use pipeline::{
    SeparationProgress, SeparationStage, Separator, StemData, StereoBuffer,
};
pub use service::{Request, Response, SeparationService};
pub use store::{DiskModelStore, ModelStore};
pub use tensor::{ModelTensor, CHUNK_FRAMES, MODEL_BINS};
