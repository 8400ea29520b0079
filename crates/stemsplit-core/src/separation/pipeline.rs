//! Separation pipeline
//!
//! One synchronous pass per request:
//!
//! ```text
//! input (any rate) ─► resample to 44.1k ─► pad ─► STFT L/R ─► pack
//!     ─► inference per stem ─► Wiener power sums per channel
//!     ─► per stem, per channel: mask ─► apply to mixture ─► ISTFT ─► trim
//!     ─► resample back to the input rate
//! ```
//!
//! Every stem comes out with exactly the input's length and sample rate.
//! A [`Separator`] owns its FFT scratch buffers; run concurrent requests on
//! separate instances.

use ndarray::{Array2, Array4};

use crate::dsp::{
    fft, resample, resampled_length, stft::padded_length, FrameSet, IstftSynthesizer, StftAnalyzer,
    MODEL_SAMPLE_RATE,
};
use super::config::{MaskParams, ModelVariant, Stem};
use super::error::{Result, SeparationError};
use super::inference::{validate_estimate, InferenceAdapter};
use super::mask::{apply_mask, MaskEstimator};
use super::tensor::ModelTensor;

/// Percent checkpoints of a separation request
pub mod checkpoints {
    /// Model acquisition occupies `0..DOWNLOAD_END`
    pub const DOWNLOAD_END: f32 = 30.0;
    pub const LOADING: f32 = 30.0;
    pub const RESAMPLING: f32 = 32.0;
    pub const ANALYZING: f32 = 35.0;
    pub const PACKING: f32 = 38.0;
    pub const INFERENCE_START: f32 = 40.0;
    pub const INFERENCE_END: f32 = 75.0;
    pub const MASKING_END: f32 = 98.0;
    pub const COMPLETE: f32 = 100.0;
}

/// Stereo audio at a given sample rate
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            left,
            right,
            sample_rate,
        }
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Reject buffers the pipeline cannot process
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SeparationError::InvalidInput("sample rate is zero".to_string()));
        }
        if self.left.len() != self.right.len() {
            return Err(SeparationError::InvalidInput(format!(
                "channel lengths differ: {} vs {}",
                self.left.len(),
                self.right.len()
            )));
        }
        if self.left.is_empty() {
            return Err(SeparationError::InvalidInput("input is empty".to_string()));
        }
        Ok(())
    }
}

/// Separated stems, in the variant's stem order
#[derive(Debug, Clone)]
pub struct StemData {
    /// Sample rate of all stems (the input's)
    pub sample_rate: u32,
    pub stems: Vec<(Stem, StereoBuffer)>,
}

impl StemData {
    pub fn get(&self, stem: Stem) -> Option<&StereoBuffer> {
        self.stems.iter().find(|(s, _)| *s == stem).map(|(_, b)| b)
    }

    /// Samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.stems.first().map_or(0, |(_, b)| b.len())
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples_per_channel() as f64 / self.sample_rate as f64
    }
}

/// Progress stage during separation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationStage {
    /// Fetching model files (if needed)
    DownloadingModel,
    /// Creating inference sessions
    LoadingModel,
    /// Converting to the model sample rate
    Resampling,
    /// STFT of both channels
    Analyzing,
    /// Building the model tensor
    Packing,
    /// Running stem models
    Inference,
    /// Masking and resynthesis
    Masking,
    /// Finished
    Complete,
}

impl SeparationStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DownloadingModel => "downloading",
            Self::LoadingModel => "loading",
            Self::Resampling => "resampling",
            Self::Analyzing => "stft",
            Self::Packing => "packing",
            Self::Inference => "inference",
            Self::Masking => "masking",
            Self::Complete => "complete",
        }
    }
}

/// Combined progress info
#[derive(Debug, Clone)]
pub struct SeparationProgress {
    /// Current stage
    pub stage: SeparationStage,
    /// Overall progress, 0 to 100
    pub percent: f32,
    /// Human-readable status message
    pub message: String,
}

impl SeparationProgress {
    pub fn new(stage: SeparationStage, percent: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
        }
    }
}

/// Spectrogram-mask separator
pub struct Separator {
    mask: MaskEstimator,
    analyzer: StftAnalyzer,
    synthesizer: IstftSynthesizer,
}

impl Separator {
    pub fn new(params: MaskParams) -> Self {
        fft::init();
        Self {
            mask: MaskEstimator::new(params),
            analyzer: StftAnalyzer::new(),
            synthesizer: IstftSynthesizer::new(),
        }
    }

    pub fn mask_estimator(&self) -> &MaskEstimator {
        &self.mask
    }

    /// Separate `input` into the stems of `variant`
    ///
    /// Progress covers `RESAMPLING..=COMPLETE`; model acquisition before
    /// that is the caller's.
    pub fn separate(
        &mut self,
        input: &StereoBuffer,
        variant: ModelVariant,
        adapter: &mut dyn InferenceAdapter,
        progress: &mut dyn FnMut(SeparationProgress),
    ) -> Result<StemData> {
        use checkpoints::*;

        input.validate()?;
        if adapter.variant() != variant {
            return Err(SeparationError::InvalidInput(format!(
                "adapter runs {}, request is {}",
                adapter.variant(),
                variant
            )));
        }

        let input_len = input.len();
        let stems = variant.stems();

        log::info!(
            "Separating {:.2}s at {} Hz into {} stems via {}",
            input.duration_secs(),
            input.sample_rate,
            stems.len(),
            adapter.name()
        );

        // Resample to the model rate
        progress(SeparationProgress::new(
            SeparationStage::Resampling,
            RESAMPLING,
            format!("Resampling {} Hz to {} Hz", input.sample_rate, MODEL_SAMPLE_RATE),
        ));
        let model_len = resampled_length(input_len, input.sample_rate, MODEL_SAMPLE_RATE);
        let padded_len = padded_length(model_len);
        let left = to_model_rate(&input.left, model_len, padded_len);
        let right = to_model_rate(&input.right, model_len, padded_len);
        log::debug!(
            "Model-rate length {} (padded to {})",
            model_len,
            padded_len
        );

        // STFT
        progress(SeparationProgress::new(
            SeparationStage::Analyzing,
            ANALYZING,
            "Computing spectrograms",
        ));
        let frames = [self.analyzer.analyze(&left)?, self.analyzer.analyze(&right)?];
        drop((left, right));
        let num_frames = frames[0].num_frames();

        // Pack
        progress(SeparationProgress::new(
            SeparationStage::Packing,
            PACKING,
            "Preparing model input",
        ));
        let tensor = ModelTensor::pack(&frames[0], &frames[1])?;

        // Inference, one stem at a time
        let inference_span = (INFERENCE_END - INFERENCE_START) / stems.len() as f32;
        let mut estimates: Vec<Array4<f32>> = Vec::with_capacity(stems.len());
        for (i, &stem) in stems.iter().enumerate() {
            progress(SeparationProgress::new(
                SeparationStage::Inference,
                INFERENCE_START + inference_span * i as f32,
                format!("Estimating {}", stem.display_name()),
            ));
            let estimate = adapter.run(stem, &tensor)?;
            validate_estimate(stem, &tensor, &estimate)?;
            estimates.push(estimate);
        }
        drop(tensor);

        // Wiener denominators, shared by every stem of a channel
        let power_sums: [Array2<f64>; 2] = [
            self.mask.power_sum(&estimates, 0, num_frames),
            self.mask.power_sum(&estimates, 1, num_frames),
        ];

        // Mask and resynthesize
        let masking_span = (MASKING_END - INFERENCE_END) / stems.len() as f32;
        let mut outputs = Vec::with_capacity(stems.len());
        for (i, (&stem, estimate)) in stems.iter().zip(&estimates).enumerate() {
            progress(SeparationProgress::new(
                SeparationStage::Masking,
                INFERENCE_END + masking_span * i as f32,
                format!("Reconstructing {}", stem.display_name()),
            ));

            let [left, right] = [0, 1].map(|channel| {
                self.reconstruct(estimate, &power_sums[channel], &frames[channel], channel, model_len)
                    .map(|samples| resample(&samples, input_len))
            });

            outputs.push((stem, StereoBuffer::new(left?, right?, input.sample_rate)));
        }

        progress(SeparationProgress::new(
            SeparationStage::Complete,
            COMPLETE,
            "Separation complete",
        ));

        log::info!("Separation complete: {} stems x {} samples", outputs.len(), input_len);

        Ok(StemData {
            sample_rate: input.sample_rate,
            stems: outputs,
        })
    }

    /// Time-domain signal of one stem and channel at the model rate
    fn reconstruct(
        &mut self,
        estimate: &Array4<f32>,
        power_sum: &Array2<f64>,
        mixture: &FrameSet,
        channel: usize,
        model_len: usize,
    ) -> Result<Vec<f32>> {
        let mask = self.mask.estimate(estimate, power_sum, channel);
        let magnitude = apply_mask(&mask, &mixture.magnitude)?;
        Ok(self
            .synthesizer
            .synthesize(&magnitude, &mixture.phase, model_len)?)
    }
}

impl Default for Separator {
    fn default() -> Self {
        Self::new(MaskParams::default())
    }
}

/// Resample one channel to `model_len` samples and zero-pad to `padded_len`
fn to_model_rate(channel: &[f32], model_len: usize, padded_len: usize) -> Vec<f32> {
    let mut samples = resample(channel, model_len);
    samples.resize(padded_len, 0.0);
    samples
}
