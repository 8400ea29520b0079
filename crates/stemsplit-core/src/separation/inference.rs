//! Model inference seam
//!
//! The pipeline only knows the tensor contract: one call per stem, input and
//! output both `[2, chunks, 512, 1024]` float magnitudes. [`OrtInference`]
//! fulfils it with one ONNX Runtime session per stem; tests substitute their
//! own [`InferenceAdapter`].

use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use super::config::{ModelVariant, Stem};
use super::error::{Result, SeparationError};
use super::tensor::{estimate_matches, ModelTensor};

/// Input tensor name of the exported stem models
const MODEL_INPUT: &str = "x";

/// Runs one stem model on the packed magnitude tensor
pub trait InferenceAdapter {
    /// Magnitude estimate for `stem`, same shape as the input
    fn run(&mut self, stem: Stem, input: &ModelTensor) -> Result<Array4<f32>>;

    /// Variant whose stems this adapter can run
    fn variant(&self) -> ModelVariant;

    /// Adapter name for logging
    fn name(&self) -> &'static str;
}

/// Builds an [`InferenceAdapter`] from the raw model bytes of a variant
///
/// Lives on the service thread; the adapter it returns stays there.
pub trait InferenceLoader: Send {
    fn load(
        &self,
        variant: ModelVariant,
        models: Vec<(Stem, Vec<u8>)>,
    ) -> Result<Box<dyn InferenceAdapter>>;
}

/// Reject estimates with the wrong shape or non-finite values
pub fn validate_estimate(stem: Stem, input: &ModelTensor, estimate: &Array4<f32>) -> Result<()> {
    if !estimate_matches(input, estimate) {
        return Err(SeparationError::inference(
            stem,
            format!(
                "unexpected output shape {:?}, expected {:?}",
                estimate.shape(),
                input.shape()
            ),
        ));
    }
    if estimate.iter().any(|v| !v.is_finite()) {
        return Err(SeparationError::inference(stem, "output contains non-finite values"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// ONNX Runtime
// ─────────────────────────────────────────────────────────────────────────────

/// One ONNX Runtime session per stem of a variant
pub struct OrtInference {
    variant: ModelVariant,
    sessions: Vec<(Stem, Session)>,
}

impl OrtInference {
    /// Create sessions from in-memory model files
    pub fn from_models(
        variant: ModelVariant,
        models: Vec<(Stem, Vec<u8>)>,
        intra_threads: usize,
    ) -> Result<Self> {
        let mut sessions = Vec::with_capacity(models.len());

        for (stem, bytes) in models {
            log::info!(
                "Loading {} model for {} ({} bytes)",
                stem,
                variant,
                bytes.len()
            );
            let session = Session::builder()
                .map_err(|e| SeparationError::inference(stem, e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| SeparationError::inference(stem, e.to_string()))?
                .with_intra_threads(intra_threads)
                .map_err(|e| SeparationError::inference(stem, e.to_string()))?
                .commit_from_memory(&bytes)
                .map_err(|e| {
                    SeparationError::inference(stem, format!("Failed to load ONNX model: {}", e))
                })?;
            sessions.push((stem, session));
        }

        Ok(Self { variant, sessions })
    }
}

impl InferenceAdapter for OrtInference {
    fn run(&mut self, stem: Stem, input: &ModelTensor) -> Result<Array4<f32>> {
        let variant = self.variant;
        let session = self
            .sessions
            .iter_mut()
            .find(|(s, _)| *s == stem)
            .map(|(_, session)| session)
            .ok_or_else(|| {
                SeparationError::inference(stem, format!("no session loaded for {}", variant))
            })?;

        let input_tensor = Tensor::from_array(input.as_array().clone()).map_err(|e| {
            SeparationError::inference(stem, format!("Failed to create input tensor: {}", e))
        })?;

        let outputs = session
            .run(ort::inputs![MODEL_INPUT => input_tensor])
            .map_err(|e| SeparationError::inference(stem, format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| SeparationError::inference(stem, "No output tensor"))?;

        let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
            SeparationError::inference(stem, format!("Failed to extract output: {}", e))
        })?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        if dims.len() != 4 {
            return Err(SeparationError::inference(
                stem,
                format!("Unexpected output rank: {:?}", dims),
            ));
        }

        let estimate = Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec())
            .map_err(|e| SeparationError::inference(stem, format!("Bad output layout: {}", e)))?;

        log::debug!("{} estimate shape: {:?}", stem, estimate.shape());

        Ok(estimate)
    }

    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn name(&self) -> &'static str {
        "ONNX Runtime"
    }
}

/// Loader producing [`OrtInference`] adapters
pub struct OrtLoader {
    intra_threads: usize,
}

impl OrtLoader {
    pub fn new(intra_threads: usize) -> Self {
        Self { intra_threads }
    }
}

impl InferenceLoader for OrtLoader {
    fn load(
        &self,
        variant: ModelVariant,
        models: Vec<(Stem, Vec<u8>)>,
    ) -> Result<Box<dyn InferenceAdapter>> {
        Ok(Box::new(OrtInference::from_models(
            variant,
            models,
            self.intra_threads,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{FrameSet, FREQ_BINS};
    use ndarray::Array2;

    fn tensor(frames: usize) -> ModelTensor {
        let set = FrameSet {
            magnitude: Array2::from_elem((frames, FREQ_BINS), 1.0),
            phase: Array2::zeros((frames, FREQ_BINS)),
        };
        ModelTensor::pack(&set, &set).unwrap()
    }

    #[test]
    fn test_validate_accepts_matching_estimate() {
        let input = tensor(5);
        let estimate = input.as_array().clone();
        assert!(validate_estimate(Stem::Vocals, &input, &estimate).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_shape() {
        let input = tensor(5);
        let estimate = Array4::<f32>::zeros((2, 2, 512, 1024));
        let err = validate_estimate(Stem::Drums, &input, &estimate).unwrap_err();
        assert!(matches!(err, SeparationError::Inference { stem: Stem::Drums, .. }));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let input = tensor(5);
        let mut estimate = input.as_array().clone();
        estimate[[1, 0, 3, 9]] = f32::NAN;
        assert!(validate_estimate(Stem::Bass, &input, &estimate).is_err());
    }
}
