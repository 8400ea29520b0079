//! Model input tensor packing
//!
//! The stem models consume magnitude spectrograms shaped
//! `[channel=2, chunk, frame_in_chunk=512, bin=1024]`, row-major. Only the
//! lowest 1024 of the 2049 STFT bins are fed; the frame axis is zero-padded
//! up to a whole number of chunks. In flat terms, frame `f`, bin `k` of
//! channel `c` lives at `c·padded_frames·1024 + f·1024 + k`.

use ndarray::Array4;

use crate::dsp::FrameSet;
use super::error::{Result, SeparationError};

/// Low-frequency bins estimated by the model
pub const MODEL_BINS: usize = 1024;

/// Frames per model chunk
pub const CHUNK_FRAMES: usize = 512;

/// Stereo input only
pub const MODEL_CHANNELS: usize = 2;

/// Number of chunks needed for `num_frames` frames
pub fn chunk_count(num_frames: usize) -> usize {
    num_frames.div_ceil(CHUNK_FRAMES)
}

/// Packed magnitude tensor shared by every stem model of one request
#[derive(Debug, Clone)]
pub struct ModelTensor {
    data: Array4<f32>,
    num_frames: usize,
}

impl ModelTensor {
    /// Pack both channels' magnitudes
    pub fn pack(left: &FrameSet, right: &FrameSet) -> Result<Self> {
        let num_frames = left.num_frames();
        if right.num_frames() != num_frames {
            return Err(SeparationError::InvalidInput(format!(
                "channel frame counts differ: {} vs {}",
                num_frames,
                right.num_frames()
            )));
        }
        if left.magnitude.ncols() < MODEL_BINS || right.magnitude.ncols() < MODEL_BINS {
            return Err(SeparationError::InvalidInput(format!(
                "frames need at least {} bins",
                MODEL_BINS
            )));
        }

        let num_chunks = chunk_count(num_frames);
        let mut data = Array4::<f32>::zeros((MODEL_CHANNELS, num_chunks, CHUNK_FRAMES, MODEL_BINS));

        for (channel, frames) in [left, right].into_iter().enumerate() {
            for (frame, row) in frames.magnitude.rows().into_iter().enumerate() {
                let chunk = frame / CHUNK_FRAMES;
                let offset = frame % CHUNK_FRAMES;
                let mut dest = data.slice_mut(ndarray::s![channel, chunk, offset, ..]);
                dest.assign(&row.slice(ndarray::s![..MODEL_BINS]));
            }
        }

        log::debug!(
            "Packed model tensor: {} frames -> {:?}",
            num_frames,
            data.shape()
        );

        Ok(Self { data, num_frames })
    }

    /// Frames carrying signal (the rest is padding)
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn num_chunks(&self) -> usize {
        self.data.shape()[1]
    }

    /// Frame count including padding
    pub fn padded_frames(&self) -> usize {
        self.num_chunks() * CHUNK_FRAMES
    }

    /// `[channel, chunk, frame_in_chunk, bin]`
    pub fn shape(&self) -> [usize; 4] {
        [MODEL_CHANNELS, self.num_chunks(), CHUNK_FRAMES, MODEL_BINS]
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Value at an absolute frame index, as the flat layout addresses it
    pub fn get(&self, channel: usize, frame: usize, bin: usize) -> f32 {
        self.data[[channel, frame / CHUNK_FRAMES, frame % CHUNK_FRAMES, bin]]
    }
}

/// Check a model's estimate against the tensor that produced it
pub fn estimate_matches(input: &ModelTensor, estimate: &Array4<f32>) -> bool {
    estimate.shape() == input.shape().as_slice()
}
