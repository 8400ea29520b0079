//! Short-time Fourier analysis
//!
//! Frames a mono channel with a periodic Hann window and produces per-frame
//! magnitude and phase through the fixed-size FFT kernel. There is no
//! centering: frame `i` covers samples `[i·HOP_LENGTH, i·HOP_LENGTH + FRAME_LENGTH)`.
//! Signals shorter than one frame must be zero-padded before analysis.

use std::sync::LazyLock;

use ndarray::Array2;

use super::error::{DspError, Result};
use super::fft::{self, FFT_SIZE};

/// Analysis frame length in samples
pub const FRAME_LENGTH: usize = FFT_SIZE;

/// Stride between consecutive frame starts
pub const HOP_LENGTH: usize = 1024;

/// Non-redundant bins of a real-input frame
pub const FREQ_BINS: usize = FRAME_LENGTH / 2 + 1;

static HANN: LazyLock<Vec<f32>> = LazyLock::new(|| {
    (0..FRAME_LENGTH)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / FRAME_LENGTH as f64;
            (0.5 * (1.0 - phase.cos())) as f32
        })
        .collect()
});

/// Periodic Hann window shared by analysis and synthesis
pub fn hann_window() -> &'static [f32] {
    &HANN
}

/// Number of whole frames that fit in `len` samples
pub fn frame_count(len: usize) -> usize {
    if len < FRAME_LENGTH {
        0
    } else {
        (len - FRAME_LENGTH) / HOP_LENGTH + 1
    }
}

/// Smallest length `>= len` whose frames cover every sample
///
/// Always at least one frame; the tail is extended to the next hop boundary.
pub fn padded_length(len: usize) -> usize {
    if len <= FRAME_LENGTH {
        FRAME_LENGTH
    } else {
        FRAME_LENGTH + (len - FRAME_LENGTH).div_ceil(HOP_LENGTH) * HOP_LENGTH
    }
}

/// Magnitude and phase of every frame of one channel
///
/// Both arrays are shaped `[frame, FREQ_BINS]`.
#[derive(Debug, Clone)]
pub struct FrameSet {
    pub magnitude: Array2<f32>,
    pub phase: Array2<f32>,
}

impl FrameSet {
    pub fn num_frames(&self) -> usize {
        self.magnitude.nrows()
    }
}

/// STFT analyzer with reusable FFT scratch buffers
pub struct StftAnalyzer {
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl StftAnalyzer {
    pub fn new() -> Self {
        Self {
            real: vec![0.0; FRAME_LENGTH],
            imag: vec![0.0; FRAME_LENGTH],
        }
    }

    /// Analyze a mono signal
    ///
    /// Fails with [`DspError::SignalTooShort`] if the signal is shorter than
    /// one frame.
    pub fn analyze(&mut self, signal: &[f32]) -> Result<FrameSet> {
        let num_frames = frame_count(signal.len());
        if num_frames == 0 {
            return Err(DspError::SignalTooShort {
                len: signal.len(),
                frame: FRAME_LENGTH,
            });
        }

        let window = hann_window();
        let mut magnitude = Array2::<f32>::zeros((num_frames, FREQ_BINS));
        let mut phase = Array2::<f32>::zeros((num_frames, FREQ_BINS));

        for frame in 0..num_frames {
            let start = frame * HOP_LENGTH;
            let segment = &signal[start..start + FRAME_LENGTH];

            for ((re, &s), &w) in self.real.iter_mut().zip(segment).zip(window) {
                *re = s * w;
            }
            self.imag.fill(0.0);

            fft::forward(&mut self.real, &mut self.imag);

            let mut mag_row = magnitude.row_mut(frame);
            let mut phase_row = phase.row_mut(frame);
            for k in 0..FREQ_BINS {
                let (re, im) = (self.real[k], self.imag[k]);
                mag_row[k] = (re * re + im * im).sqrt();
                phase_row[k] = im.atan2(re);
            }
        }

        log::debug!("STFT: {} samples -> {} frames", signal.len(), num_frames);

        Ok(FrameSet { magnitude, phase })
    }
}

impl Default for StftAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
