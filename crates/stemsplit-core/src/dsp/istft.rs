//! Inverse STFT with windowed overlap-add
//!
//! Rebuilds each frame's full spectrum from magnitude and phase by conjugate
//! mirroring, inverse-transforms it, applies the synthesis window and
//! accumulates into the output. The accumulated squared window is divided out
//! at the end, which makes analysis followed by synthesis an identity wherever
//! the window energy is non-negligible.

use ndarray::Array2;

use super::error::{DspError, Result};
use super::fft::{self, FFT_SIZE};
use super::stft::{hann_window, FRAME_LENGTH, FREQ_BINS, HOP_LENGTH};

/// Samples whose accumulated window energy is at or below this stay zero
const WINDOW_SUM_FLOOR: f32 = 1e-8;

/// ISTFT synthesizer with reusable FFT scratch buffers
pub struct IstftSynthesizer {
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl IstftSynthesizer {
    pub fn new() -> Self {
        Self {
            real: vec![0.0; FFT_SIZE],
            imag: vec![0.0; FFT_SIZE],
        }
    }

    /// Resynthesize a signal of `output_len` samples
    ///
    /// `magnitude` and `phase` are `[frame, FREQ_BINS]`. The overlap-add
    /// buffer spans every frame; it is then trimmed (or zero-extended) to
    /// `output_len`.
    pub fn synthesize(
        &mut self,
        magnitude: &Array2<f32>,
        phase: &Array2<f32>,
        output_len: usize,
    ) -> Result<Vec<f32>> {
        if magnitude.dim() != phase.dim() {
            return Err(DspError::ShapeMismatch {
                magnitude: magnitude.dim(),
                phase: phase.dim(),
            });
        }
        if magnitude.ncols() != FREQ_BINS {
            return Err(DspError::BinCount {
                expected: FREQ_BINS,
                actual: magnitude.ncols(),
            });
        }

        let num_frames = magnitude.nrows();
        if num_frames == 0 {
            return Ok(vec![0.0; output_len]);
        }

        let window = hann_window();
        let buffer_len = (num_frames - 1) * HOP_LENGTH + FRAME_LENGTH;
        let mut output = vec![0.0f32; buffer_len];
        let mut window_sum = vec![0.0f32; buffer_len];

        for frame in 0..num_frames {
            let mag_row = magnitude.row(frame);
            let phase_row = phase.row(frame);

            for k in 0..FREQ_BINS {
                let (sin, cos) = phase_row[k].sin_cos();
                self.real[k] = mag_row[k] * cos;
                self.imag[k] = mag_row[k] * sin;
            }
            for k in FREQ_BINS..FFT_SIZE {
                self.real[k] = self.real[FFT_SIZE - k];
                self.imag[k] = -self.imag[FFT_SIZE - k];
            }

            fft::inverse(&mut self.real, &mut self.imag);

            let start = frame * HOP_LENGTH;
            let out = &mut output[start..start + FRAME_LENGTH];
            let sum = &mut window_sum[start..start + FRAME_LENGTH];
            for i in 0..FRAME_LENGTH {
                out[i] += self.real[i] * window[i];
                sum[i] += window[i] * window[i];
            }
        }

        for (sample, &energy) in output.iter_mut().zip(&window_sum) {
            if energy > WINDOW_SUM_FLOOR {
                *sample /= energy;
            }
        }

        output.resize(output_len, 0.0);
        Ok(output)
    }
}

impl Default for IstftSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}
