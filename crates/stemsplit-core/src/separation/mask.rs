//! Mask estimation from per-stem model estimates
//!
//! Turns the raw magnitude estimates of all stems into one soft mask per stem
//! and channel, covering the full STFT bin range.
//!
//! ## Stages
//!
//! ```text
//! raw[stem]  = |est[stem]|^p / (Σ|est[all]|^p + eps)        p = 6
//! sharp      = 1 / (1 + exp(-gain · (raw - center)))        gain = 12, center = 0.5
//! smooth     = median over frames [t-r, t+r]                r = 2
//! hf band i  = mean(smooth over modeled band (B-1-i))       B = 8
//! stem_mag   = mask · mixture_mag                           all 2049 bins
//! ```
//!
//! The raw masks of all stems sum to one at every (frame, bin); the later
//! stages are applied per stem and drop that property on purpose.
//!
//! Reference: UVR5 filtering.py, Open-Unmix, Nugraha et al. (2016)

use ndarray::{s, Array2, Array4, ArrayView1};

use crate::dsp::FREQ_BINS;
use super::config::MaskParams;
use super::error::{Result, SeparationError};
use super::tensor::{CHUNK_FRAMES, MODEL_BINS};

/// Largest temporal window the median filter supports
const MAX_MEDIAN_WINDOW: usize = 17;

/// Per-stem mask estimator
#[derive(Debug, Clone)]
pub struct MaskEstimator {
    params: MaskParams,
}

impl MaskEstimator {
    pub fn new(mut params: MaskParams) -> Self {
        params.validate();
        Self { params }
    }

    pub fn params(&self) -> &MaskParams {
        &self.params
    }

    /// Model estimates of one frame of one channel (the 1024 modeled bins)
    fn estimate_row(estimate: &Array4<f32>, channel: usize, frame: usize) -> ArrayView1<'_, f32> {
        estimate.slice(s![channel, frame / CHUNK_FRAMES, frame % CHUNK_FRAMES, ..])
    }

    /// Sum over all stems of `|estimate|^p`, shaped `[num_frames, MODEL_BINS]`
    ///
    /// This is the Wiener denominator (without epsilon) shared by every stem
    /// of one channel. Accumulated in f64: sixth powers of quiet bins fall
    /// far below f32 resolution next to loud ones.
    pub fn power_sum(
        &self,
        estimates: &[Array4<f32>],
        channel: usize,
        num_frames: usize,
    ) -> Array2<f64> {
        let power = self.params.wiener_power;
        let mut sum = Array2::<f64>::zeros((num_frames, MODEL_BINS));

        for estimate in estimates {
            for frame in 0..num_frames {
                let row = Self::estimate_row(estimate, channel, frame);
                let mut out = sum.row_mut(frame);
                for (acc, &v) in out.iter_mut().zip(row.iter()) {
                    *acc += f64::from(v.abs()).powi(power);
                }
            }
        }

        sum
    }

    /// Raw Wiener-style soft mask of one stem
    pub fn raw_mask(
        &self,
        estimate: &Array4<f32>,
        power_sum: &Array2<f64>,
        channel: usize,
    ) -> Array2<f32> {
        let power = self.params.wiener_power;
        let eps = f64::from(self.params.epsilon);
        let num_frames = power_sum.nrows();
        let mut mask = Array2::<f32>::zeros((num_frames, MODEL_BINS));

        for frame in 0..num_frames {
            let row = Self::estimate_row(estimate, channel, frame);
            let denom = power_sum.row(frame);
            let mut out = mask.row_mut(frame);
            for ((m, &v), &d) in out.iter_mut().zip(row.iter()).zip(denom.iter()) {
                *m = (f64::from(v.abs()).powi(power) / (d + eps)) as f32;
            }
        }

        mask
    }

    /// Logistic sharpening toward 0/1, in place
    pub fn sharpen(&self, mask: &mut Array2<f32>) {
        let gain = self.params.sigmoid_gain;
        let center = self.params.sigmoid_center;
        mask.mapv_inplace(|m| 1.0 / (1.0 + (-gain * (m - center)).exp()));
    }

    /// Sliding median along the frame axis
    ///
    /// Windows shrink at the sequence edges (radius 2 gives 3, 4, 5, ..., 5,
    /// 4, 3 frames); even-sized windows average their two middle values.
    pub fn smooth_temporal(&self, mask: &Array2<f32>) -> Array2<f32> {
        let radius = self.params.median_radius;
        let (num_frames, num_bins) = mask.dim();
        if radius == 0 || num_frames < 2 {
            return mask.clone();
        }

        let mut out = Array2::<f32>::zeros((num_frames, num_bins));
        let mut window = [0.0f32; MAX_MEDIAN_WINDOW];

        for bin in 0..num_bins {
            let column = mask.column(bin);
            for frame in 0..num_frames {
                let lo = frame.saturating_sub(radius);
                let hi = (frame + radius).min(num_frames - 1);
                let n = hi - lo + 1;

                for (slot, &v) in window[..n].iter_mut().zip(column.slice(s![lo..=hi])) {
                    *slot = v;
                }
                let values = &mut window[..n];
                values.sort_unstable_by(|a, b| a.total_cmp(b));

                out[[frame, bin]] = if n % 2 == 1 {
                    values[n / 2]
                } else {
                    0.5 * (values[n / 2 - 1] + values[n / 2])
                };
            }
        }

        out
    }

    /// Modeled band whose average fills high-frequency band `band`
    ///
    /// The mapping is mirrored: the lowest extension band borrows from the
    /// highest modeled band and vice versa.
    pub fn hf_source_band(&self, band: usize) -> usize {
        self.params.hf_bands - 1 - band
    }

    /// Bin range `[start, end)` of high-frequency band `band`
    ///
    /// Bands are equal width; the last one also takes the remainder so the
    /// range ends at the Nyquist bin.
    pub fn hf_band_range(&self, band: usize) -> (usize, usize) {
        let bands = self.params.hf_bands;
        let width = (FREQ_BINS - MODEL_BINS) / bands;
        let start = MODEL_BINS + band * width;
        let end = if band + 1 == bands { FREQ_BINS } else { start + width };
        (start, end)
    }

    /// Widen a `[frame, MODEL_BINS]` mask to `[frame, FREQ_BINS]`
    pub fn extend_high_frequencies(&self, mask: &Array2<f32>) -> Array2<f32> {
        let bands = self.params.hf_bands;
        let num_frames = mask.nrows();
        let source_width = MODEL_BINS / bands;

        let mut out = Array2::<f32>::zeros((num_frames, FREQ_BINS));
        out.slice_mut(s![.., ..MODEL_BINS]).assign(mask);

        for frame in 0..num_frames {
            let row = mask.row(frame);
            for band in 0..bands {
                let source = self.hf_source_band(band);
                let source_start = source * source_width;
                let mean = row
                    .slice(s![source_start..source_start + source_width])
                    .mean()
                    .unwrap_or(0.0);

                let (start, end) = self.hf_band_range(band);
                out.slice_mut(s![frame, start..end]).fill(mean);
            }
        }

        out
    }

    /// Full mask of one stem and channel: raw → sharpen → smooth → extend
    pub fn estimate(
        &self,
        estimate: &Array4<f32>,
        power_sum: &Array2<f64>,
        channel: usize,
    ) -> Array2<f32> {
        let mut mask = self.raw_mask(estimate, power_sum, channel);
        self.sharpen(&mut mask);
        let smoothed = self.smooth_temporal(&mask);
        self.extend_high_frequencies(&smoothed)
    }
}

impl Default for MaskEstimator {
    fn default() -> Self {
        Self::new(MaskParams::default())
    }
}

/// Masked stem magnitude: `mask · mixture` over every bin
///
/// Always scales the mixture's own STFT magnitude, never a model estimate.
pub fn apply_mask(mask: &Array2<f32>, mixture_magnitude: &Array2<f32>) -> Result<Array2<f32>> {
    if mask.dim() != mixture_magnitude.dim() {
        return Err(SeparationError::InvalidInput(format!(
            "mask {:?} does not match magnitude {:?}",
            mask.dim(),
            mixture_magnitude.dim()
        )));
    }
    Ok(mask * mixture_magnitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate_from(num_frames: usize, f: impl Fn(usize, usize, usize) -> f32) -> Array4<f32> {
        let chunks = num_frames.div_ceil(CHUNK_FRAMES);
        let mut est = Array4::<f32>::zeros((2, chunks, CHUNK_FRAMES, MODEL_BINS));
        for c in 0..2 {
            for t in 0..num_frames {
                for k in 0..MODEL_BINS {
                    est[[c, t / CHUNK_FRAMES, t % CHUNK_FRAMES, k]] = f(c, t, k);
                }
            }
        }
        est
    }

    fn hash_value(seed: usize, c: usize, t: usize, k: usize) -> f32 {
        let h = (seed * 7919 + c * 104_729 + t * 1_299_709 + k * 15_485_863) % 10_007;
        0.5 + 4.5 * h as f32 / 10_007.0
    }

    #[test]
    fn test_raw_masks_sum_to_one() {
        let estimator = MaskEstimator::default();
        let frames = 20;

        // Loud estimates (0.5 to 5.0) and quiet ones (0.005 to 0.05)
        for scale in [1.0f32, 0.01] {
            let estimates: Vec<Array4<f32>> = (0..4)
                .map(|seed| estimate_from(frames, |c, t, k| scale * hash_value(seed, c, t, k)))
                .collect();

            for channel in 0..2 {
                let sum = estimator.power_sum(&estimates, channel, frames);
                let masks: Vec<Array2<f32>> = estimates
                    .iter()
                    .map(|e| estimator.raw_mask(e, &sum, channel))
                    .collect();

                for t in 0..frames {
                    for k in 0..MODEL_BINS {
                        let total: f32 = masks.iter().map(|m| m[[t, k]]).sum();
                        assert!(
                            (total - 1.0).abs() < 1e-6,
                            "sum {} at ({}, {}) with scale {}",
                            total,
                            t,
                            k,
                            scale
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_quiet_dominant_stem_keeps_sharpened_mask() {
        let estimator = MaskEstimator::default();
        for mag in [0.01f32, 0.02, 0.05] {
            let loud = estimate_from(3, |_, _, _| mag);
            let quiet = estimate_from(3, |_, _, _| mag / 2.0);
            let estimates = vec![loud, quiet];
            let sum = estimator.power_sum(&estimates, 0, 3);

            let raw_loud = estimator.raw_mask(&estimates[0], &sum, 0);
            let raw_quiet = estimator.raw_mask(&estimates[1], &sum, 0);
            approx::assert_relative_eq!(raw_loud[[1, 100]], 64.0 / 65.0, max_relative = 1e-5);
            approx::assert_abs_diff_eq!(
                raw_loud[[1, 100]] + raw_quiet[[1, 100]],
                1.0,
                epsilon = 1e-6
            );

            let mask = estimator.estimate(&estimates[0], &sum, 0);
            assert!(mask[[1, 100]] > 0.99, "mask {} at magnitude {}", mask[[1, 100]], mag);
        }
    }

    #[test]
    fn test_dominant_stem_takes_bin() {
        let estimator = MaskEstimator::default();
        // 2:1 magnitude ratio becomes 64:1 in power-6 space
        let loud = estimate_from(1, |_, _, _| 2.0);
        let quiet = estimate_from(1, |_, _, _| 1.0);
        let estimates = vec![loud, quiet];
        let sum = estimator.power_sum(&estimates, 0, 1);
        let mask = estimator.raw_mask(&estimates[0], &sum, 0);
        approx::assert_relative_eq!(mask[[0, 10]], 64.0 / 65.0, max_relative = 1e-6);
    }

    #[test]
    fn test_sigmoid_sharpening() {
        let estimator = MaskEstimator::default();
        let mut mask = Array2::from_shape_vec((1, 3), vec![0.0, 0.5, 1.0]).unwrap();
        estimator.sharpen(&mut mask);
        approx::assert_abs_diff_eq!(mask[[0, 0]], 1.0 / (1.0 + 6.0f32.exp()), epsilon = 1e-7);
        approx::assert_abs_diff_eq!(mask[[0, 1]], 0.5, epsilon = 1e-7);
        assert!(mask[[0, 2]] > 0.997);
    }

    #[test]
    fn test_median_removes_isolated_frame() {
        let estimator = MaskEstimator::default();
        let mut mask = Array2::<f32>::zeros((9, 2));
        mask[[4, 0]] = 1.0;
        let smoothed = estimator.smooth_temporal(&mask);
        assert!(smoothed.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_median_preserves_sustained_onset() {
        let estimator = MaskEstimator::default();
        let values = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let mask = Array2::from_shape_vec((9, 1), values.to_vec()).unwrap();
        let smoothed = estimator.smooth_temporal(&mask);
        let out: Vec<f32> = smoothed.column(0).to_vec();
        assert_eq!(out, values.to_vec());
    }

    #[test]
    fn test_median_edge_windows() {
        let estimator = MaskEstimator::default();
        let mask = Array2::from_shape_vec((5, 1), vec![0.9, 0.1, 0.5, 0.3, 0.7]).unwrap();
        let smoothed = estimator.smooth_temporal(&mask);
        // Frame 0: median of {0.9, 0.1, 0.5} (3-frame window)
        approx::assert_abs_diff_eq!(smoothed[[0, 0]], 0.5, epsilon = 1e-7);
        // Frame 1: median of {0.9, 0.1, 0.5, 0.3} (4-frame window)
        approx::assert_abs_diff_eq!(smoothed[[1, 0]], 0.4, epsilon = 1e-7);
        // Frame 2: full 5-frame window
        approx::assert_abs_diff_eq!(smoothed[[2, 0]], 0.5, epsilon = 1e-7);
    }

    #[test]
    fn test_hf_band_mapping_is_mirrored() {
        let estimator = MaskEstimator::default();
        assert_eq!(estimator.hf_source_band(0), 7);
        assert_eq!(estimator.hf_source_band(7), 0);
        for band in 0..8 {
            assert_eq!(estimator.hf_source_band(estimator.hf_source_band(band)), band);
        }
    }

    #[test]
    fn test_hf_bands_cover_upper_range() {
        let estimator = MaskEstimator::default();
        assert_eq!(estimator.hf_band_range(0).0, MODEL_BINS);
        for band in 0..7 {
            assert_eq!(estimator.hf_band_range(band).1, estimator.hf_band_range(band + 1).0);
        }
        assert_eq!(estimator.hf_band_range(7).1, FREQ_BINS);
    }

    #[test]
    fn test_hf_extension_by_construction() {
        let estimator = MaskEstimator::default();
        // Each modeled band holds its own index / 10
        let mask = Array2::from_shape_fn((3, MODEL_BINS), |(_, k)| (k / 128) as f32 / 10.0);
        let extended = estimator.extend_high_frequencies(&mask);

        assert_eq!(extended.dim(), (3, FREQ_BINS));
        assert_eq!(extended.slice(s![.., ..MODEL_BINS]), mask);
        for band in 0..8 {
            let (start, end) = estimator.hf_band_range(band);
            let expected = (7 - band) as f32 / 10.0;
            for k in start..end {
                approx::assert_abs_diff_eq!(extended[[1, k]], expected, epsilon = 1e-6);
            }
        }
        // First extension band sources from the last modeled band
        approx::assert_abs_diff_eq!(extended[[0, MODEL_BINS]], 0.7, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(extended[[0, FREQ_BINS - 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_equal_estimates_give_half_mask_everywhere() {
        let estimator = MaskEstimator::default();
        let a = estimate_from(6, |_, _, _| 1.5);
        let estimates = vec![a.clone(), a];
        let sum = estimator.power_sum(&estimates, 1, 6);
        let mask = estimator.estimate(&estimates[0], &sum, 1);
        assert_eq!(mask.dim(), (6, FREQ_BINS));
        assert!(mask.iter().all(|&m| (m - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_apply_mask_scales_mixture() {
        let mask = Array2::from_elem((2, FREQ_BINS), 0.25f32);
        let mixture = Array2::from_elem((2, FREQ_BINS), 8.0f32);
        let stem = apply_mask(&mask, &mixture).unwrap();
        assert!(stem.iter().all(|&v| v == 2.0));

        let wrong = Array2::from_elem((3, FREQ_BINS), 8.0f32);
        assert!(apply_mask(&mask, &wrong).is_err());
    }
}
