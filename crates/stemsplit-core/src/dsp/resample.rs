//! Linear-interpolation sample-rate conversion to and from the model rate

/// Native sample rate of the separation models
pub const MODEL_SAMPLE_RATE: u32 = 44100;

/// Output length for converting `len` samples from `from_rate` to `to_rate`
pub fn resampled_length(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return len;
    }
    ((len as f64) * to_rate as f64 / from_rate as f64).round() as usize
}

/// Resample `input` to exactly `target_len` samples
///
/// Output sample `i` reads fractional source position `i · len / target_len`
/// and interpolates between its two neighbours, clamping at the last sample.
/// Equal lengths return an exact copy.
pub fn resample(input: &[f32], target_len: usize) -> Vec<f32> {
    if target_len == input.len() {
        return input.to_vec();
    }
    if input.is_empty() {
        return vec![0.0; target_len];
    }

    let last = input.len() - 1;
    let ratio = input.len() as f64 / target_len as f64;

    (0..target_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64).clamp(0.0, 1.0) as f32;
            input[idx] * (1.0 - frac) + input[next] * frac
        })
        .collect()
}
