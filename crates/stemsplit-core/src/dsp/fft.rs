//! Fixed-size radix-2 FFT
//!
//! A 4096-point complex transform operating in place on split real/imaginary
//! buffers. The bit-reversal permutation and the per-stage twiddle factors are
//! computed once per process and shared read-only by every caller.
//!
//! ## Layout
//!
//! ```text
//! stage s (0..12): butterfly span 2^(s+1), twiddles[s][k] = e^(-2πi·k / 2^(s+1)), k < 2^s
//! ```
//!
//! The inverse uses the conjugate trick (conjugate, forward, scale by 1/N,
//! conjugate), so only one butterfly loop exists.

use std::sync::LazyLock;

/// Transform size in points
pub const FFT_SIZE: usize = 4096;

/// log2(FFT_SIZE), the number of butterfly stages
const FFT_STAGES: usize = 12;

/// Precomputed permutation and twiddle tables
struct FftTables {
    bit_reverse: Vec<usize>,
    /// One (cos, sin) table per stage; stage `s` holds `2^s` entries
    twiddles: Vec<Vec<(f32, f32)>>,
}

impl FftTables {
    fn build() -> Self {
        let bit_reverse = (0..FFT_SIZE)
            .map(|i| i.reverse_bits() >> (usize::BITS as usize - FFT_STAGES))
            .collect();

        let twiddles = (0..FFT_STAGES)
            .map(|stage| {
                let half = 1usize << stage;
                let span = (half << 1) as f64;
                (0..half)
                    .map(|k| {
                        let angle = -2.0 * std::f64::consts::PI * k as f64 / span;
                        (angle.cos() as f32, angle.sin() as f32)
                    })
                    .collect()
            })
            .collect();

        log::debug!("FFT tables built: {} points, {} stages", FFT_SIZE, FFT_STAGES);

        Self {
            bit_reverse,
            twiddles,
        }
    }
}

static TABLES: LazyLock<FftTables> = LazyLock::new(FftTables::build);

/// Build the shared tables eagerly
///
/// Optional: the first transform builds them on demand. Calling this at
/// startup keeps the cost out of the first separation request.
pub fn init() {
    LazyLock::force(&TABLES);
}

/// Forward transform, in place
///
/// Both buffers must be exactly `FFT_SIZE` long; the analyzer and
/// synthesizer own their scratch at that size.
pub(crate) fn forward(real: &mut [f32], imag: &mut [f32]) {
    debug_assert_eq!(real.len(), FFT_SIZE);
    debug_assert_eq!(imag.len(), FFT_SIZE);

    let tables = &*TABLES;

    for (i, &j) in tables.bit_reverse.iter().enumerate() {
        if i < j {
            real.swap(i, j);
            imag.swap(i, j);
        }
    }

    for (stage, twiddles) in tables.twiddles.iter().enumerate() {
        let half = 1usize << stage;
        let span = half << 1;

        for start in (0..FFT_SIZE).step_by(span) {
            for (k, &(wr, wi)) in twiddles.iter().enumerate() {
                let a = start + k;
                let b = a + half;

                let tr = wr * real[b] - wi * imag[b];
                let ti = wr * imag[b] + wi * real[b];

                real[b] = real[a] - tr;
                imag[b] = imag[a] - ti;
                real[a] += tr;
                imag[a] += ti;
            }
        }
    }
}

/// Inverse transform, in place, scaled by 1/N
///
/// Same length contract as [`forward`].
pub(crate) fn inverse(real: &mut [f32], imag: &mut [f32]) {
    for v in imag.iter_mut() {
        *v = -*v;
    }

    forward(real, imag);

    let scale = 1.0 / FFT_SIZE as f32;
    for v in real.iter_mut() {
        *v *= scale;
    }
    for v in imag.iter_mut() {
        *v = -*v * scale;
    }
}
