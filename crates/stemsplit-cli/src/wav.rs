//! WAV input and per-stem output

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use stemsplit_core::{StemData, StereoBuffer};

/// Read a WAV file as stereo float samples
///
/// Mono is duplicated to both channels; extra channels beyond the first two
/// are ignored. Integer formats are scaled to [-1, 1].
pub fn read_stereo(path: &Path) -> Result<StereoBuffer> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV file: {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{:?} declares zero channels", path);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Failed to decode {:?}", path))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Failed to decode {:?}", path))?
        }
    };

    let frames = interleaved.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }

    log::info!(
        "Read {:?}: {} Hz, {} channel(s), {} frames",
        path,
        spec.sample_rate,
        channels,
        frames
    );

    Ok(StereoBuffer::new(left, right, spec.sample_rate))
}

/// Write one 32-bit float stereo WAV per stem as `{base_name}_({Stem}).wav`
pub fn write_stems(stems: &StemData, dir: &Path, base_name: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let spec = WavSpec {
        channels: 2,
        sample_rate: stems.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut paths = Vec::with_capacity(stems.stems.len());
    for (stem, buffer) in &stems.stems {
        let path = dir.join(format!("{}_({}).wav", base_name, stem.display_name()));
        let mut writer = WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create {:?}", path))?;
        for (&l, &r) in buffer.left.iter().zip(&buffer.right) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
        writer
            .finalize()
            .with_context(|| format!("Failed to finalize {:?}", path))?;
        log::info!("Wrote {:?}", path);
        paths.push(path);
    }

    Ok(paths)
}
