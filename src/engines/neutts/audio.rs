use std::path::Path;

use rubato::{FftFixedInOut, ResampleError, Resampler, ResamplerConstructionError};

/// Lowest and highest reference sample rates accepted.
pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Nominal input chunk for the FFT resampler; rubato rounds it to fit the ratio.
const RESAMPLE_CHUNK: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("Failed to read WAV file: {0}")]
    Wav(#[from] hound::Error),
    #[error("Reference audio contains no samples")]
    Empty,
    #[error("Unsupported reference audio format: {0}")]
    UnsupportedFormat(String),
    #[error("Resampler setup failed: {0}")]
    ResamplerSetup(#[from] ResamplerConstructionError),
    #[error("Resampling failed: {0}")]
    Resample(#[from] ResampleError),
}

/// Load a WAV file as mono f32 samples at `target_rate`.
///
/// Integer formats are scaled to `[-1.0, 1.0]`, channels are averaged and
/// the result is band-limited resampled.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>, AudioError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&spec.sample_rate) {
        return Err(AudioError::UnsupportedFormat(format!(
            "sample rate {} Hz outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz",
            spec.sample_rate
        )));
    }
    if spec.channels == 0 {
        return Err(AudioError::UnsupportedFormat("zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = downmix(&interleaved, spec.channels);
    if mono.is_empty() {
        return Err(AudioError::Empty);
    }

    log::debug!(
        "Loaded {} ({} Hz, {} ch, {:.2}s)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        mono.len() as f64 / spec.sample_rate as f64
    );

    resample(&mono, spec.sample_rate, target_rate)
}

fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio from `src_rate` to `dst_rate` with rubato's FFT
/// resampler.
///
/// The resampler's delay is trimmed so the output lines up with the input,
/// and the length is `input.len() * dst_rate / src_rate`, rounded.
pub fn resample(input: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>, AudioError> {
    if src_rate == dst_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(src_rate as usize, dst_rate as usize, RESAMPLE_CHUNK, 1)?;
    let chunk_size = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected_len =
        (input.len() as f64 * dst_rate as f64 / src_rate as f64).round() as usize;

    let mut output = Vec::with_capacity(expected_len + delay + resampler.output_frames_max());
    let mut chunk = vec![0.0f32; chunk_size];
    let mut pos = 0;
    // Keep feeding (zero padding past the end) until the delayed tail is out.
    while output.len() < expected_len + delay {
        chunk.fill(0.0);
        if pos < input.len() {
            let end = (pos + chunk_size).min(input.len());
            chunk[..end - pos].copy_from_slice(&input[pos..end]);
        }
        pos += chunk_size;

        let frames = resampler.process(&[&chunk[..]], None)?;
        output.extend_from_slice(&frames[0]);
    }

    output.drain(..delay);
    output.truncate(expected_len);
    Ok(output)
}
