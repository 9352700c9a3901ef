//! WAV import and export of track audio
//!
//! Imported audio is fitted to the loop: shorter files are padded with
//! silence, longer ones truncated, and the channel layout is converted to the
//! target track's. Exports are 16-bit PCM for compatibility; saved loops
//! use 32-bit float so overdubs louder than full scale survive a reload.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use crate::buffer::SampleBuffer;
use crate::types::{ChannelConfig, Sample};

/// Bit depth used when exporting track audio
pub const EXPORT_BITS_PER_SAMPLE: u16 = 16;

#[derive(Error, Debug)]
pub enum AudioFileError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported channel count {0}: only mono and stereo files are supported")]
    UnsupportedChannels(u16),

    #[error("Unsupported sample format: {bits}-bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },
}

pub type AudioFileResult<T> = Result<T, AudioFileError>;

/// Read a WAV file into a buffer of exactly `length_frames` frames
///
/// The file's sample rate is not converted; a mismatch with `sample_rate`
/// is logged and the audio will play at the wrong speed.
pub fn read_wav<P: AsRef<Path>>(
    path: P,
    config: ChannelConfig,
    length_frames: usize,
    sample_rate: u32,
) -> AudioFileResult<SampleBuffer> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let source = ChannelConfig::from_channels(spec.channels as usize)
        .ok_or(AudioFileError::UnsupportedChannels(spec.channels))?;
    if spec.sample_rate != sample_rate {
        log::warn!(
            "{:?} is {}Hz but the loop runs at {}Hz; importing without resampling",
            path,
            spec.sample_rate,
            sample_rate
        );
    }

    let interleaved = read_samples(&mut reader, spec)?;
    let samples = convert_channels(&interleaved, source, config);
    let mut buffer = SampleBuffer::from_interleaved(config, samples)
        .map_err(|_| AudioFileError::UnsupportedChannels(spec.channels))?;

    let file_frames = buffer.frames();
    if file_frames != length_frames {
        log::debug!(
            "Fitting {:?} from {} to {} frames",
            path,
            file_frames,
            length_frames
        );
    }
    buffer.fit_to_length(length_frames);

    log::info!(
        "Imported {:?} ({} {}Hz {}-bit) as {} track",
        path,
        source,
        spec.sample_rate,
        spec.bits_per_sample,
        config
    );
    Ok(buffer)
}

/// Write a buffer as 16-bit PCM, creating parent directories as needed
///
/// Samples beyond full scale are clipped.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    buffer: &SampleBuffer,
    sample_rate: u32,
) -> AudioFileResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate,
        bits_per_sample: EXPORT_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in buffer.as_interleaved() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    log::info!(
        "Wrote {} frames of {} audio to {:?}",
        buffer.frames(),
        buffer.config(),
        path
    );
    Ok(())
}

/// Write a buffer as 32-bit float without clipping
pub fn write_wav_float<P: AsRef<Path>>(
    path: P,
    buffer: &SampleBuffer,
    sample_rate: u32,
) -> AudioFileResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in buffer.as_interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    log::debug!(
        "Wrote {} frames of {} float audio to {:?}",
        buffer.frames(),
        buffer.config(),
        path
    );
    Ok(())
}

fn read_samples<R: std::io::Read>(
    reader: &mut WavReader<R>,
    spec: WavSpec,
) -> AudioFileResult<Vec<Sample>> {
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => Ok(reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?),
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale).map_err(AudioFileError::from))
                .collect()
        }
        (format, bits) => Err(AudioFileError::UnsupportedFormat { bits, format }),
    }
}

/// Convert interleaved samples between mono and stereo
///
/// Mono is duplicated to both sides; stereo is downmixed as `(l + r) / 2`.
fn convert_channels(samples: &[Sample], from: ChannelConfig, to: ChannelConfig) -> Vec<Sample> {
    match (from, to) {
        (ChannelConfig::Mono, ChannelConfig::Stereo) => {
            samples.iter().flat_map(|&s| [s, s]).collect()
        }
        (ChannelConfig::Stereo, ChannelConfig::Mono) => samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect(),
        _ => samples.to_vec(),
    }
}
