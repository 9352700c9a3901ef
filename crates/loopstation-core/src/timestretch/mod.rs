//! Offline pitch shifting and time dilation via signalsmith-stretch
//!
//! Track effects are rendered once, off the audio thread, into a new buffer.
//! The stretch ratio is implied by the input and output lengths:
//! - output shorter than input: faster playback
//! - output longer than input: slower playback
//! - equal lengths: pitch shift only

use signalsmith_stretch::Stretch;

use crate::buffer::SampleBuffer;
use crate::types::ChannelConfig;

/// Whole-buffer renderer for one track's channel layout
pub struct TrackStretcher {
    stretcher: Stretch,
    config: ChannelConfig,
    pitch_semitones: f32,
}

impl TrackStretcher {
    pub fn new(config: ChannelConfig, sample_rate: u32) -> Self {
        Self {
            stretcher: Stretch::preset_default(config.channels() as u32, sample_rate),
            config,
            pitch_semitones: 0.0,
        }
    }

    /// Set the transpose amount in semitones (positive = up)
    pub fn set_pitch_semitones(&mut self, semitones: f32) {
        self.pitch_semitones = semitones;
        self.stretcher.set_transpose_factor_semitones(semitones, None);
    }

    pub fn pitch_semitones(&self) -> f32 {
        self.pitch_semitones
    }

    pub fn input_latency(&self) -> usize {
        self.stretcher.input_latency()
    }

    pub fn output_latency(&self) -> usize {
        self.stretcher.output_latency()
    }

    /// Render `input` into exactly `output_frames` frames
    ///
    /// The stretcher's tail is flushed and its latency trimmed from the front
    /// so the result lines up with the start of the input.
    pub fn render(&mut self, input: &SampleBuffer, output_frames: usize) -> SampleBuffer {
        let channels = self.config.channels();
        if input.frames() == 0 || output_frames == 0 {
            return SampleBuffer::silent(self.config, output_frames);
        }

        let latency = self.input_latency() + self.output_latency();
        let mut out = vec![0.0; (output_frames + latency) * channels];
        let (body, tail) = out.split_at_mut(output_frames * channels);

        self.stretcher.reset();
        self.stretcher.process(input.as_interleaved(), &mut *body);
        self.stretcher.flush(&mut *tail);

        out.drain(..latency * channels);
        SampleBuffer::from_interleaved(self.config, out)
            .unwrap_or_else(|_| SampleBuffer::silent(self.config, output_frames))
    }
}
