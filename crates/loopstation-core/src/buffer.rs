//! Track audio storage
//!
//! A [`SampleBuffer`] holds exactly one loop's worth of interleaved audio for
//! one track. Its length never changes while it is installed in the engine:
//! recording accumulates in place, and edits produce a new buffer that is
//! swapped in whole.

use crate::error::{TransportError, TransportResult};
use crate::types::{ChannelConfig, Sample, StereoSample};

/// Fixed-length interleaved audio for one track
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    config: ChannelConfig,
}

impl SampleBuffer {
    /// Silent buffer of `frames` frames
    pub fn silent(config: ChannelConfig, frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames * config.channels()],
            config,
        }
    }

    /// Wrap interleaved samples; the length must be a whole number of frames
    pub fn from_interleaved(config: ChannelConfig, samples: Vec<Sample>) -> TransportResult<Self> {
        if samples.len() % config.channels() != 0 {
            return Err(TransportError::InvalidParameter {
                name: "interleaved sample count",
                value: samples.len() as f64,
            });
        }
        Ok(Self { samples, config })
    }

    /// Length in frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.config.channels()
    }

    #[inline]
    pub fn config(&self) -> ChannelConfig {
        self.config
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.config.channels()
    }

    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Same channel layout and frame count
    #[inline]
    pub fn same_shape(&self, other: &SampleBuffer) -> bool {
        self.config == other.config && self.samples.len() == other.samples.len()
    }

    /// Read one frame as stereo (mono is duplicated to both sides)
    #[inline]
    pub fn frame(&self, index: usize) -> StereoSample {
        match self.config {
            ChannelConfig::Mono => StereoSample::mono(self.samples[index]),
            ChannelConfig::Stereo => {
                StereoSample::new(self.samples[index * 2], self.samples[index * 2 + 1])
            }
        }
    }

    /// Add `out.len()` frames starting at `start`, scaled by per-side gains,
    /// onto `out` (real-time safe)
    pub fn mix_into(&self, start: usize, out: &mut [StereoSample], left_gain: f32, right_gain: f32) {
        let end = start + out.len();
        debug_assert!(end <= self.frames());
        match self.config {
            ChannelConfig::Mono => {
                for (dst, &s) in out.iter_mut().zip(&self.samples[start..end]) {
                    dst.left += s * left_gain;
                    dst.right += s * right_gain;
                }
            }
            ChannelConfig::Stereo => {
                let src = &self.samples[start * 2..end * 2];
                for (dst, frame) in out.iter_mut().zip(src.chunks_exact(2)) {
                    dst.left += frame[0] * left_gain;
                    dst.right += frame[1] * right_gain;
                }
            }
        }
    }

    /// Overdub `input` onto the frames starting at `start` (real-time safe)
    ///
    /// Storage is not clipped; mono tracks receive the stereo downmix.
    pub fn accumulate(&mut self, start: usize, input: &[StereoSample]) {
        let end = start + input.len();
        debug_assert!(end <= self.frames());
        match self.config {
            ChannelConfig::Mono => {
                for (dst, s) in self.samples[start..end].iter_mut().zip(input) {
                    *dst += s.downmix();
                }
            }
            ChannelConfig::Stereo => {
                let dst = &mut self.samples[start * 2..end * 2];
                for (frame, s) in dst.chunks_exact_mut(2).zip(input) {
                    frame[0] += s.left;
                    frame[1] += s.right;
                }
            }
        }
    }

    /// Copy another buffer of the same shape into this one without allocating
    ///
    /// Returns false (and leaves `self` untouched) when the shapes differ.
    pub fn copy_from(&mut self, other: &SampleBuffer) -> bool {
        if !self.same_shape(other) {
            return false;
        }
        self.samples.copy_from_slice(&other.samples);
        true
    }

    /// Reverse frame order in place (channel order within a frame is kept)
    pub fn reverse_frames(&mut self) {
        match self.config {
            ChannelConfig::Mono => self.samples.reverse(),
            ChannelConfig::Stereo => {
                let frames: &mut [[Sample; 2]] = bytemuck::cast_slice_mut(&mut self.samples);
                frames.reverse();
            }
        }
    }

    /// Pad with silence or truncate to exactly `frames` frames
    pub fn fit_to_length(&mut self, frames: usize) {
        self.samples.resize(frames * self.config.channels(), 0.0);
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> Sample {
        self.samples.iter().fold(0.0, |acc: Sample, s| acc.max(s.abs()))
    }
}
