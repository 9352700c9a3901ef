//! Destructive track effects
//!
//! Effects are rendered against a track's current audio and produce a
//! [`TrackEdit`]; nothing here touches the track itself. Pitch and dilation
//! are absolute targets, so rendering applies only the difference from the
//! track's current state.

use crate::error::{TransportError, TransportResult};
use crate::timestretch::TrackStretcher;
use crate::track::{Track, TrackEdit};

/// Largest pitch modulation in either direction, in half-steps
pub const PITCH_RANGE_SEMITONES: i32 = 24;

/// Slowest allowed time dilation (quarter speed)
pub const MIN_TIME_DILATION: f32 = 0.25;

/// Fastest allowed time dilation (four times speed)
pub const MAX_TIME_DILATION: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackEffect {
    /// Flip the track's playback direction
    Reverse,
    /// Target pitch in half-steps relative to the original recording
    PitchModulation(i32),
    /// Target playback speed relative to the original recording (>1 is faster)
    TimeDilation(f32),
}

impl TrackEffect {
    pub fn validate(self) -> TransportResult<()> {
        match self {
            TrackEffect::Reverse => Ok(()),
            TrackEffect::PitchModulation(steps) => {
                if steps.abs() > PITCH_RANGE_SEMITONES {
                    Err(TransportError::InvalidParameter {
                        name: "pitch modulation",
                        value: steps as f64,
                    })
                } else {
                    Ok(())
                }
            }
            TrackEffect::TimeDilation(factor) => {
                if !factor.is_finite() || !(MIN_TIME_DILATION..=MAX_TIME_DILATION).contains(&factor) {
                    Err(TransportError::InvalidParameter {
                        name: "time dilation",
                        value: factor as f64,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Render this effect against `track`
    ///
    /// Returns `Ok(None)` when the track is already in the requested state.
    pub fn render(self, track: &Track, sample_rate: u32) -> TransportResult<Option<TrackEdit>> {
        self.validate()?;
        let frames = track.frames();
        let config = track.channel_config();

        let edit = match self {
            TrackEffect::Reverse => {
                let mut buffer = track.buffer().clone();
                buffer.reverse_frames();
                TrackEdit {
                    buffer,
                    reversed: !track.is_reversed(),
                    pitch_modulation: track.pitch_modulation(),
                    time_dilation: track.time_dilation(),
                }
            }
            TrackEffect::PitchModulation(target) => {
                let delta = target - track.pitch_modulation();
                if delta == 0 {
                    return Ok(None);
                }
                let mut stretcher = TrackStretcher::new(config, sample_rate);
                stretcher.set_pitch_semitones(delta as f32);
                TrackEdit {
                    buffer: stretcher.render(track.buffer(), frames),
                    reversed: track.is_reversed(),
                    pitch_modulation: target,
                    time_dilation: track.time_dilation(),
                }
            }
            TrackEffect::TimeDilation(target) => {
                let ratio = target / track.time_dilation();
                if (ratio - 1.0).abs() < 1e-6 {
                    return Ok(None);
                }
                let content_frames = ((frames as f32 / ratio).round() as usize).max(1);
                let mut stretcher = TrackStretcher::new(config, sample_rate);
                let mut buffer = stretcher.render(track.buffer(), content_frames);
                buffer.fit_to_length(frames);
                log::debug!(
                    "time dilation {:.3} -> {:.3}: {} frames of content in a {} frame loop",
                    track.time_dilation(),
                    target,
                    content_frames,
                    frames
                );
                TrackEdit {
                    buffer,
                    reversed: track.is_reversed(),
                    pitch_modulation: track.pitch_modulation(),
                    time_dilation: target,
                }
            }
        };
        Ok(Some(edit))
    }
}
