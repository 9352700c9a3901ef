//! Loop station settings

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::clock::{MasterClock, TimeSignature};
use crate::error::{TransportError, TransportResult};
use crate::scheduler::EVENT_QUEUE_CAPACITY;
use crate::track::DEFAULT_UNDO_DEPTH;
use crate::types::DEFAULT_SAMPLE_RATE;

/// Top-level configuration, stored as YAML
///
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Engine sample rate in Hz
    pub sample_rate: u32,
    /// Tempo for the scheduling grid
    pub bpm: f64,
    pub time_signature: TimeSignature,
    /// Grid step as a fraction of a beat
    pub subdivision: f64,
    /// Length of new loops
    pub loop_length_seconds: f64,
    /// Upper bound for per-channel track gains
    pub pan_limit: f32,
    /// Undo steps kept per track
    pub undo_depth: usize,
    /// Capacity of the engine's scheduled-event queue
    pub event_capacity: usize,
    pub audio: AudioConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            bpm: 120.0,
            time_signature: TimeSignature::COMMON,
            subdivision: 0.25,
            loop_length_seconds: 4.0,
            pan_limit: 1.0,
            undo_depth: DEFAULT_UNDO_DEPTH,
            event_capacity: EVENT_QUEUE_CAPACITY,
            audio: AudioConfig::default(),
        }
    }
}

impl StationConfig {
    /// Fresh master clock for these settings
    pub fn clock(&self) -> TransportResult<MasterClock> {
        MasterClock::new(self.sample_rate, self.bpm, self.time_signature, self.subdivision)
    }

    /// Length of new loops in frames
    pub fn loop_length_frames(&self) -> TransportResult<usize> {
        let frames = self.loop_length_seconds * self.sample_rate as f64;
        if !frames.is_finite() || frames < 1.0 {
            return Err(TransportError::InvalidParameter {
                name: "loop length",
                value: self.loop_length_seconds,
            });
        }
        Ok(frames.round() as usize)
    }

    /// Check every setting the transport depends on
    pub fn validate(&self) -> TransportResult<()> {
        self.clock()?;
        self.loop_length_frames()?;
        if !self.pan_limit.is_finite() || self.pan_limit <= 0.0 {
            return Err(TransportError::InvalidParameter {
                name: "pan limit",
                value: self.pan_limit as f64,
            });
        }
        if self.event_capacity == 0 {
            return Err(TransportError::InvalidParameter {
                name: "event capacity",
                value: 0.0,
            });
        }
        Ok(())
    }
}
