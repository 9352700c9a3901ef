//! Master clock - monotonic sample counter with a tempo grid
//!
//! The clock is owned by the audio thread and advanced once per callback by
//! the block size. Grid math follows the usual loop-station conventions:
//!
//! - `samples_per_beat = sample_rate * 60 / bpm`
//! - `beats_per_bar = numerator * (4 / denominator)`
//! - `samples_per_bar = round(samples_per_beat * beats_per_bar)`
//! - `samples_per_tick = max(1, round(samples_per_beat * subdivision))`

use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// Musical time signature (e.g. 4/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Quarter-note beats per bar
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * (4.0 / self.denominator as f64)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

/// Sample-accurate transport clock
#[derive(Debug, Clone, PartialEq)]
pub struct MasterClock {
    sample_rate: u32,
    bpm: f64,
    time_signature: TimeSignature,
    subdivision: f64,
    samples_per_beat: f64,
    samples_per_bar: u64,
    samples_per_tick: u64,
    current_sample_index: u64,
}

impl MasterClock {
    /// Build a clock at sample index 0
    ///
    /// `subdivision` is the grid step as a fraction of a beat (0.25 = a
    /// sixteenth in 4/4).
    pub fn new(
        sample_rate: u32,
        bpm: f64,
        time_signature: TimeSignature,
        subdivision: f64,
    ) -> TransportResult<Self> {
        if sample_rate == 0 {
            return Err(TransportError::InvalidParameter {
                name: "sample rate",
                value: 0.0,
            });
        }
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TransportError::InvalidParameter { name: "bpm", value: bpm });
        }
        if time_signature.numerator == 0 || time_signature.denominator == 0 {
            return Err(TransportError::InvalidParameter {
                name: "time signature",
                value: time_signature.numerator.min(time_signature.denominator) as f64,
            });
        }
        if !subdivision.is_finite() || subdivision <= 0.0 {
            return Err(TransportError::InvalidParameter {
                name: "subdivision",
                value: subdivision,
            });
        }

        let samples_per_beat = sample_rate as f64 * 60.0 / bpm;
        let samples_per_bar = (samples_per_beat * time_signature.beats_per_bar()).round() as u64;
        let samples_per_tick = ((samples_per_beat * subdivision).round() as u64).max(1);

        Ok(Self {
            sample_rate,
            bpm,
            time_signature,
            subdivision,
            samples_per_beat,
            samples_per_bar,
            samples_per_tick,
            current_sample_index: 0,
        })
    }

    /// Move forward by one callback's worth of frames
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.current_sample_index += frames as u64;
    }

    #[inline]
    pub fn current_sample_index(&self) -> u64 {
        self.current_sample_index
    }

    /// Snap to the nearest grid point (ties round up)
    ///
    /// Near the top of the index range this floors to the last grid point.
    #[inline]
    pub fn quantize(&self, sample_index: u64) -> u64 {
        let tick = self.samples_per_tick;
        sample_index.saturating_add(tick / 2) / tick * tick
    }

    /// First grid point at or after `sample_index`, saturating at `u64::MAX`
    #[inline]
    pub fn next_tick(&self, sample_index: u64) -> u64 {
        sample_index
            .div_ceil(self.samples_per_tick)
            .saturating_mul(self.samples_per_tick)
    }

    /// Index within a loop of `loop_length` frames
    #[inline]
    pub fn loop_position(&self, loop_length: usize) -> usize {
        if loop_length == 0 {
            0
        } else {
            (self.current_sample_index % loop_length as u64) as usize
        }
    }

    /// Loop length in frames for a whole number of bars
    pub fn bars_to_frames(&self, bars: u32) -> usize {
        (self.samples_per_bar * bars as u64) as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn subdivision(&self) -> f64 {
        self.subdivision
    }

    pub fn samples_per_beat(&self) -> f64 {
        self.samples_per_beat
    }

    pub fn beats_per_bar(&self) -> f64 {
        self.time_signature.beats_per_bar()
    }

    pub fn samples_per_bar(&self) -> u64 {
        self.samples_per_bar
    }

    pub fn samples_per_tick(&self) -> u64 {
        self.samples_per_tick
    }
}
