//! Track model - one recorded layer of a loop
//!
//! A track owns its audio buffer, its mix settings and its effect state.
//! Destructive edits never modify the buffer in place: they arrive as a
//! finished [`TrackEdit`], and the replaced state is pushed onto a bounded
//! undo history.

use std::collections::VecDeque;

use crate::buffer::SampleBuffer;
use crate::error::{TransportError, TransportResult};
use crate::types::{ChannelConfig, TrackId};

/// Display name given to tracks created without one
pub const DEFAULT_TRACK_NAME: &str = "New Track";

/// Undo steps kept per track unless configured otherwise
pub const DEFAULT_UNDO_DEPTH: usize = 8;

/// Per-track mix settings read by the engine every block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMix {
    /// Linear volume (0.0-1.0)
    pub volume: f32,
    /// Left channel gain (0.0-pan limit)
    pub left_gain: f32,
    /// Right channel gain (0.0-pan limit)
    pub right_gain: f32,
    pub muted: bool,
}

impl TrackMix {
    /// Effective left gain including volume
    #[inline]
    pub fn left(&self) -> f32 {
        self.volume * self.left_gain
    }

    /// Effective right gain including volume
    #[inline]
    pub fn right(&self) -> f32 {
        self.volume * self.right_gain
    }
}

impl Default for TrackMix {
    fn default() -> Self {
        Self {
            volume: 1.0,
            left_gain: 1.0,
            right_gain: 1.0,
            muted: false,
        }
    }
}

/// A rendered destructive edit, ready to replace a track's audio
#[derive(Debug, Clone)]
pub struct TrackEdit {
    pub buffer: SampleBuffer,
    pub reversed: bool,
    pub pitch_modulation: i32,
    pub time_dilation: f32,
}

/// State restored by one undo step
#[derive(Debug, Clone)]
struct TrackSnapshot {
    buffer: SampleBuffer,
    reversed: bool,
    pitch_modulation: i32,
    time_dilation: f32,
}

#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    name: String,
    buffer: SampleBuffer,
    mix: TrackMix,
    reversed: bool,
    /// Net pitch shift applied to the audio, in half-steps
    pitch_modulation: i32,
    /// Net time dilation applied to the audio (1.0 = original speed)
    time_dilation: f32,
    history: VecDeque<TrackSnapshot>,
    undo_depth: usize,
}

impl Track {
    /// Silent track of `frames` frames
    pub fn new(name: impl Into<String>, config: ChannelConfig, frames: usize) -> Self {
        Self::from_buffer(name, SampleBuffer::silent(config, frames))
    }

    /// Track wrapping existing audio
    pub fn from_buffer(name: impl Into<String>, buffer: SampleBuffer) -> Self {
        Self {
            id: TrackId::generate(),
            name: name.into(),
            buffer,
            mix: TrackMix::default(),
            reversed: false,
            pitch_modulation: 0,
            time_dilation: 1.0,
            history: VecDeque::new(),
            undo_depth: DEFAULT_UNDO_DEPTH,
        }
    }

    /// Keep an id from a saved manifest
    pub fn with_id(mut self, id: TrackId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn frames(&self) -> usize {
        self.buffer.frames()
    }

    pub fn channel_config(&self) -> ChannelConfig {
        self.buffer.config()
    }

    pub fn mix(&self) -> TrackMix {
        self.mix
    }

    pub fn volume(&self) -> f32 {
        self.mix.volume
    }

    pub fn left_gain(&self) -> f32 {
        self.mix.left_gain
    }

    pub fn right_gain(&self) -> f32 {
        self.mix.right_gain
    }

    pub fn is_muted(&self) -> bool {
        self.mix.muted
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn pitch_modulation(&self) -> i32 {
        self.pitch_modulation
    }

    pub fn time_dilation(&self) -> f32 {
        self.time_dilation
    }

    // ─────────────────────────────────────────────────────────────
    // Mix settings
    // ─────────────────────────────────────────────────────────────

    /// Set linear volume; must be finite and within 0.0-1.0
    pub fn set_volume(&mut self, volume: f32) -> TransportResult<()> {
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return Err(TransportError::InvalidParameter {
                name: "volume",
                value: volume as f64,
            });
        }
        self.mix.volume = volume;
        Ok(())
    }

    /// Set per-channel gains, clamped to `[0, limit]`
    pub fn set_pan(&mut self, left: f32, right: f32, limit: f32) -> TransportResult<()> {
        for (name, gain) in [("left gain", left), ("right gain", right)] {
            if !gain.is_finite() {
                return Err(TransportError::InvalidParameter {
                    name,
                    value: gain as f64,
                });
            }
        }
        self.mix.left_gain = left.clamp(0.0, limit);
        self.mix.right_gain = right.clamp(0.0, limit);
        Ok(())
    }

    /// Set gains from a single balance control
    ///
    /// -1.0 is hard left, 0.0 centre (both gains at `limit`), 1.0 hard right.
    pub fn set_balance(&mut self, balance: f32, limit: f32) -> TransportResult<()> {
        if !balance.is_finite() || !(-1.0..=1.0).contains(&balance) {
            return Err(TransportError::InvalidParameter {
                name: "balance",
                value: balance as f64,
            });
        }
        let left = limit * (1.0 - balance).min(1.0);
        let right = limit * (1.0 + balance).min(1.0);
        self.set_pan(left, right, limit)
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.mix.muted = muted;
    }

    /// Put back mix settings read earlier with [`Track::mix`]
    pub(crate) fn restore_mix(&mut self, mix: TrackMix) {
        self.mix = mix;
    }

    // ─────────────────────────────────────────────────────────────
    // Destructive edits and undo
    // ─────────────────────────────────────────────────────────────

    /// Number of undo steps kept; 0 disables history
    pub fn set_undo_depth(&mut self, depth: usize) {
        self.undo_depth = depth;
        while self.history.len() > depth {
            self.history.pop_front();
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_depth
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Buffer that the next `undo` would restore
    pub fn undo_buffer(&self) -> Option<&SampleBuffer> {
        self.history.back().map(|s| &s.buffer)
    }

    /// Replace audio and effect state with a rendered edit
    pub fn apply_edit(&mut self, edit: TrackEdit) {
        let previous = std::mem::replace(&mut self.buffer, edit.buffer);
        self.push_history(TrackSnapshot {
            buffer: previous,
            reversed: self.reversed,
            pitch_modulation: self.pitch_modulation,
            time_dilation: self.time_dilation,
        });
        self.reversed = edit.reversed;
        self.pitch_modulation = edit.pitch_modulation;
        self.time_dilation = edit.time_dilation;
    }

    /// Adopt a finished recording pass (undoable like any other edit)
    pub fn record_take(&mut self, buffer: SampleBuffer) {
        let edit = TrackEdit {
            buffer,
            reversed: self.reversed,
            pitch_modulation: self.pitch_modulation,
            time_dilation: self.time_dilation,
        };
        self.apply_edit(edit);
    }

    /// Restore the most recent snapshot; false when history is empty
    pub fn undo(&mut self) -> bool {
        match self.history.pop_back() {
            Some(snapshot) => {
                self.buffer = snapshot.buffer;
                self.reversed = snapshot.reversed;
                self.pitch_modulation = snapshot.pitch_modulation;
                self.time_dilation = snapshot.time_dilation;
                true
            }
            None => false,
        }
    }

    /// Set effect state without touching audio (used when restoring a saved loop)
    pub fn restore_effect_state(&mut self, reversed: bool, pitch_modulation: i32, time_dilation: f32) {
        self.reversed = reversed;
        self.pitch_modulation = pitch_modulation;
        self.time_dilation = time_dilation;
    }

    fn push_history(&mut self, snapshot: TrackSnapshot) {
        if self.undo_depth == 0 {
            return;
        }
        if self.history.len() == self.undo_depth {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit_with(value: f32, frames: usize) -> TrackEdit {
        let buffer =
            SampleBuffer::from_interleaved(ChannelConfig::Mono, vec![value; frames]).unwrap();
        TrackEdit {
            buffer,
            reversed: true,
            pitch_modulation: 2,
            time_dilation: 1.0,
        }
    }

    #[test]
    fn test_new_track_defaults() {
        let track = Track::new(DEFAULT_TRACK_NAME, ChannelConfig::Stereo, 480);
        assert_eq!(track.name(), "New Track");
        assert_eq!(track.frames(), 480);
        assert_eq!(track.mix(), TrackMix::default());
        assert!(!track.is_reversed());
        assert_eq!(track.pitch_modulation(), 0);
        assert_eq!(track.time_dilation(), 1.0);
        assert!(!track.can_undo());
    }

    #[test]
    fn test_volume_validation() {
        let mut track = Track::new("t", ChannelConfig::Mono, 4);
        assert!(track.set_volume(0.5).is_ok());
        assert_eq!(track.volume(), 0.5);
        assert!(track.set_volume(1.5).is_err());
        assert!(track.set_volume(f32::NAN).is_err());
        assert_eq!(track.volume(), 0.5);
    }

    #[test]
    fn test_pan_clamped_to_limit() {
        let mut track = Track::new("t", ChannelConfig::Stereo, 4);
        track.set_pan(1.5, -0.2, 1.0).unwrap();
        assert_eq!(track.left_gain(), 1.0);
        assert_eq!(track.right_gain(), 0.0);
        assert!(track.set_pan(f32::INFINITY, 0.5, 1.0).is_err());
    }

    #[test]
    fn test_balance() {
        let mut track = Track::new("t", ChannelConfig::Stereo, 4);
        track.set_balance(-0.5, 1.0).unwrap();
        assert_eq!(track.left_gain(), 1.0);
        assert_eq!(track.right_gain(), 0.5);
        track.set_balance(0.0, 0.8).unwrap();
        assert_eq!(track.left_gain(), 0.8);
        assert_eq!(track.right_gain(), 0.8);
        assert!(track.set_balance(2.0, 1.0).is_err());
    }

    #[test]
    fn test_mix_effective_gains() {
        let mix = TrackMix {
            volume: 0.5,
            left_gain: 1.0,
            right_gain: 0.5,
            muted: false,
        };
        assert_eq!(mix.left(), 0.5);
        assert_eq!(mix.right(), 0.25);
    }

    #[test]
    fn test_apply_edit_and_undo() {
        let mut track = Track::new("t", ChannelConfig::Mono, 4);
        track.apply_edit(edit_with(0.5, 4));
        assert!(track.is_reversed());
        assert_eq!(track.pitch_modulation(), 2);
        assert_eq!(track.buffer().peak(), 0.5);

        assert_eq!(track.undo_buffer().map(|b| b.peak()), Some(0.0));
        assert!(track.undo());
        assert!(!track.is_reversed());
        assert_eq!(track.pitch_modulation(), 0);
        assert_eq!(track.buffer().peak(), 0.0);
        assert!(!track.undo());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut track = Track::new("t", ChannelConfig::Mono, 2);
        track.set_undo_depth(2);
        for i in 1..=4 {
            track.record_take(
                SampleBuffer::from_interleaved(ChannelConfig::Mono, vec![i as f32 * 0.1; 2])
                    .unwrap(),
            );
        }
        assert!(track.undo());
        assert!(track.undo());
        assert!(!track.undo());
        // Oldest surviving snapshot is the second take
        assert!((track.buffer().peak() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_zero_depth_disables_history() {
        let mut track = Track::new("t", ChannelConfig::Mono, 2);
        track.set_undo_depth(0);
        track.apply_edit(edit_with(0.3, 2));
        assert!(!track.can_undo());
    }
}
