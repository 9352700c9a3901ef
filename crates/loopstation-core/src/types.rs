//! Common types for the loop station
//!
//! Sample and frame types shared by the engine and the audio backend, plus the
//! identifiers used to address loops, tracks and track positions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Default sample rate (48kHz - standard professional audio rate)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Number of track positions in a loop
pub const NUM_POSITIONS: usize = 6;

/// Audio sample type (32-bit float for processing, stored as 16-bit in files)
pub type Sample = f32;

/// A single stereo frame (left and right channels)
///
/// Uses `#[repr(C)]` so `&[StereoSample]` can be viewed as interleaved
/// `&[f32]` through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Average of both channels, used when recording into a mono track
    #[inline]
    pub fn downmix(&self) -> Sample {
        (self.left + self.right) * 0.5
    }

    /// Hard clip both channels to [-1.0, 1.0]
    #[inline]
    pub fn clip(&self) -> Self {
        Self {
            left: self.left.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

/// A pre-allocated block of stereo frames
///
/// Used by the audio backend for the per-callback input and output blocks.
/// Allocate once with [`StereoBuffer::silence`] at the maximum block size and
/// resize with [`StereoBuffer::set_len_from_capacity`] inside the callback.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never allocates as long as `new_len <= capacity`; newly exposed frames
    /// are silent.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.samples.capacity(),
            "set_len_from_capacity called with len > capacity"
        );
        let new_len = new_len.min(self.samples.capacity());
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy interleaved view [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Zero-copy mutable interleaved view [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }
}

/// Channel layout of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelConfig {
    Mono,
    #[default]
    Stereo,
}

impl ChannelConfig {
    /// Number of interleaved samples per frame
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            ChannelConfig::Mono => 1,
            ChannelConfig::Stereo => 2,
        }
    }

    pub fn from_channels(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(ChannelConfig::Mono),
            2 => Some(ChannelConfig::Stereo),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelConfig::Mono => write!(f, "mono"),
            ChannelConfig::Stereo => write!(f, "stereo"),
        }
    }
}

/// Track position within a loop (1-6)
///
/// The only way to build one is through validation, so every `Position`
/// held by the engine or controller is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Position(u8);

impl Position {
    /// All positions in order
    pub const ALL: [Position; NUM_POSITIONS] = [
        Position(1),
        Position(2),
        Position(3),
        Position(4),
        Position(5),
        Position(6),
    ];

    /// Validate a user-facing position number (1-6)
    pub fn new(number: u8) -> Result<Self, TransportError> {
        if (1..=NUM_POSITIONS as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(TransportError::InvalidPosition(number))
        }
    }

    /// Position for a slot index (0-5)
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Slot index (0-5)
    #[inline]
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Position number (1-6)
    #[inline]
    pub fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Position {
    type Error = TransportError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Position::new(number)
    }
}

impl From<Position> for u8 {
    fn from(position: Position) -> Self {
        position.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────
// Timestamp-derived identifiers
// ─────────────────────────────────────────────────────────────

static LAST_LOOP_ID: AtomicU64 = AtomicU64::new(0);
static LAST_TRACK_ID: AtomicU64 = AtomicU64::new(0);

/// Pack a local time as the decimal digits YYYYmmddHHMMSS
fn timestamp_digits(time: &DateTime<Local>) -> u64 {
    (time.year().max(0) as u64) * 10_000_000_000
        + time.month() as u64 * 100_000_000
        + time.day() as u64 * 1_000_000
        + time.hour() as u64 * 10_000
        + time.minute() as u64 * 100
        + time.second() as u64
}

/// Next id from the current time, strictly greater than any id issued before
/// from the same counter
fn next_timestamp_id(last: &AtomicU64) -> u64 {
    let stamp = timestamp_digits(&Local::now());
    let mut prev = last.load(Ordering::Relaxed);
    loop {
        let next = stamp.max(prev + 1);
        match last.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Loop identifier, derived from the creation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoopId(pub u64);

impl LoopId {
    pub fn generate() -> Self {
        Self(next_timestamp_id(&LAST_LOOP_ID))
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loop_{:014}", self.0)
    }
}

/// Track identifier, derived from the creation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn generate() -> Self {
        Self(next_timestamp_id(&LAST_TRACK_ID))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Track_{:014}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_position_validation() {
        assert!(Position::new(0).is_err());
        assert!(Position::new(7).is_err());
        assert_eq!(Position::new(1).unwrap().index(), 0);
        assert_eq!(Position::new(6).unwrap().index(), 5);
        assert!(matches!(
            Position::new(9),
            Err(TransportError::InvalidPosition(9))
        ));
    }

    #[test]
    fn test_position_from_index() {
        for (i, pos) in Position::ALL.iter().enumerate() {
            assert_eq!(Position::from_index(i), Some(*pos));
            assert_eq!(pos.number() as usize, i + 1);
        }
        assert_eq!(Position::from_index(NUM_POSITIONS), None);
    }

    #[test]
    fn test_timestamp_digits() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(timestamp_digits(&time), 20240309140507);
        assert_eq!(format!("{}", LoopId(20240309140507)), "Loop_20240309140507");
    }

    #[test]
    fn test_ids_strictly_increase() {
        let a = LoopId::generate();
        let b = LoopId::generate();
        let c = LoopId::generate();
        assert!(a < b && b < c);

        let t1 = TrackId::generate();
        let t2 = TrackId::generate();
        assert!(t1 < t2);
    }

    #[test]
    fn test_stereo_buffer_set_len_from_capacity() {
        let mut buffer = StereoBuffer::silence(64);
        buffer.set_len_from_capacity(16);
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.capacity(), 64);
        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.len(), 64);
        assert_eq!(buffer.as_interleaved().len(), 128);
    }

    #[test]
    fn test_sample_clip_and_downmix() {
        let s = StereoSample::new(1.5, -0.5);
        assert_eq!(s.clip(), StereoSample::new(1.0, -0.5));
        assert_eq!(s.downmix(), 0.5);
    }
}
