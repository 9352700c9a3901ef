//! Lock-free transport state for non-audio threads
//!
//! The engine publishes its state here at the end of every callback. Readers
//! (controller, UI, the session binary) never block the audio thread. All
//! accesses use `Ordering::Relaxed`: readers need visibility, not ordering
//! with other memory.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use super::TransportState;
use crate::types::Position;

/// Encoded "no position" for the armed/solo fields
const NO_POSITION: u8 = 0;

pub struct EngineAtomics {
    /// 0=Stopped, 1=Playing, 2=Paused
    pub state: AtomicU8,
    /// Playhead within the loop, in frames
    pub playhead: AtomicU64,
    /// Armed position number (0 = none)
    pub armed: AtomicU8,
    /// Soloed position number (0 = none)
    pub solo: AtomicU8,
    /// Master clock sample index
    pub sample_index: AtomicU64,
    /// Loop length in frames
    pub loop_length: AtomicU64,
    /// Blocks rendered as silence because of an xrun or malformed block
    pub xruns: AtomicU64,
    /// Scheduled events refused or ignored by the engine
    pub rejected_events: AtomicU64,
    /// Feedback messages dropped because the feedback queue was full
    pub dropped_feedback: AtomicU64,
    /// Recordings that could not be handed back (no spare buffer)
    pub lost_captures: AtomicU64,
    /// Status flags of the last callback
    pub last_status: AtomicU32,
    /// Output latency reported by the last callback, in microseconds
    pub output_latency_us: AtomicU32,
}

impl EngineAtomics {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TransportState::Stopped as u8),
            playhead: AtomicU64::new(0),
            armed: AtomicU8::new(NO_POSITION),
            solo: AtomicU8::new(NO_POSITION),
            sample_index: AtomicU64::new(0),
            loop_length: AtomicU64::new(0),
            xruns: AtomicU64::new(0),
            rejected_events: AtomicU64::new(0),
            dropped_feedback: AtomicU64::new(0),
            lost_captures: AtomicU64::new(0),
            last_status: AtomicU32::new(0),
            output_latency_us: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn playhead(&self) -> usize {
        self.playhead.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn armed(&self) -> Option<Position> {
        decode_position(self.armed.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn solo(&self) -> Option<Position> {
        decode_position(self.solo.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn sample_index(&self) -> u64 {
        self.sample_index.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn loop_length(&self) -> usize {
        self.loop_length.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_events(&self) -> u64 {
        self.rejected_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_feedback(&self) -> u64 {
        self.dropped_feedback.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lost_captures(&self) -> u64 {
        self.lost_captures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn output_latency_us(&self) -> u32 {
        self.output_latency_us.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for EngineAtomics {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub(crate) fn encode_position(position: Option<Position>) -> u8 {
    position.map_or(NO_POSITION, Position::number)
}

#[inline]
fn decode_position(raw: u8) -> Option<Position> {
    Position::new(raw).ok()
}
