//! Lock-free message queues between the controller and the audio thread
//!
//! Controller → engine: [`EngineCommand`] over an `rtrb` SPSC ring, drained at
//! the start of every callback. Engine → controller: [`EngineEvent`] over a
//! second ring, drained by `TransportController::sync`.
//!
//! Both directions are wait-free and never allocate after startup. Buffers
//! travel as `basedrop::Owned`, so whichever side drops one never frees
//! memory on the audio thread.

use basedrop::Owned;

use crate::buffer::SampleBuffer;
use crate::scheduler::Event;
use crate::track::TrackMix;
use crate::types::{LoopId, Position, TrackId};

/// Ring capacity for controller → engine commands
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Ring capacity for engine → controller feedback
pub const FEEDBACK_QUEUE_CAPACITY: usize = 256;

/// Commands sent from the controller to the audio thread
///
/// Each variant is applied whole between blocks, so the callback never sees
/// a half-applied change.
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Loop and track layout
    // ─────────────────────────────────────────────────────────────
    /// Switch to another loop: stops, disarms, clears every slot and the
    /// event queue
    ResetLoop { loop_id: LoopId, length: usize },
    /// Install a track's audio and mix at a position
    ///
    /// `revision` identifies this buffer in later [`EngineEvent::Captured`]
    /// messages.
    LoadSlot {
        position: Position,
        track_id: TrackId,
        revision: u64,
        buffer: Owned<SampleBuffer>,
        mix: TrackMix,
    },
    /// Swap in re-rendered audio for an existing track
    ReplaceBuffer {
        position: Position,
        revision: u64,
        buffer: Owned<SampleBuffer>,
    },
    /// Empty a position
    ClearSlot { position: Position },
    /// Exchange two positions (either may be empty)
    SwapSlots { a: Position, b: Position },

    // ─────────────────────────────────────────────────────────────
    // Mix
    // ─────────────────────────────────────────────────────────────
    SetMix { position: Position, mix: TrackMix },
    /// Play only this position (None = all)
    SetSolo(Option<Position>),

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    Play,
    Pause,
    Stop,
    /// Arm a position; `spare` receives the recording on disarm
    Arm {
        position: Position,
        spare: Owned<SampleBuffer>,
    },
    Disarm,
    /// Provide the spare for a scheduled record-start
    StageCapture {
        position: Position,
        spare: Owned<SampleBuffer>,
    },

    // ─────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────
    Schedule(Event),
    ClearSchedule,
}

/// Why the engine refused or ignored a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Event queue was at capacity
    QueueFull,
    /// Event belongs to a loop that is no longer loaded
    StaleLoop,
    /// Record-start targeted an empty position or had no target
    EmptySlot,
}

/// Messages sent from the audio thread back to the controller
pub enum EngineEvent {
    /// A recording pass ended; `buffer` holds the track's audio at disarm
    ///
    /// `revision` is the revision of the buffer that was recorded into.
    Captured {
        position: Position,
        track_id: TrackId,
        revision: u64,
        buffer: Owned<SampleBuffer>,
    },
    /// A scheduled event fired
    EventFired(Event),
    /// A scheduled event was refused or ignored
    EventRejected { event: Event, reason: RejectReason },
}

/// Create the controller → engine command ring
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Create the engine → controller feedback ring
pub fn feedback_channel() -> (rtrb::Producer<EngineEvent>, rtrb::Consumer<EngineEvent>) {
    rtrb::RingBuffer::new(FEEDBACK_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{EventAction, EventId};

    #[test]
    fn test_command_channel_creation() {
        let (mut tx, mut rx) = command_channel();
        assert!(tx.push(EngineCommand::Play).is_ok());
        assert!(matches!(rx.pop(), Ok(EngineCommand::Play)));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_feedback_channel_creation() {
        let (mut tx, mut rx) = feedback_channel();
        let event = Event {
            id: EventId(7),
            action: EventAction::Stop,
            track: None,
            loop_id: LoopId(1),
            due_sample: 0,
        };
        assert!(tx.push(EngineEvent::EventFired(event)).is_ok());
        assert!(matches!(
            rx.pop(),
            Ok(EngineEvent::EventFired(Event { id: EventId(7), action: EventAction::Stop, .. }))
        ));
    }

    #[test]
    fn test_command_size() {
        // Buffers are pointer-sized Owned handles; the largest variant is the
        // scheduled Event. Keep the enum within a cache line.
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 64, "EngineCommand is {} bytes, expected <= 64", size);
    }
}
