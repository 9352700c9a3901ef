//! Transport error types
//!
//! Every controller operation validates before it mutates anything, so an
//! `Err` always means the loop and the engine are unchanged.

use std::fmt;

use thiserror::Error;

use crate::engine::TransportState;
use crate::types::{ChannelConfig, Position};

/// Why an operation touching a recording-armed track was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmViolation {
    /// Tried to arm a position with no track in it
    EmptySlot,
    /// Tried to edit, clear, replace or move the armed track
    TrackArmed,
    /// Recording ended but its audio has not been collected by `sync` yet
    TakePending,
}

impl fmt::Display for ArmViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmViolation::EmptySlot => write!(f, "position is empty"),
            ArmViolation::TrackArmed => write!(f, "track is armed for recording"),
            ArmViolation::TakePending => write!(f, "recorded take has not been collected yet"),
        }
    }
}

/// Errors raised by the transport controller and the loop model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Invalid track position {0}: positions are 1-6")]
    InvalidPosition(u8),

    #[error("No track at position {0}")]
    EmptyTrackSlot(Position),

    #[error("Position {0} already holds a track")]
    SlotOccupied(Position),

    #[error("Cannot move {from_config} track at position {from} onto {to_config} track at position {to}")]
    IncompatibleTrackConfig {
        from: Position,
        to: Position,
        from_config: ChannelConfig,
        to_config: ChannelConfig,
    },

    #[error("Recording arm violation at position {position}: {reason}")]
    RecordingArmViolation {
        position: Position,
        reason: ArmViolation,
    },

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: TransportState,
    },

    #[error("Invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Track length mismatch: loop is {expected} frames, track is {actual} frames")]
    TrackLengthMismatch { expected: usize, actual: usize },

    #[error("Engine command queue is full")]
    CommandQueueFull,
}

impl TransportError {
    pub(crate) fn armed(position: Position) -> Self {
        TransportError::RecordingArmViolation {
            position,
            reason: ArmViolation::TrackArmed,
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_position() {
        let pos = Position::new(3).unwrap();
        let msg = TransportError::EmptyTrackSlot(pos).to_string();
        assert!(msg.contains('3'));

        let msg = TransportError::armed(pos).to_string();
        assert!(msg.contains("armed"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = TransportError::InvalidState {
            action: "pause",
            state: TransportState::Stopped,
        };
        assert_eq!(err.to_string(), "Cannot pause while stopped");
    }
}
