//! Failures opening the station's duplex audio

use thiserror::Error;

use super::device::Direction;

/// Why the station could not get audio running
///
/// Every variant names the side of the duplex pair it concerns, since input
/// and output devices are resolved and opened separately.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No host offers a device for this side
    #[error("No {0} devices available")]
    NoDevices(Direction),

    /// Nothing configured and the default host has no default device
    #[error("No default {0} device; pick one in the station settings")]
    NoDefaultDevice(Direction),

    /// The device named in the station settings is not connected
    #[error("Configured {direction} device '{name}' is not connected")]
    DeviceNotFound { name: String, direction: Direction },

    /// The host would not describe the device's capabilities
    #[error("Cannot query {direction} device: {reason}")]
    DeviceQuery { direction: Direction, reason: String },

    /// The engine mixes in f32 and the device offers no float format
    #[error("{direction} device has no 32-bit float format (offers {offered})")]
    NoFloatFormat { direction: Direction, offered: String },

    /// The device cannot run at the rate the transport clock was built for
    #[error("Transport runs at {requested}Hz but the {direction} device tops out at {device}Hz")]
    SampleRateMismatch {
        requested: u32,
        device: u32,
        direction: Direction,
    },

    #[error("Cannot open {direction} stream: {reason}")]
    StreamOpen { direction: Direction, reason: String },

    #[error("Cannot start {direction} stream: {reason}")]
    StreamStart { direction: Direction, reason: String },
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
