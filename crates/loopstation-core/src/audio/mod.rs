//! Audio I/O through cpal
//!
//! The transport needs a full-duplex stream: microphone or line input for
//! recording and stereo output for playback. cpal exposes these as two
//! streams, which [`start_audio_system`] joins with a lock-free ring and
//! drives the [`EngineRuntime`](crate::engine::EngineRuntime) from the output
//! callback.
//!
//! ```ignore
//! let (mut controller, runtime) = TransportController::new(&config)?;
//! let audio = start_audio_system(&config.audio, config.sample_rate, runtime)?;
//! controller.play()?;
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, LOW_LATENCY_BUFFER_SIZE,
    MAX_BUFFER_SIZE,
};
pub use cpal_backend::{start_audio_system, AudioSystemResult, CpalAudioHandle};
pub use device::{find_device_by_id, get_cpal_default_device, get_devices, AudioDevice, Direction};
pub use error::{AudioError, AudioResult};
