//! Loopstation Core - six-position loop recording and playback transport

pub mod audio;
pub mod audio_file;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod controller;
pub mod effect;
pub mod engine;
pub mod error;
pub mod loops;
pub mod manifest;
pub mod scheduler;
pub mod timestretch;
pub mod track;
pub mod types;

pub use buffer::SampleBuffer;
pub use clock::{MasterClock, TimeSignature};
pub use controller::{SyncReport, TransportController, TransportSnapshot};
pub use error::{ArmViolation, TransportError, TransportResult};
pub use loops::Loop;
pub use scheduler::{Event, EventAction, EventId, EventQueue};
pub use track::{Track, TrackMix};
pub use types::*;
