//! Real-time loop engine
//!
//! The engine runs on the audio thread and owns the playing copies of every
//! track. Other threads talk to it only through lock-free queues and read
//! its state through [`EngineAtomics`].

mod atomics;
mod command;
mod engine;
pub mod gc;
mod runtime;
mod status;

pub use atomics::EngineAtomics;
pub use command::{
    command_channel, feedback_channel, EngineCommand, EngineEvent, RejectReason,
    COMMAND_QUEUE_CAPACITY, FEEDBACK_QUEUE_CAPACITY,
};
pub use engine::{LoopEngine, TransportState};
pub use runtime::EngineRuntime;
pub use status::{CallbackTiming, StreamStatus};
