//! Audio-thread side of a running transport
//!
//! Bundles the engine with its command receiver so a backend can move a
//! single value into its audio callback.

use std::sync::Arc;

use super::atomics::EngineAtomics;
use super::command::EngineCommand;
use super::engine::LoopEngine;
use super::status::{CallbackTiming, StreamStatus};
use crate::types::StereoSample;

pub struct EngineRuntime {
    engine: LoopEngine,
    command_rx: rtrb::Consumer<EngineCommand>,
}

impl EngineRuntime {
    pub fn new(engine: LoopEngine, command_rx: rtrb::Consumer<EngineCommand>) -> Self {
        Self { engine, command_rx }
    }

    /// The audio callback: apply pending commands, then render one block
    pub fn process(
        &mut self,
        input: &[StereoSample],
        output: &mut [StereoSample],
        frames: usize,
        timing: &CallbackTiming,
        status: StreamStatus,
    ) {
        self.engine.process_commands(&mut self.command_rx);
        self.engine.process(input, output, frames, timing, status);
    }

    pub fn engine(&self) -> &LoopEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut LoopEngine {
        &mut self.engine
    }

    pub fn atomics(&self) -> Arc<EngineAtomics> {
        self.engine.atomics()
    }
}
