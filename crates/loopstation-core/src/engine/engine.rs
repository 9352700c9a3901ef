//! Loop engine - the real-time core
//!
//! Owns the playing copies of all six track buffers, the master clock, the
//! event queue and the transport state. Everything it does per callback is
//! bounded and allocation-free:
//!
//! 1. mix every audible track from the playhead into the output block,
//!    splitting the block at the loop boundary
//! 2. overdub the input block into the armed track
//! 3. hard-clip the output
//! 4. advance the clock and fire due events
//! 5. publish state to [`EngineAtomics`]

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use basedrop::Owned;

use super::atomics::{encode_position, EngineAtomics};
use super::command::{EngineCommand, EngineEvent, RejectReason};
use super::status::{CallbackTiming, StreamStatus};
use crate::buffer::SampleBuffer;
use crate::clock::MasterClock;
use crate::scheduler::{Event, EventAction, EventQueue};
use crate::track::TrackMix;
use crate::types::{LoopId, Position, StereoSample, TrackId, NUM_POSITIONS};

/// Transport state machine
///
/// ```text
/// STOPPED --play--> PLAYING --pause--> PAUSED --play--> PLAYING
///    ^                 |                  |
///    +------stop-------+-------stop-------+
/// ```
///
/// Recording is an orthogonal flag and only writes while PLAYING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl TransportState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TransportState::Playing,
            2 => TransportState::Paused,
            _ => TransportState::Stopped,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
        }
    }
}

/// A track as the engine sees it
struct EngineSlot {
    track_id: TrackId,
    revision: u64,
    buffer: Owned<SampleBuffer>,
    mix: TrackMix,
}

pub struct LoopEngine {
    loop_id: LoopId,
    /// Loop length in frames
    length: usize,
    playhead: usize,
    state: TransportState,
    armed: Option<Position>,
    solo: Option<Position>,
    slots: [Option<EngineSlot>; NUM_POSITIONS],
    /// Buffers that receive each position's audio when recording ends
    spares: [Option<Owned<SampleBuffer>>; NUM_POSITIONS],
    clock: MasterClock,
    events: EventQueue,
    feedback: rtrb::Producer<EngineEvent>,
    atomics: Arc<EngineAtomics>,
}

impl LoopEngine {
    pub fn new(
        loop_id: LoopId,
        length: usize,
        clock: MasterClock,
        event_capacity: usize,
        feedback: rtrb::Producer<EngineEvent>,
    ) -> Self {
        let engine = Self {
            loop_id,
            length,
            playhead: 0,
            state: TransportState::Stopped,
            armed: None,
            solo: None,
            slots: Default::default(),
            spares: Default::default(),
            clock,
            events: EventQueue::with_capacity(event_capacity),
            feedback,
            atomics: Arc::new(EngineAtomics::new()),
        };
        engine.publish(StreamStatus::empty());
        engine
    }

    pub fn atomics(&self) -> Arc<EngineAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn loop_id(&self) -> LoopId {
        self.loop_id
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn playhead(&self) -> usize {
        self.playhead
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn armed(&self) -> Option<Position> {
        self.armed
    }

    pub fn solo(&self) -> Option<Position> {
        self.solo
    }

    pub fn clock(&self) -> &MasterClock {
        &self.clock
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Audio currently playing at `position`
    pub fn slot_buffer(&self, position: Position) -> Option<&SampleBuffer> {
        self.slots[position.index()].as_ref().map(|s| &*s.buffer)
    }

    pub fn slot_mix(&self, position: Position) -> Option<TrackMix> {
        self.slots[position.index()].as_ref().map(|s| s.mix)
    }

    pub fn has_spare(&self, position: Position) -> bool {
        self.spares[position.index()].is_some()
    }

    // ─────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────

    /// Apply every queued command (called at the start of each callback)
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply_command(cmd);
        }
    }

    pub fn apply_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::ResetLoop { loop_id, length } => self.reset_loop(loop_id, length),
            EngineCommand::LoadSlot {
                position,
                track_id,
                revision,
                buffer,
                mix,
            } => {
                self.load_slot(position, track_id, revision, buffer, mix);
            }
            EngineCommand::ReplaceBuffer {
                position,
                revision,
                buffer,
            } => {
                self.replace_buffer(position, revision, buffer);
            }
            EngineCommand::ClearSlot { position } => self.clear_slot(position),
            EngineCommand::SwapSlots { a, b } => self.swap_slots(a, b),
            EngineCommand::SetMix { position, mix } => self.set_mix(position, mix),
            EngineCommand::SetSolo(position) => self.solo = position,
            EngineCommand::Play => self.play(),
            EngineCommand::Pause => self.pause(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::Arm { position, spare } => {
                self.stage_capture(position, spare);
                self.arm(position);
            }
            EngineCommand::Disarm => self.disarm(),
            EngineCommand::StageCapture { position, spare } => self.stage_capture(position, spare),
            EngineCommand::Schedule(event) => self.schedule(event),
            EngineCommand::ClearSchedule => self.events.clear(),
        }
    }

    /// Switch loops: stop, disarm without hand-back, empty every slot and
    /// drop pending events
    pub fn reset_loop(&mut self, loop_id: LoopId, length: usize) {
        self.loop_id = loop_id;
        self.length = length;
        self.playhead = 0;
        self.state = TransportState::Stopped;
        self.armed = None;
        self.solo = None;
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        for spare in self.spares.iter_mut() {
            *spare = None;
        }
        self.events.clear();
    }

    /// Install a track; refused (and dropped) if its length is not the loop's
    pub fn load_slot(
        &mut self,
        position: Position,
        track_id: TrackId,
        revision: u64,
        buffer: Owned<SampleBuffer>,
        mix: TrackMix,
    ) -> bool {
        if buffer.frames() != self.length {
            return false;
        }
        if self.armed == Some(position) {
            self.armed = None;
        }
        self.spares[position.index()] = None;
        self.slots[position.index()] = Some(EngineSlot {
            track_id,
            revision,
            buffer,
            mix,
        });
        true
    }

    /// Swap in re-rendered audio for the track at `position`
    pub fn replace_buffer(
        &mut self,
        position: Position,
        revision: u64,
        buffer: Owned<SampleBuffer>,
    ) -> bool {
        if buffer.frames() != self.length {
            return false;
        }
        match self.slots[position.index()].as_mut() {
            Some(slot) => {
                slot.buffer = buffer;
                slot.revision = revision;
                true
            }
            None => false,
        }
    }

    pub fn clear_slot(&mut self, position: Position) {
        if self.armed == Some(position) {
            self.armed = None;
        }
        if self.solo == Some(position) {
            self.solo = None;
        }
        self.slots[position.index()] = None;
        self.spares[position.index()] = None;
    }

    /// Exchange two positions; arm and solo follow their tracks
    pub fn swap_slots(&mut self, a: Position, b: Position) {
        self.slots.swap(a.index(), b.index());
        self.spares.swap(a.index(), b.index());
        let follow = |p: Option<Position>| match p {
            Some(p) if p == a => Some(b),
            Some(p) if p == b => Some(a),
            other => other,
        };
        self.armed = follow(self.armed);
        self.solo = follow(self.solo);
    }

    pub fn set_mix(&mut self, position: Position, mix: TrackMix) {
        if let Some(slot) = self.slots[position.index()].as_mut() {
            slot.mix = mix;
        }
    }

    pub fn set_solo(&mut self, position: Option<Position>) {
        self.solo = position;
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// STOPPED/PAUSED -> PLAYING; no-op while playing
    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    /// PLAYING -> PAUSED, keeping the playhead; no-op otherwise
    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    /// Any state -> STOPPED with the playhead rewound
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.playhead = 0;
    }

    /// Arm an occupied position, handing back any previously armed one
    pub fn arm(&mut self, position: Position) -> bool {
        if self.slots[position.index()].is_none() {
            return false;
        }
        if self.armed == Some(position) {
            return true;
        }
        self.disarm();
        self.armed = Some(position);
        true
    }

    /// End recording and return the armed track's audio to the controller
    pub fn disarm(&mut self) {
        if let Some(position) = self.armed.take() {
            self.hand_back(position);
        }
    }

    pub fn stage_capture(&mut self, position: Position, spare: Owned<SampleBuffer>) {
        self.spares[position.index()] = Some(spare);
    }

    fn hand_back(&mut self, position: Position) {
        let idx = position.index();
        let spare = self.spares[idx].take();
        let captured = match (self.slots[idx].as_ref(), spare) {
            (Some(slot), Some(mut spare)) => {
                if spare.copy_from(&slot.buffer) {
                    Some(EngineEvent::Captured {
                        position,
                        track_id: slot.track_id,
                        revision: slot.revision,
                        buffer: spare,
                    })
                } else {
                    None
                }
            }
            _ => None,
        };
        match captured {
            Some(event) => {
                if self.feedback.push(event).is_err() {
                    EngineAtomics::bump(&self.atomics.dropped_feedback);
                    EngineAtomics::bump(&self.atomics.lost_captures);
                }
            }
            None => EngineAtomics::bump(&self.atomics.lost_captures),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────

    pub fn schedule(&mut self, event: Event) {
        if let Err(event) = self.events.schedule(event) {
            self.reject(event, RejectReason::QueueFull);
        }
    }

    fn fire(&mut self, event: Event) {
        if event.loop_id != self.loop_id {
            self.reject(event, RejectReason::StaleLoop);
            return;
        }
        match event.action {
            EventAction::Play => self.play(),
            EventAction::Pause => self.pause(),
            EventAction::Stop => self.stop(),
            EventAction::RecordStart => {
                let armed = event.track.map(|p| self.arm(p)).unwrap_or(false);
                if !armed {
                    self.reject(event, RejectReason::EmptySlot);
                    return;
                }
            }
            EventAction::RecordStop => self.disarm(),
        }
        self.notify(EngineEvent::EventFired(event));
    }

    fn reject(&mut self, event: Event, reason: RejectReason) {
        EngineAtomics::bump(&self.atomics.rejected_events);
        self.notify(EngineEvent::EventRejected { event, reason });
    }

    fn notify(&mut self, event: EngineEvent) {
        if self.feedback.push(event).is_err() {
            EngineAtomics::bump(&self.atomics.dropped_feedback);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Audio
    // ─────────────────────────────────────────────────────────────

    /// Render one block
    ///
    /// `input` and `output` must hold at least `frames` frames. A short block
    /// or an xrun flag yields silence and skips recording, but the playhead
    /// and clock still advance so the loop stays in time.
    pub fn process(
        &mut self,
        input: &[StereoSample],
        output: &mut [StereoSample],
        frames: usize,
        timing: &CallbackTiming,
        status: StreamStatus,
    ) {
        let audible = !status.is_xrun() && input.len() >= frames && output.len() >= frames;
        let out_len = frames.min(output.len());
        output[..out_len].fill(StereoSample::silence());

        if !audible {
            EngineAtomics::bump(&self.atomics.xruns);
        }

        if self.state == TransportState::Playing && self.length > 0 {
            let mut done = 0;
            while done < frames {
                let chunk = (self.length - self.playhead).min(frames - done);
                if audible {
                    self.mix_chunk(&mut output[done..done + chunk]);
                    if let Some(position) = self.armed {
                        self.record_chunk(position, &input[done..done + chunk]);
                    }
                }
                self.playhead += chunk;
                if self.playhead >= self.length {
                    self.playhead = 0;
                }
                done += chunk;
            }
            for sample in output[..out_len].iter_mut() {
                *sample = sample.clip();
            }
        }

        self.clock.advance(frames);
        let now = self.clock.current_sample_index();
        while let Some(event) = self.events.pop_next_due(now) {
            self.fire(event);
        }

        self.atomics
            .output_latency_us
            .store((timing.output_latency() * 1_000_000.0) as u32, Ordering::Relaxed);
        self.publish(status);
    }

    fn mix_chunk(&self, out: &mut [StereoSample]) {
        for (idx, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if slot.mix.muted {
                continue;
            }
            if self.solo.is_some_and(|s| s.index() != idx) {
                continue;
            }
            slot.buffer
                .mix_into(self.playhead, out, slot.mix.left(), slot.mix.right());
        }
    }

    fn record_chunk(&mut self, position: Position, input: &[StereoSample]) {
        if let Some(slot) = self.slots[position.index()].as_mut() {
            slot.buffer.accumulate(self.playhead, input);
        }
    }

    fn publish(&self, status: StreamStatus) {
        let a = &self.atomics;
        a.state.store(self.state as u8, Ordering::Relaxed);
        a.playhead.store(self.playhead as u64, Ordering::Relaxed);
        a.armed.store(encode_position(self.armed), Ordering::Relaxed);
        a.solo.store(encode_position(self.solo), Ordering::Relaxed);
        a.sample_index
            .store(self.clock.current_sample_index(), Ordering::Relaxed);
        a.loop_length.store(self.length as u64, Ordering::Relaxed);
        a.last_status.store(status.bits(), Ordering::Relaxed);
    }
}
