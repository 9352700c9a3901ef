//! Transport controller - the non-real-time command surface
//!
//! The controller owns the authoritative [`Loop`] and talks to the engine
//! only through the command queue. Every operation validates first and
//! mutates second, so a returned `Err` means neither the loop nor the engine
//! changed.
//!
//! Destructive edits are copy-on-write: the new audio is rendered here, sent
//! to the engine as a replacement buffer, and only then committed to the
//! loop. Each buffer sent carries a revision number so a recorded take that
//! comes back after a newer edit can be recognised and dropped.
//!
//! The engine reports recorded takes and fired events through the feedback
//! queue; call [`TransportController::sync`] regularly (e.g. once per UI
//! frame) to collect them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use basedrop::{Handle, Owned};

use crate::buffer::SampleBuffer;
use crate::clock::MasterClock;
use crate::config::StationConfig;
use crate::effect::TrackEffect;
use crate::engine::gc::gc_handle;
use crate::engine::{
    command_channel, feedback_channel, EngineAtomics, EngineCommand, EngineEvent, EngineRuntime,
    LoopEngine, RejectReason, TransportState,
};
use crate::error::{ArmViolation, TransportError, TransportResult};
use crate::loops::{Loop, DEFAULT_LOOP_NAME};
use crate::scheduler::{Event, EventAction, EventId};
use crate::track::{Track, TrackMix};
use crate::types::{ChannelConfig, LoopId, Position, TrackId};

/// What one [`TransportController::sync`] call collected from the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Positions whose recorded take was adopted
    pub captured: Vec<Position>,
    /// Takes dropped because the track was edited after they ended
    pub discarded: usize,
    pub fired: Vec<EventId>,
    pub rejected: Vec<(EventId, RejectReason)>,
}

/// Point-in-time view of the transport
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub loop_id: LoopId,
    pub state: TransportState,
    pub armed: Option<Position>,
    pub solo: Option<Position>,
    /// Playhead published by the engine after its last block
    pub playhead: usize,
    pub loop_length: usize,
    pub sample_index: u64,
    /// Events scheduled and not yet reported back
    pub pending_events: usize,
    pub xruns: u64,
    pub rejected_events: u64,
    pub lost_captures: u64,
    pub output_latency_us: u32,
}

pub struct TransportController {
    config: StationConfig,
    active: Loop,
    clock: MasterClock,
    commands: rtrb::Producer<EngineCommand>,
    feedback: rtrb::Consumer<EngineEvent>,
    atomics: Arc<EngineAtomics>,
    gc: Handle,
    /// Transport state as of the last command sent or event collected
    state: TransportState,
    armed: Option<Position>,
    solo: Option<Position>,
    /// Tracks whose take is on its way back from the engine
    pending_takes: Vec<TrackId>,
    /// Revision of the last buffer sent for each track
    revisions: HashMap<TrackId, u64>,
    last_revision: u64,
    scheduled: BTreeMap<EventId, Event>,
    next_event_id: u64,
    lost_captures_seen: u64,
    dropped_feedback_seen: u64,
    /// Feedback collected since the last `sync`
    unreported: SyncReport,
}

impl TransportController {
    /// Controller with an empty loop, plus the runtime to move into the
    /// audio callback
    pub fn new(config: &StationConfig) -> TransportResult<(Self, EngineRuntime)> {
        let length = config.loop_length_frames()?;
        Self::with_loop(config, Loop::new(DEFAULT_LOOP_NAME, length, config.sample_rate))
    }

    /// Controller for an existing loop (e.g. one rebuilt from a manifest)
    pub fn with_loop(
        config: &StationConfig,
        mut active: Loop,
    ) -> TransportResult<(Self, EngineRuntime)> {
        config.validate()?;
        check_sample_rate(&active, config.sample_rate)?;

        let clock = config.clock()?;
        let (commands, command_rx) = command_channel();
        let (feedback_tx, feedback) = feedback_channel();
        let gc = gc_handle();

        let mut engine = LoopEngine::new(
            active.id(),
            active.length_frames(),
            clock.clone(),
            config.event_capacity,
            feedback_tx,
        );

        let mut revisions = HashMap::new();
        let mut last_revision = 0;
        for position in Position::ALL {
            if let Some(track) = active.track_mut(position) {
                track.set_undo_depth(config.undo_depth);
                last_revision += 1;
                revisions.insert(track.id(), last_revision);
                let buffer = Owned::new(&gc, track.buffer().clone());
                let loaded =
                    engine.load_slot(position, track.id(), last_revision, buffer, track.mix());
                debug_assert!(loaded, "loop tracks always match the loop length");
            }
        }

        log::info!(
            "Transport ready: {} '{}' ({} frames @ {}Hz, {} tracks)",
            active.id(),
            active.name(),
            active.length_frames(),
            active.sample_rate(),
            active.tracks().count()
        );

        let atomics = engine.atomics();
        let controller = Self {
            config: config.clone(),
            active,
            clock,
            commands,
            feedback,
            atomics,
            gc,
            state: TransportState::Stopped,
            armed: None,
            solo: None,
            pending_takes: Vec::new(),
            revisions,
            last_revision,
            scheduled: BTreeMap::new(),
            next_event_id: 1,
            lost_captures_seen: 0,
            dropped_feedback_seen: 0,
            unreported: SyncReport::default(),
        };
        Ok((controller, EngineRuntime::new(engine, command_rx)))
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    pub fn current_loop(&self) -> &Loop {
        &self.active
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn armed(&self) -> Option<Position> {
        self.armed
    }

    pub fn solo_position(&self) -> Option<Position> {
        self.solo
    }

    /// True while a finished recording has not been collected by `sync`
    pub fn has_pending_takes(&self) -> bool {
        !self.pending_takes.is_empty()
    }

    pub fn scheduled_events(&self) -> impl Iterator<Item = &Event> {
        self.scheduled.values()
    }

    pub fn atomics(&self) -> &Arc<EngineAtomics> {
        &self.atomics
    }

    pub fn clock(&self) -> &MasterClock {
        &self.clock
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            loop_id: self.active.id(),
            state: self.state,
            armed: self.armed,
            solo: self.solo,
            playhead: self.atomics.playhead(),
            loop_length: self.active.length_frames(),
            sample_index: self.atomics.sample_index(),
            pending_events: self.scheduled.len(),
            xruns: self.atomics.xruns(),
            rejected_events: self.atomics.rejected_events(),
            lost_captures: self.atomics.lost_captures(),
            output_latency_us: self.atomics.output_latency_us(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// Start or resume playback
    ///
    /// Always reaches the engine, so a scheduled stop or pause that fired
    /// since the last feedback was collected is overridden.
    pub fn play(&mut self) -> TransportResult<()> {
        self.collect_feedback();
        self.send(EngineCommand::Play)?;
        if self.state != TransportState::Playing {
            log::info!("Transport playing");
        }
        self.state = TransportState::Playing;
        Ok(())
    }

    /// Pause, keeping the playhead; only valid while playing or paused
    pub fn pause(&mut self) -> TransportResult<()> {
        self.collect_feedback();
        if self.state == TransportState::Stopped {
            return Err(TransportError::InvalidState {
                action: "pause",
                state: self.state,
            });
        }
        self.send(EngineCommand::Pause)?;
        if self.state == TransportState::Playing {
            log::info!("Transport paused");
        }
        self.state = TransportState::Paused;
        Ok(())
    }

    /// Stop and rewind the playhead
    pub fn stop(&mut self) -> TransportResult<()> {
        self.collect_feedback();
        self.send(EngineCommand::Stop)?;
        self.state = TransportState::Stopped;
        log::info!("Transport stopped");
        Ok(())
    }

    /// Arm `position` for overdub recording
    ///
    /// Recording only writes while playing. Arming another position ends the
    /// current take first.
    pub fn arm(&mut self, position: Position) -> TransportResult<()> {
        self.collect_feedback();
        let track = self
            .active
            .track(position)
            .ok_or(TransportError::RecordingArmViolation {
                position,
                reason: ArmViolation::EmptySlot,
            })?;
        if self.armed == Some(position) {
            return Ok(());
        }
        if self.pending_takes.contains(&track.id()) {
            return Err(TransportError::RecordingArmViolation {
                position,
                reason: ArmViolation::TakePending,
            });
        }
        let track_id = track.id();
        let spare = SampleBuffer::silent(track.channel_config(), track.frames());

        self.send(EngineCommand::Arm {
            position,
            spare: Owned::new(&self.gc, spare),
        })?;
        if let Some(previous) = self.armed.replace(position) {
            self.mark_take_pending(previous);
        }
        log::info!("Armed position {} ({})", position, track_id);
        Ok(())
    }

    /// End recording; a no-op when nothing is armed
    ///
    /// The take is adopted by the next `sync` after the engine hands it back.
    pub fn disarm(&mut self) -> TransportResult<()> {
        self.collect_feedback();
        let Some(position) = self.armed else {
            return Ok(());
        };
        self.send(EngineCommand::Disarm)?;
        self.armed = None;
        self.mark_take_pending(position);
        log::info!("Disarmed position {}", position);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Mix
    // ─────────────────────────────────────────────────────────────

    pub fn set_track_volume(&mut self, position: Position, volume: f32) -> TransportResult<()> {
        self.update_mix(position, |track| track.set_volume(volume))
    }

    /// Set left/right gains, clamped to the configured pan limit
    pub fn set_track_pan(&mut self, position: Position, left: f32, right: f32) -> TransportResult<()> {
        let limit = self.config.pan_limit;
        self.update_mix(position, |track| track.set_pan(left, right, limit))
    }

    /// Set gains from one balance control (-1.0 left .. 1.0 right)
    pub fn set_track_balance(&mut self, position: Position, balance: f32) -> TransportResult<()> {
        let limit = self.config.pan_limit;
        self.update_mix(position, |track| track.set_balance(balance, limit))
    }

    pub fn set_track_mute(&mut self, position: Position, muted: bool) -> TransportResult<()> {
        self.update_mix(position, |track| {
            track.set_muted(muted);
            Ok(())
        })
    }

    pub fn mute_all(&mut self) -> TransportResult<()> {
        self.set_all_muted(true)
    }

    pub fn unmute_all(&mut self) -> TransportResult<()> {
        self.set_all_muted(false)
    }

    /// Toggle solo on `position`, returning the soloed position afterwards
    ///
    /// Soloing a position un-solos any other one.
    pub fn solo(&mut self, position: Position) -> TransportResult<Option<Position>> {
        self.track(position)?;
        let next = if self.solo == Some(position) {
            None
        } else {
            Some(position)
        };
        self.send(EngineCommand::SetSolo(next))?;
        self.solo = next;
        Ok(next)
    }

    pub fn clear_solo(&mut self) -> TransportResult<()> {
        if self.solo.is_none() {
            return Ok(());
        }
        self.send(EngineCommand::SetSolo(None))?;
        self.solo = None;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Destructive edits
    // ─────────────────────────────────────────────────────────────

    pub fn toggle_reverse(&mut self, position: Position) -> TransportResult<()> {
        self.apply_effect(position, TrackEffect::Reverse)
    }

    /// Shift the track to `steps` half-steps from its original pitch
    pub fn set_pitch_modulation(&mut self, position: Position, steps: i32) -> TransportResult<()> {
        self.apply_effect(position, TrackEffect::PitchModulation(steps))
    }

    /// Play the track at `factor` times its original speed
    pub fn set_time_dilation(&mut self, position: Position, factor: f32) -> TransportResult<()> {
        self.apply_effect(position, TrackEffect::TimeDilation(factor))
    }

    /// Restore the track's previous audio; false when there is nothing to undo
    pub fn undo(&mut self, position: Position) -> TransportResult<bool> {
        let track = self.editable(position)?;
        let track_id = track.id();
        let Some(previous) = track.undo_buffer().cloned() else {
            return Ok(false);
        };
        self.replace_buffer(position, track_id, previous)?;
        if let Some(track) = self.active.track_mut(position) {
            track.undo();
        }
        log::info!("Undo on position {}", position);
        Ok(true)
    }

    fn apply_effect(&mut self, position: Position, effect: TrackEffect) -> TransportResult<()> {
        let track = self.editable(position)?;
        let track_id = track.id();
        let Some(edit) = effect.render(track, self.active.sample_rate())? else {
            log::debug!("{:?} leaves position {} unchanged", effect, position);
            return Ok(());
        };
        self.replace_buffer(position, track_id, edit.buffer.clone())?;
        if let Some(track) = self.active.track_mut(position) {
            track.apply_edit(edit);
        }
        log::info!("Applied {:?} to position {}", effect, position);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Track layout
    // ─────────────────────────────────────────────────────────────

    /// Remove and return the track at `position`
    pub fn clear_track(&mut self, position: Position) -> TransportResult<Track> {
        self.editable(position)?;
        self.send(EngineCommand::ClearSlot { position })?;
        if self.solo == Some(position) {
            self.solo = None;
        }
        let track = self
            .active
            .remove_track(position)
            .ok_or(TransportError::EmptyTrackSlot(position))?;
        self.revisions.remove(&track.id());
        log::info!("Cleared position {} ({})", position, track.id());
        Ok(track)
    }

    /// Swap the contents of two positions
    ///
    /// With an empty position on either side the swap always happens; two
    /// tracks swap only if their channel layouts match. Solo follows the
    /// moved track.
    pub fn move_track(&mut self, from: Position, to: Position) -> TransportResult<()> {
        self.active.check_move(from, to)?;
        if from == to {
            return Ok(());
        }
        self.ensure_unlocked(from)?;
        self.ensure_unlocked(to)?;
        let restage = self.restage_targets(&[from, to]);
        self.ensure_capacity(1 + restage.len())?;

        self.send(EngineCommand::SwapSlots { a: from, b: to })?;
        self.active.move_track(from, to)?;
        self.solo = match self.solo {
            Some(p) if p == from => Some(to),
            Some(p) if p == to => Some(from),
            other => other,
        };
        self.restage_captures(&restage)?;
        log::info!("Moved position {} <-> {}", from, to);
        Ok(())
    }

    /// Put `track` at `position`, returning the track it replaced
    pub fn set_track(&mut self, position: Position, mut track: Track) -> TransportResult<Option<Track>> {
        if track.frames() != self.active.length_frames() {
            return Err(TransportError::TrackLengthMismatch {
                expected: self.active.length_frames(),
                actual: track.frames(),
            });
        }
        self.ensure_unlocked(position)?;
        let restage = self.restage_targets(&[position]);
        self.ensure_capacity(1 + restage.len())?;

        track.set_undo_depth(self.config.undo_depth);
        let track_id = track.id();
        self.load_slot(position, track_id, track.buffer().clone(), track.mix())?;
        let previous = self.active.set_track(position, track)?;
        if let Some(previous) = previous.as_ref().filter(|p| p.id() != track_id) {
            self.revisions.remove(&previous.id());
        }
        self.restage_captures(&restage)?;
        log::info!("Loaded {} at position {}", track_id, position);
        Ok(previous)
    }

    /// Create a silent track at an empty position
    pub fn create_track(
        &mut self,
        position: Position,
        name: impl Into<String>,
        config: ChannelConfig,
    ) -> TransportResult<TrackId> {
        if self.active.track(position).is_some() {
            return Err(TransportError::SlotOccupied(position));
        }
        let track = self.active.new_track(name, config);
        let track_id = track.id();
        self.set_track(position, track)?;
        Ok(track_id)
    }

    pub fn rename_track(&mut self, position: Position, name: impl Into<String>) -> TransportResult<()> {
        self.active
            .track_mut(position)
            .ok_or(TransportError::EmptyTrackSlot(position))?
            .set_name(name);
        Ok(())
    }

    pub fn rename_loop(&mut self, name: impl Into<String>) {
        self.active.set_name(name);
    }

    // ─────────────────────────────────────────────────────────────
    // Loops
    // ─────────────────────────────────────────────────────────────

    /// Replace the active loop with an empty one, returning the old loop
    pub fn new_loop(&mut self, name: impl Into<String>) -> TransportResult<Loop> {
        let length = self.config.loop_length_frames()?;
        self.load_loop(Loop::new(name, length, self.config.sample_rate))
    }

    /// Make `next` the active loop, returning the previous one
    ///
    /// Stops the transport and drops scheduled events. Refused while a take
    /// is being recorded or has not been collected yet.
    pub fn load_loop(&mut self, mut next: Loop) -> TransportResult<Loop> {
        if let Some(position) = self.armed {
            return Err(TransportError::armed(position));
        }
        if let Some(position) = self.pending_take_positions().next() {
            return Err(TransportError::RecordingArmViolation {
                position,
                reason: ArmViolation::TakePending,
            });
        }
        check_sample_rate(&next, self.config.sample_rate)?;
        self.ensure_capacity(1 + next.tracks().count())?;

        self.send(EngineCommand::ResetLoop {
            loop_id: next.id(),
            length: next.length_frames(),
        })?;
        self.revisions.clear();
        for position in Position::ALL {
            if let Some(track) = next.track_mut(position) {
                track.set_undo_depth(self.config.undo_depth);
                let buffer = track.buffer().clone();
                self.load_slot(position, track.id(), buffer, track.mix())?;
            }
        }

        self.state = TransportState::Stopped;
        self.solo = None;
        self.pending_takes.clear();
        self.scheduled.clear();
        let previous = std::mem::replace(&mut self.active, next);
        log::info!(
            "Switched loop {} -> {} '{}'",
            previous.id(),
            self.active.id(),
            self.active.name()
        );
        Ok(previous)
    }

    // ─────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────

    /// Schedule `action` at an absolute sample index
    ///
    /// A due time already in the past fires at the end of the next block.
    /// `RecordStart` needs an occupied `track` position.
    pub fn schedule(
        &mut self,
        action: EventAction,
        track: Option<Position>,
        due_sample: u64,
    ) -> TransportResult<EventId> {
        let spare = match (action, track) {
            (EventAction::RecordStart, None) => {
                return Err(TransportError::InvalidParameter {
                    name: "record-start position",
                    value: 0.0,
                })
            }
            (EventAction::RecordStart, Some(position)) => {
                let target = self.active.track(position).ok_or(
                    TransportError::RecordingArmViolation {
                        position,
                        reason: ArmViolation::EmptySlot,
                    },
                )?;
                Some((position, SampleBuffer::silent(target.channel_config(), target.frames())))
            }
            _ => None,
        };
        self.ensure_capacity(1 + usize::from(spare.is_some()))?;

        let event = Event {
            id: EventId(self.next_event_id),
            action,
            track,
            loop_id: self.active.id(),
            due_sample,
        };
        if let Some((position, spare)) = spare {
            self.send(EngineCommand::StageCapture {
                position,
                spare: Owned::new(&self.gc, spare),
            })?;
        }
        self.send(EngineCommand::Schedule(event))?;
        self.next_event_id += 1;
        self.scheduled.insert(event.id, event);
        log::debug!("Scheduled {:?} {} at sample {}", action, event.id, due_sample);
        Ok(event.id)
    }

    /// Schedule `action` on the next grid tick after the engine's clock
    pub fn schedule_on_grid(
        &mut self,
        action: EventAction,
        track: Option<Position>,
    ) -> TransportResult<EventId> {
        let due = self.clock.next_tick(self.atomics.sample_index());
        self.schedule(action, track, due)
    }

    /// Drop every scheduled event that has not fired yet
    pub fn cancel_scheduled(&mut self) -> TransportResult<()> {
        self.send(EngineCommand::ClearSchedule)?;
        self.scheduled.clear();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Engine feedback
    // ─────────────────────────────────────────────────────────────

    /// Collect recorded takes and event outcomes from the engine
    ///
    /// Transport operations collect feedback too; the report covers
    /// everything collected since the previous `sync`.
    pub fn sync(&mut self) -> SyncReport {
        self.collect_feedback();
        std::mem::take(&mut self.unreported)
    }

    /// Bring the mirrored transport state up to date with the engine
    fn collect_feedback(&mut self) {
        let mut report = std::mem::take(&mut self.unreported);
        while let Ok(message) = self.feedback.pop() {
            match message {
                EngineEvent::Captured {
                    position,
                    track_id,
                    revision,
                    buffer,
                } => self.adopt_take(position, track_id, revision, buffer, &mut report),
                EngineEvent::EventFired(event) => {
                    self.scheduled.remove(&event.id);
                    report.fired.push(event.id);
                    if event.loop_id == self.active.id() {
                        self.apply_fired(&event);
                    }
                }
                EngineEvent::EventRejected { event, reason } => {
                    self.scheduled.remove(&event.id);
                    log::warn!("Event {} ({:?}) rejected: {:?}", event.id, event.action, reason);
                    report.rejected.push((event.id, reason));
                }
            }
        }

        let lost = self.atomics.lost_captures();
        if lost > self.lost_captures_seen {
            log::warn!(
                "{} recorded take(s) could not be handed back by the engine",
                lost - self.lost_captures_seen
            );
            self.lost_captures_seen = lost;
            // Any take still in flight is checked by revision on arrival
            self.pending_takes.clear();
        }
        let dropped = self.atomics.dropped_feedback();
        if dropped > self.dropped_feedback_seen {
            log::warn!(
                "{} engine feedback message(s) dropped; transport state may lag",
                dropped - self.dropped_feedback_seen
            );
            self.dropped_feedback_seen = dropped;
        }
        self.unreported = report;
    }

    fn adopt_take(
        &mut self,
        position: Position,
        track_id: TrackId,
        revision: u64,
        mut buffer: Owned<SampleBuffer>,
        report: &mut SyncReport,
    ) {
        self.pending_takes.retain(|id| *id != track_id);
        if self.revisions.get(&track_id) != Some(&revision) {
            log::warn!(
                "Discarding take from position {}: {} changed after recording",
                position,
                track_id
            );
            report.discarded += 1;
            return;
        }
        let Some(at) = self.position_of(track_id) else {
            log::warn!("Discarding take for {}: track is no longer loaded", track_id);
            report.discarded += 1;
            return;
        };
        let config = buffer.config();
        let take = std::mem::replace(&mut *buffer, SampleBuffer::silent(config, 0));
        if let Some(track) = self.active.track_mut(at) {
            track.record_take(take);
        }
        log::info!("Collected take for position {} ({})", at, track_id);
        report.captured.push(at);
    }

    /// Mirror an event the engine has already applied
    ///
    /// Takes ended by a scheduled event were queued before the event itself,
    /// so they are never marked pending here.
    fn apply_fired(&mut self, event: &Event) {
        match event.action {
            EventAction::Play => self.state = TransportState::Playing,
            EventAction::Pause => {
                if self.state == TransportState::Playing {
                    self.state = TransportState::Paused;
                }
            }
            EventAction::Stop => self.state = TransportState::Stopped,
            EventAction::RecordStart => {
                if event.track.is_some() {
                    self.armed = event.track;
                }
            }
            EventAction::RecordStop => self.armed = None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────

    fn send(&mut self, command: EngineCommand) -> TransportResult<()> {
        self.commands
            .push(command)
            .map_err(|_| TransportError::CommandQueueFull)
    }

    /// Fail up front when a multi-command operation would not fit
    fn ensure_capacity(&self, commands: usize) -> TransportResult<()> {
        if self.commands.slots() < commands {
            return Err(TransportError::CommandQueueFull);
        }
        Ok(())
    }

    fn track(&self, position: Position) -> TransportResult<&Track> {
        self.active
            .track(position)
            .ok_or(TransportError::EmptyTrackSlot(position))
    }

    /// Refuse positions whose audio is being recorded or awaiting collection
    fn ensure_unlocked(&self, position: Position) -> TransportResult<()> {
        if self.armed == Some(position) {
            return Err(TransportError::armed(position));
        }
        match self.active.track(position) {
            Some(track) if self.pending_takes.contains(&track.id()) => {
                Err(TransportError::RecordingArmViolation {
                    position,
                    reason: ArmViolation::TakePending,
                })
            }
            _ => Ok(()),
        }
    }

    /// Occupied and safe to replace
    fn editable(&self, position: Position) -> TransportResult<&Track> {
        let track = self.track(position)?;
        self.ensure_unlocked(position)?;
        Ok(track)
    }

    fn update_mix<F>(&mut self, position: Position, change: F) -> TransportResult<()>
    where
        F: FnOnce(&mut Track) -> TransportResult<()>,
    {
        let track = self
            .active
            .track_mut(position)
            .ok_or(TransportError::EmptyTrackSlot(position))?;
        let previous = track.mix();
        change(track)?;
        let mix = track.mix();
        if mix == previous {
            return Ok(());
        }
        if self.commands.push(EngineCommand::SetMix { position, mix }).is_err() {
            track.restore_mix(previous);
            return Err(TransportError::CommandQueueFull);
        }
        Ok(())
    }

    fn set_all_muted(&mut self, muted: bool) -> TransportResult<()> {
        let targets: Vec<Position> = self
            .active
            .tracks()
            .filter(|(_, track)| track.is_muted() != muted)
            .map(|(position, _)| position)
            .collect();
        self.ensure_capacity(targets.len())?;
        for position in targets {
            self.set_track_mute(position, muted)?;
        }
        Ok(())
    }

    fn replace_buffer(
        &mut self,
        position: Position,
        track_id: TrackId,
        buffer: SampleBuffer,
    ) -> TransportResult<()> {
        let revision = self.last_revision + 1;
        self.send(EngineCommand::ReplaceBuffer {
            position,
            revision,
            buffer: Owned::new(&self.gc, buffer),
        })?;
        self.commit_revision(track_id, revision);
        Ok(())
    }

    fn load_slot(
        &mut self,
        position: Position,
        track_id: TrackId,
        buffer: SampleBuffer,
        mix: TrackMix,
    ) -> TransportResult<()> {
        let revision = self.last_revision + 1;
        self.send(EngineCommand::LoadSlot {
            position,
            track_id,
            revision,
            buffer: Owned::new(&self.gc, buffer),
            mix,
        })?;
        self.commit_revision(track_id, revision);
        Ok(())
    }

    fn commit_revision(&mut self, track_id: TrackId, revision: u64) {
        self.last_revision = revision;
        self.revisions.insert(track_id, revision);
    }

    fn mark_take_pending(&mut self, position: Position) {
        if let Some(track) = self.active.track(position) {
            self.pending_takes.push(track.id());
        }
    }

    fn position_of(&self, track_id: TrackId) -> Option<Position> {
        self.active
            .tracks()
            .find(|(_, track)| track.id() == track_id)
            .map(|(position, _)| position)
    }

    fn pending_take_positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.pending_takes
            .iter()
            .filter_map(|id| self.position_of(*id))
    }

    /// Positions among `positions` targeted by a pending record-start
    fn restage_targets(&self, positions: &[Position]) -> Vec<Position> {
        let mut targets: Vec<Position> = self
            .scheduled
            .values()
            .filter(|e| e.action == EventAction::RecordStart)
            .filter_map(|e| e.track)
            .filter(|p| positions.contains(p))
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Give pending record-starts a spare shaped like the track now at their
    /// position
    fn restage_captures(&mut self, positions: &[Position]) -> TransportResult<()> {
        for &position in positions {
            let Some(track) = self.active.track(position) else {
                continue;
            };
            let spare = SampleBuffer::silent(track.channel_config(), track.frames());
            self.send(EngineCommand::StageCapture {
                position,
                spare: Owned::new(&self.gc, spare),
            })?;
        }
        Ok(())
    }
}

fn check_sample_rate(active: &Loop, sample_rate: u32) -> TransportResult<()> {
    if active.sample_rate() != sample_rate {
        return Err(TransportError::InvalidParameter {
            name: "loop sample rate",
            value: active.sample_rate() as f64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CallbackTiming, StreamStatus, COMMAND_QUEUE_CAPACITY};
    use crate::types::StereoSample;

    const LEN: usize = 1000;

    fn test_config() -> StationConfig {
        // 4kHz at 60bpm with quarter-beat ticks: 1000 samples per tick
        StationConfig {
            sample_rate: 4000,
            bpm: 60.0,
            subdivision: 0.25,
            loop_length_seconds: 0.25,
            ..Default::default()
        }
    }

    fn setup() -> (TransportController, EngineRuntime) {
        TransportController::new(&test_config()).unwrap()
    }

    fn pos(n: u8) -> Position {
        Position::new(n).unwrap()
    }

    fn run(runtime: &mut EngineRuntime, input: StereoSample, frames: usize) -> Vec<StereoSample> {
        let input = vec![input; frames];
        let mut out = vec![StereoSample::silence(); frames];
        runtime.process(&input, &mut out, frames, &CallbackTiming::default(), StreamStatus::empty());
        out
    }

    fn quiet(runtime: &mut EngineRuntime, frames: usize) -> Vec<StereoSample> {
        run(runtime, StereoSample::silence(), frames)
    }

    fn constant_track(config: ChannelConfig, value: f32) -> Track {
        let buffer =
            SampleBuffer::from_interleaved(config, vec![value; LEN * config.channels()]).unwrap();
        Track::from_buffer("constant", buffer)
    }

    fn ramp_track() -> Track {
        let samples = (0..LEN).map(|i| i as f32 / LEN as f32).collect();
        Track::from_buffer("ramp", SampleBuffer::from_interleaved(ChannelConfig::Mono, samples).unwrap())
    }

    /// Engine audio at `position` matches the controller's loop
    fn assert_in_step(controller: &TransportController, runtime: &EngineRuntime, position: Position) {
        let model = controller.current_loop().track(position).map(Track::buffer);
        let playing = runtime.engine().slot_buffer(position);
        assert_eq!(model, playing, "position {} out of step", position);
    }

    #[test]
    fn test_play_pause_stop() {
        let (mut ctl, mut rt) = setup();
        assert_eq!(
            ctl.pause(),
            Err(TransportError::InvalidState {
                action: "pause",
                state: TransportState::Stopped
            })
        );

        ctl.play().unwrap();
        quiet(&mut rt, 100);
        assert_eq!(rt.engine().playhead(), 100);

        ctl.pause().unwrap();
        quiet(&mut rt, 100);
        assert_eq!(rt.engine().playhead(), 100);
        assert_eq!(ctl.state(), TransportState::Paused);

        ctl.play().unwrap();
        quiet(&mut rt, 50);
        assert_eq!(rt.engine().playhead(), 150);

        ctl.stop().unwrap();
        quiet(&mut rt, 10);
        assert_eq!(rt.engine().playhead(), 0);
        assert_eq!(rt.engine().state(), TransportState::Stopped);
    }

    #[test]
    fn test_play_after_unsynced_scheduled_stop() {
        let (mut ctl, mut rt) = setup();
        ctl.play().unwrap();
        quiet(&mut rt, 10);
        let id = ctl.schedule(EventAction::Stop, None, 50).unwrap();
        quiet(&mut rt, 100);
        assert_eq!(rt.engine().state(), TransportState::Stopped);

        ctl.play().unwrap();
        quiet(&mut rt, 10);
        assert_eq!(rt.engine().state(), TransportState::Playing);
        assert_eq!(ctl.state(), TransportState::Playing);
        assert_eq!(ctl.sync().fired, vec![id]);
    }

    #[test]
    fn test_pause_after_unsynced_scheduled_play() {
        let (mut ctl, mut rt) = setup();
        let id = ctl.schedule(EventAction::Play, None, 0).unwrap();
        quiet(&mut rt, 10);
        quiet(&mut rt, 10);
        assert_eq!(ctl.state(), TransportState::Stopped);

        ctl.pause().unwrap();
        quiet(&mut rt, 10);
        assert_eq!(rt.engine().state(), TransportState::Paused);
        assert_eq!(rt.engine().playhead(), 10);
        assert_eq!(ctl.state(), TransportState::Paused);
        assert_eq!(ctl.sync().fired, vec![id]);
    }

    #[test]
    fn test_rearm_after_unsynced_scheduled_record_stop() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Mono).unwrap();
        ctl.play().unwrap();
        ctl.arm(pos(1)).unwrap();
        run(&mut rt, StereoSample::mono(0.5), 100);
        ctl.schedule(EventAction::RecordStop, None, 0).unwrap();
        quiet(&mut rt, 1);
        assert_eq!(rt.engine().armed(), None);

        ctl.arm(pos(1)).unwrap();
        quiet(&mut rt, 1);
        assert_eq!(rt.engine().armed(), Some(pos(1)));
        assert_eq!(ctl.armed(), Some(pos(1)));

        let report = ctl.sync();
        assert_eq!(report.captured, vec![pos(1)]);
        assert_eq!(report.fired.len(), 1);
    }

    #[test]
    fn test_invalid_position_numbers() {
        assert_eq!(Position::new(0), Err(TransportError::InvalidPosition(0)));
        assert_eq!(Position::new(7), Err(TransportError::InvalidPosition(7)));
    }

    #[test]
    fn test_operations_on_empty_slot() {
        let (mut ctl, _rt) = setup();
        assert_eq!(ctl.set_track_volume(pos(2), 0.5), Err(TransportError::EmptyTrackSlot(pos(2))));
        assert_eq!(ctl.toggle_reverse(pos(2)), Err(TransportError::EmptyTrackSlot(pos(2))));
        assert_eq!(ctl.solo(pos(2)), Err(TransportError::EmptyTrackSlot(pos(2))));
        assert!(matches!(ctl.clear_track(pos(2)), Err(TransportError::EmptyTrackSlot(_))));
        assert_eq!(
            ctl.arm(pos(2)),
            Err(TransportError::RecordingArmViolation {
                position: pos(2),
                reason: ArmViolation::EmptySlot
            })
        );
        assert_eq!(ctl.armed(), None);
    }

    #[test]
    fn test_record_collect_and_undo_take() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "vox", ChannelConfig::Stereo).unwrap();
        ctl.arm(pos(1)).unwrap();
        ctl.play().unwrap();
        run(&mut rt, StereoSample::mono(0.25), LEN);

        ctl.disarm().unwrap();
        assert!(ctl.has_pending_takes());
        quiet(&mut rt, 1);

        let report = ctl.sync();
        assert_eq!(report.captured, vec![pos(1)]);
        assert!(!ctl.has_pending_takes());
        let track = ctl.current_loop().track(pos(1)).unwrap();
        assert!((track.buffer().peak() - 0.25).abs() < 1e-6);
        assert!(track.can_undo());
        assert_in_step(&ctl, &rt, pos(1));

        assert!(ctl.undo(pos(1)).unwrap());
        quiet(&mut rt, 1);
        assert_eq!(ctl.current_loop().track(pos(1)).unwrap().buffer().peak(), 0.0);
        assert_in_step(&ctl, &rt, pos(1));
        assert!(!ctl.undo(pos(1)).unwrap());
    }

    #[test]
    fn test_overdub_passes_accumulate_unclipped() {
        let (mut ctl, mut rt) = setup();
        ctl.set_track(pos(1), constant_track(ChannelConfig::Stereo, 0.5)).unwrap();
        ctl.arm(pos(1)).unwrap();
        ctl.play().unwrap();
        let out = run(&mut rt, StereoSample::mono(0.4), LEN);
        assert!(out.iter().all(|s| (s.left - 0.5).abs() < 1e-6));
        let out = run(&mut rt, StereoSample::mono(0.4), LEN);
        assert!(out.iter().all(|s| (s.left - 0.9).abs() < 1e-6));
        // Stored audio exceeds full scale; only the output is clipped
        let out = quiet(&mut rt, LEN);
        assert!(out.iter().all(|s| s.left == 1.0));

        ctl.disarm().unwrap();
        quiet(&mut rt, 1);
        ctl.sync();
        let peak = ctl.current_loop().track(pos(1)).unwrap().buffer().peak();
        assert!((peak - 1.3).abs() < 1e-5);
    }

    #[test]
    fn test_edits_locked_while_recording() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Mono).unwrap();
        ctl.arm(pos(1)).unwrap();

        let armed = TransportError::armed(pos(1));
        assert_eq!(ctl.toggle_reverse(pos(1)), Err(armed.clone()));
        assert_eq!(ctl.clear_track(pos(1)).unwrap_err(), armed);
        assert_eq!(ctl.move_track(pos(1), pos(2)), Err(armed));
        // Mix changes are fine while recording
        assert!(ctl.set_track_volume(pos(1), 0.5).is_ok());

        ctl.disarm().unwrap();
        assert_eq!(
            ctl.toggle_reverse(pos(1)),
            Err(TransportError::RecordingArmViolation {
                position: pos(1),
                reason: ArmViolation::TakePending
            })
        );
        quiet(&mut rt, 1);
        ctl.sync();
        assert!(ctl.toggle_reverse(pos(1)).is_ok());
    }

    #[test]
    fn test_disarm_with_nothing_armed() {
        let (mut ctl, _rt) = setup();
        assert!(ctl.disarm().is_ok());
        assert!(!ctl.has_pending_takes());
    }

    #[test]
    fn test_rearm_other_position_hands_back_take() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Stereo).unwrap();
        ctl.create_track(pos(2), "b", ChannelConfig::Stereo).unwrap();
        ctl.arm(pos(1)).unwrap();
        ctl.play().unwrap();
        run(&mut rt, StereoSample::mono(0.1), 100);

        ctl.arm(pos(2)).unwrap();
        run(&mut rt, StereoSample::mono(0.2), 100);
        let report = ctl.sync();
        assert_eq!(report.captured, vec![pos(1)]);
        assert_eq!(ctl.armed(), Some(pos(2)));
        assert_eq!(rt.engine().armed(), Some(pos(2)));
        assert_in_step(&ctl, &rt, pos(1));
    }

    #[test]
    fn test_move_incompatible_is_atomic() {
        let (mut ctl, mut rt) = setup();
        ctl.set_track(pos(1), constant_track(ChannelConfig::Mono, 0.1)).unwrap();
        ctl.set_track(pos(2), constant_track(ChannelConfig::Stereo, 0.2)).unwrap();

        let err = ctl.move_track(pos(1), pos(2)).unwrap_err();
        assert!(matches!(err, TransportError::IncompatibleTrackConfig { .. }));
        quiet(&mut rt, 1);
        let lp = ctl.current_loop();
        assert_eq!(lp.track(pos(1)).unwrap().channel_config(), ChannelConfig::Mono);
        assert_eq!(lp.track(pos(2)).unwrap().channel_config(), ChannelConfig::Stereo);
        assert_in_step(&ctl, &rt, pos(1));
        assert_in_step(&ctl, &rt, pos(2));
    }

    #[test]
    fn test_move_into_empty_slot_and_solo_follows() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Stereo).unwrap();
        ctl.solo(pos(1)).unwrap();
        ctl.move_track(pos(1), pos(4)).unwrap();
        quiet(&mut rt, 1);

        assert!(ctl.current_loop().track(pos(1)).is_none());
        assert_eq!(ctl.solo_position(), Some(pos(4)));
        assert_eq!(rt.engine().solo(), Some(pos(4)));
        assert_in_step(&ctl, &rt, pos(1));
        assert_in_step(&ctl, &rt, pos(4));
    }

    #[test]
    fn test_move_from_empty_slot_swaps() {
        let (mut ctl, mut rt) = setup();
        let id = ctl.create_track(pos(3), "a", ChannelConfig::Mono).unwrap();
        ctl.move_track(pos(1), pos(3)).unwrap();
        quiet(&mut rt, 1);
        assert_eq!(ctl.current_loop().track(pos(1)).map(Track::id), Some(id));
        assert_in_step(&ctl, &rt, pos(1));
        assert_in_step(&ctl, &rt, pos(3));
    }

    #[test]
    fn test_reverse_reaches_engine_and_undoes() {
        let (mut ctl, mut rt) = setup();
        ctl.set_track(pos(1), ramp_track()).unwrap();
        ctl.toggle_reverse(pos(1)).unwrap();
        quiet(&mut rt, 1);

        let track = ctl.current_loop().track(pos(1)).unwrap();
        assert!(track.is_reversed());
        assert!((track.buffer().frame(0).left - 0.999).abs() < 1e-6);
        assert_in_step(&ctl, &rt, pos(1));

        ctl.undo(pos(1)).unwrap();
        quiet(&mut rt, 1);
        assert!(!ctl.current_loop().track(pos(1)).unwrap().is_reversed());
        assert_in_step(&ctl, &rt, pos(1));
    }

    #[test]
    fn test_effect_parameters_validated() {
        let (mut ctl, _rt) = setup();
        ctl.set_track(pos(1), ramp_track()).unwrap();
        assert!(matches!(
            ctl.set_pitch_modulation(pos(1), 25),
            Err(TransportError::InvalidParameter { .. })
        ));
        assert!(matches!(
            ctl.set_time_dilation(pos(1), f32::NAN),
            Err(TransportError::InvalidParameter { .. })
        ));
        let track = ctl.current_loop().track(pos(1)).unwrap();
        assert_eq!(track.pitch_modulation(), 0);
        assert!(!track.can_undo());
    }

    #[test]
    fn test_mix_changes_reach_engine() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Mono).unwrap();
        ctl.set_track_volume(pos(1), 0.5).unwrap();
        ctl.set_track_pan(pos(1), 1.0, 0.0).unwrap();
        quiet(&mut rt, 1);
        let mix = ctl.current_loop().track(pos(1)).unwrap().mix();
        assert_eq!(rt.engine().slot_mix(pos(1)), Some(mix));
        assert_eq!(mix.right_gain, 0.0);

        assert!(ctl.set_track_volume(pos(1), 1.5).is_err());
        assert_eq!(ctl.current_loop().track(pos(1)).unwrap().volume(), 0.5);

        ctl.set_track_balance(pos(1), 0.5).unwrap();
        let track = ctl.current_loop().track(pos(1)).unwrap();
        assert_eq!(track.left_gain(), 0.5);
        assert_eq!(track.right_gain(), 1.0);
    }

    #[test]
    fn test_mute_all_silences_output() {
        let (mut ctl, mut rt) = setup();
        ctl.set_track(pos(1), constant_track(ChannelConfig::Stereo, 0.3)).unwrap();
        ctl.set_track(pos(2), constant_track(ChannelConfig::Mono, 0.3)).unwrap();
        ctl.play().unwrap();
        ctl.mute_all().unwrap();
        let out = quiet(&mut rt, 64);
        assert!(out.iter().all(|s| *s == StereoSample::silence()));

        ctl.unmute_all().unwrap();
        let out = quiet(&mut rt, 64);
        assert!(out.iter().all(|s| (s.left - 0.6).abs() < 1e-6));
    }

    #[test]
    fn test_solo_toggles() {
        let (mut ctl, mut rt) = setup();
        ctl.set_track(pos(1), constant_track(ChannelConfig::Stereo, 0.3)).unwrap();
        ctl.set_track(pos(2), constant_track(ChannelConfig::Stereo, 0.1)).unwrap();
        ctl.play().unwrap();

        assert_eq!(ctl.solo(pos(2)).unwrap(), Some(pos(2)));
        let out = quiet(&mut rt, 4);
        assert!((out[0].left - 0.1).abs() < 1e-6);

        assert_eq!(ctl.solo(pos(2)).unwrap(), None);
        let out = quiet(&mut rt, 4);
        assert!((out[0].left - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_clear_track() {
        let (mut ctl, mut rt) = setup();
        let id = ctl.create_track(pos(5), "a", ChannelConfig::Stereo).unwrap();
        ctl.solo(pos(5)).unwrap();
        let removed = ctl.clear_track(pos(5)).unwrap();
        assert_eq!(removed.id(), id);
        assert_eq!(ctl.solo_position(), None);
        quiet(&mut rt, 1);
        assert!(rt.engine().slot_buffer(pos(5)).is_none());
        assert!(matches!(ctl.clear_track(pos(5)), Err(TransportError::EmptyTrackSlot(_))));
    }

    #[test]
    fn test_create_and_set_track() {
        let (mut ctl, _rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Stereo).unwrap();
        assert_eq!(
            ctl.create_track(pos(1), "b", ChannelConfig::Stereo),
            Err(TransportError::SlotOccupied(pos(1)))
        );

        let short = Track::new("short", ChannelConfig::Mono, LEN - 1);
        assert_eq!(
            ctl.set_track(pos(2), short).unwrap_err(),
            TransportError::TrackLengthMismatch { expected: LEN, actual: LEN - 1 }
        );

        let replaced = ctl.set_track(pos(1), ramp_track()).unwrap();
        assert_eq!(replaced.map(|t| t.name().to_string()), Some("a".to_string()));

        ctl.rename_track(pos(1), "lead").unwrap();
        assert_eq!(ctl.current_loop().track(pos(1)).unwrap().name(), "lead");
    }

    #[test]
    fn test_undo_depth_from_config() {
        let config = StationConfig {
            undo_depth: 1,
            ..test_config()
        };
        let (mut ctl, _rt) = TransportController::new(&config).unwrap();
        ctl.set_track(pos(1), ramp_track()).unwrap();
        ctl.toggle_reverse(pos(1)).unwrap();
        ctl.toggle_reverse(pos(1)).unwrap();
        assert!(ctl.undo(pos(1)).unwrap());
        assert!(!ctl.undo(pos(1)).unwrap());
    }

    #[test]
    fn test_scheduled_play_on_grid() {
        let (mut ctl, mut rt) = setup();
        quiet(&mut rt, 10);
        let id = ctl.schedule_on_grid(EventAction::Play, None).unwrap();
        assert_eq!(ctl.scheduled_events().next().map(|e| e.due_sample), Some(1000));

        quiet(&mut rt, 500);
        assert!(ctl.sync().fired.is_empty());
        assert_eq!(ctl.state(), TransportState::Stopped);

        quiet(&mut rt, 500);
        let report = ctl.sync();
        assert_eq!(report.fired, vec![id]);
        assert_eq!(ctl.state(), TransportState::Playing);
        assert_eq!(ctl.scheduled_events().count(), 0);
    }

    #[test]
    fn test_scheduled_record_start_and_stop() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(2), "a", ChannelConfig::Stereo).unwrap();
        ctl.play().unwrap();
        ctl.schedule(EventAction::RecordStart, Some(pos(2)), 100).unwrap();
        ctl.schedule(EventAction::RecordStop, None, 200).unwrap();

        run(&mut rt, StereoSample::mono(0.5), 100);
        run(&mut rt, StereoSample::mono(0.5), 100);
        let report = ctl.sync();
        assert_eq!(report.fired.len(), 2);
        assert_eq!(report.captured, vec![pos(2)]);
        assert_eq!(ctl.armed(), None);

        let buffer = ctl.current_loop().track(pos(2)).unwrap().buffer();
        assert_eq!(buffer.frame(50).left, 0.0);
        assert!((buffer.frame(150).left - 0.5).abs() < 1e-6);
        assert_in_step(&ctl, &rt, pos(2));
    }

    #[test]
    fn test_schedule_record_start_needs_track() {
        let (mut ctl, _rt) = setup();
        assert_eq!(
            ctl.schedule(EventAction::RecordStart, Some(pos(5)), 0),
            Err(TransportError::RecordingArmViolation {
                position: pos(5),
                reason: ArmViolation::EmptySlot
            })
        );
        assert!(matches!(
            ctl.schedule(EventAction::RecordStart, None, 0),
            Err(TransportError::InvalidParameter { .. })
        ));
        assert_eq!(ctl.scheduled_events().count(), 0);
    }

    #[test]
    fn test_take_discarded_after_racing_edit() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Mono).unwrap();
        ctl.play().unwrap();
        ctl.schedule(EventAction::RecordStart, Some(pos(1)), 0).unwrap();
        quiet(&mut rt, 10);
        run(&mut rt, StereoSample::mono(0.5), 100);
        ctl.schedule(EventAction::RecordStop, None, 0).unwrap();
        quiet(&mut rt, 1);

        // Not synced yet: the controller still sees an idle track
        ctl.toggle_reverse(pos(1)).unwrap();
        let report = ctl.sync();
        assert_eq!(report.discarded, 1);
        assert!(report.captured.is_empty());
        assert_eq!(ctl.armed(), None);

        quiet(&mut rt, 1);
        assert_in_step(&ctl, &rt, pos(1));
    }

    #[test]
    fn test_cancel_scheduled() {
        let (mut ctl, mut rt) = setup();
        ctl.schedule(EventAction::Play, None, 50).unwrap();
        ctl.cancel_scheduled().unwrap();
        quiet(&mut rt, 100);
        assert!(ctl.sync().fired.is_empty());
        assert_eq!(rt.engine().state(), TransportState::Stopped);
    }

    #[test]
    fn test_load_loop() {
        let (mut ctl, mut rt) = setup();
        ctl.schedule(EventAction::Play, None, 5000).unwrap();
        let first = ctl.current_loop().id();

        let mut next = Loop::new("next", LEN, 4000);
        next.set_track(pos(3), constant_track(ChannelConfig::Stereo, 0.5)).unwrap();
        let previous = ctl.load_loop(next).unwrap();
        assert_eq!(previous.id(), first);
        assert_eq!(ctl.scheduled_events().count(), 0);

        ctl.play().unwrap();
        let out = quiet(&mut rt, 8);
        assert_eq!(rt.engine().loop_id(), ctl.current_loop().id());
        assert_eq!(rt.engine().pending_events(), 0);
        assert!(out.iter().all(|s| (s.left - 0.5).abs() < 1e-6));
        assert_in_step(&ctl, &rt, pos(3));
    }

    #[test]
    fn test_load_loop_refused_while_recording() {
        let (mut ctl, _rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Stereo).unwrap();
        ctl.arm(pos(1)).unwrap();
        let before = ctl.current_loop().id();
        assert_eq!(ctl.new_loop("next").unwrap_err(), TransportError::armed(pos(1)));
        assert_eq!(ctl.current_loop().id(), before);

        let wrong_rate = Loop::new("x", LEN, 44100);
        ctl.disarm().unwrap();
        assert!(matches!(
            ctl.load_loop(wrong_rate),
            Err(TransportError::RecordingArmViolation { reason: ArmViolation::TakePending, .. })
        ));
    }

    #[test]
    fn test_full_command_queue_rejects_without_change() {
        let (mut ctl, _rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Stereo).unwrap();
        for i in 0..COMMAND_QUEUE_CAPACITY - 1 {
            ctl.set_track_mute(pos(1), i % 2 == 0).unwrap();
        }

        assert_eq!(ctl.set_track_volume(pos(1), 0.3), Err(TransportError::CommandQueueFull));
        assert_eq!(ctl.current_loop().track(pos(1)).unwrap().volume(), 1.0);
        assert_eq!(ctl.play(), Err(TransportError::CommandQueueFull));
        assert_eq!(ctl.state(), TransportState::Stopped);
        assert_eq!(ctl.toggle_reverse(pos(1)), Err(TransportError::CommandQueueFull));
        assert!(!ctl.current_loop().track(pos(1)).unwrap().is_reversed());
    }

    #[test]
    fn test_snapshot() {
        let (mut ctl, mut rt) = setup();
        ctl.create_track(pos(1), "a", ChannelConfig::Stereo).unwrap();
        ctl.play().unwrap();
        ctl.arm(pos(1)).unwrap();
        quiet(&mut rt, 300);

        let snap = ctl.snapshot();
        assert_eq!(snap.state, TransportState::Playing);
        assert_eq!(snap.armed, Some(pos(1)));
        assert_eq!(snap.playhead, 300);
        assert_eq!(snap.sample_index, 300);
        assert_eq!(snap.loop_length, LEN);
        assert_eq!(snap.xruns, 0);
    }
}
