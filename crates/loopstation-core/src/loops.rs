//! Loop model - six track positions sharing one length
//!
//! This is the controller-side, authoritative copy of a loop. The engine
//! plays from its own copies of the track buffers, which the controller keeps
//! in step by sending replacements.

use chrono::{DateTime, Local};

use crate::error::{TransportError, TransportResult};
use crate::track::Track;
use crate::types::{ChannelConfig, LoopId, Position, NUM_POSITIONS};

/// Display name given to loops created without one
pub const DEFAULT_LOOP_NAME: &str = "New Loop";

#[derive(Debug, Clone)]
pub struct Loop {
    id: LoopId,
    name: String,
    birth: DateTime<Local>,
    sample_rate: u32,
    length_frames: usize,
    tracks: [Option<Track>; NUM_POSITIONS],
}

impl Loop {
    /// Empty loop of `length_frames` frames
    pub fn new(name: impl Into<String>, length_frames: usize, sample_rate: u32) -> Self {
        Self {
            id: LoopId::generate(),
            name: name.into(),
            birth: Local::now(),
            sample_rate,
            length_frames,
            tracks: Default::default(),
        }
    }

    /// Keep identity from a saved manifest
    pub fn with_identity(mut self, id: LoopId, birth: DateTime<Local>) -> Self {
        self.id = id;
        self.birth = birth;
        self
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn birth(&self) -> DateTime<Local> {
        self.birth
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn length_frames(&self) -> usize {
        self.length_frames
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(Option::is_none)
    }

    pub fn track(&self, position: Position) -> Option<&Track> {
        self.tracks[position.index()].as_ref()
    }

    pub fn track_mut(&mut self, position: Position) -> Option<&mut Track> {
        self.tracks[position.index()].as_mut()
    }

    /// Occupied positions with their tracks, in position order
    pub fn tracks(&self) -> impl Iterator<Item = (Position, &Track)> {
        Position::ALL
            .into_iter()
            .zip(self.tracks.iter())
            .filter_map(|(pos, slot)| slot.as_ref().map(|t| (pos, t)))
    }

    /// Silent track sized to this loop
    pub fn new_track(&self, name: impl Into<String>, config: ChannelConfig) -> Track {
        Track::new(name, config, self.length_frames)
    }

    /// Put a track at `position`, returning whatever was there
    pub fn set_track(&mut self, position: Position, track: Track) -> TransportResult<Option<Track>> {
        if track.frames() != self.length_frames {
            return Err(TransportError::TrackLengthMismatch {
                expected: self.length_frames,
                actual: track.frames(),
            });
        }
        Ok(self.tracks[position.index()].replace(track))
    }

    pub fn remove_track(&mut self, position: Position) -> Option<Track> {
        self.tracks[position.index()].take()
    }

    /// Check that `move_track(from, to)` would succeed, without moving
    pub fn check_move(&self, from: Position, to: Position) -> TransportResult<()> {
        let from_config = self.track(from).map(Track::channel_config);
        let to_config = self.track(to).map(Track::channel_config);
        match (from_config, to_config) {
            (Some(from_config), Some(to_config)) if from_config != to_config => {
                Err(TransportError::IncompatibleTrackConfig {
                    from,
                    to,
                    from_config,
                    to_config,
                })
            }
            _ => Ok(()),
        }
    }

    /// Swap the contents of `from` and `to`
    ///
    /// If either position is empty the swap always succeeds, so this both
    /// moves a track into a free position and pulls one out of an occupied
    /// one. Two occupied positions swap only when their tracks share a
    /// channel layout.
    pub fn move_track(&mut self, from: Position, to: Position) -> TransportResult<()> {
        self.check_move(from, to)?;
        self.tracks.swap(from.index(), to.index());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(n: u8) -> Position {
        Position::new(n).unwrap()
    }

    #[test]
    fn test_new_loop_is_empty() {
        let lp = Loop::new(DEFAULT_LOOP_NAME, 1000, 48000);
        assert!(lp.is_empty());
        assert_eq!(lp.name(), "New Loop");
        assert_eq!(lp.length_frames(), 1000);
        assert_eq!(lp.tracks().count(), 0);
    }

    #[test]
    fn test_set_track_checks_length() {
        let mut lp = Loop::new("l", 1000, 48000);
        let wrong = Track::new("t", ChannelConfig::Mono, 999);
        assert!(matches!(
            lp.set_track(pos(1), wrong),
            Err(TransportError::TrackLengthMismatch { expected: 1000, actual: 999 })
        ));
        let track = lp.new_track("t", ChannelConfig::Mono);
        assert!(lp.set_track(pos(1), track).unwrap().is_none());
        assert!(!lp.is_empty());
    }

    #[test]
    fn test_move_into_empty_slot() {
        let mut lp = Loop::new("l", 10, 48000);
        let track = lp.new_track("a", ChannelConfig::Stereo);
        let id = track.id();
        lp.set_track(pos(1), track).unwrap();

        lp.move_track(pos(1), pos(4)).unwrap();
        assert!(lp.track(pos(1)).is_none());
        assert_eq!(lp.track(pos(4)).map(Track::id), Some(id));
    }

    #[test]
    fn test_move_swaps_matching_configs() {
        let mut lp = Loop::new("l", 10, 48000);
        let a = lp.new_track("a", ChannelConfig::Stereo);
        let b = lp.new_track("b", ChannelConfig::Stereo);
        let (ida, idb) = (a.id(), b.id());
        lp.set_track(pos(2), a).unwrap();
        lp.set_track(pos(5), b).unwrap();

        lp.move_track(pos(2), pos(5)).unwrap();
        assert_eq!(lp.track(pos(2)).map(Track::id), Some(idb));
        assert_eq!(lp.track(pos(5)).map(Track::id), Some(ida));
    }

    #[test]
    fn test_move_rejects_mismatched_configs() {
        let mut lp = Loop::new("l", 10, 48000);
        let a = lp.new_track("a", ChannelConfig::Mono);
        let b = lp.new_track("b", ChannelConfig::Stereo);
        lp.set_track(pos(1), a).unwrap();
        lp.set_track(pos(2), b).unwrap();

        let err = lp.move_track(pos(1), pos(2)).unwrap_err();
        assert!(matches!(err, TransportError::IncompatibleTrackConfig { .. }));
        assert_eq!(lp.track(pos(1)).map(Track::channel_config), Some(ChannelConfig::Mono));
    }

    #[test]
    fn test_move_from_empty_slot_pulls_track() {
        let mut lp = Loop::new("l", 10, 48000);
        let track = lp.new_track("a", ChannelConfig::Mono);
        let id = track.id();
        lp.set_track(pos(1), track).unwrap();

        lp.move_track(pos(3), pos(1)).unwrap();
        assert!(lp.track(pos(1)).is_none());
        assert_eq!(lp.track(pos(3)).map(Track::id), Some(id));

        // Both empty is a no-op
        assert!(lp.move_track(pos(5), pos(6)).is_ok());
    }
}
