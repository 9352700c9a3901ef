//! Serializable shape of a loop
//!
//! A [`LoopManifest`] carries everything about a loop except the audio
//! itself: identity, timing and each track's settings, plus an optional path
//! to the track's audio. [`save_loop`] and [`load_loop`] store a loop as a
//! directory holding `manifest.yaml` and one 32-bit float WAV file per
//! track.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::audio_file::{read_wav, write_wav_float};
use crate::buffer::SampleBuffer;
use crate::config::{read_yaml, write_yaml};
use crate::effect::TrackEffect;
use crate::error::TransportError;
use crate::loops::Loop;
use crate::track::{Track, TrackMix};
use crate::types::{ChannelConfig, LoopId, Position, TrackId};

/// File name of the manifest inside a saved loop directory
pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackManifest {
    pub position: Position,
    pub id: TrackId,
    pub name: String,
    pub channels: ChannelConfig,
    pub volume: f32,
    pub left_gain: f32,
    pub right_gain: f32,
    pub muted: bool,
    pub reversed: bool,
    pub pitch_modulation: i32,
    pub time_dilation: f32,
    /// Track audio, relative to the manifest's directory when saved by
    /// [`save_loop`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopManifest {
    pub id: LoopId,
    pub name: String,
    pub birth: DateTime<Local>,
    pub sample_rate: u32,
    pub length_frames: usize,
    /// Occupied positions only, in position order
    pub tracks: Vec<TrackManifest>,
}

impl TrackManifest {
    pub fn from_track(position: Position, track: &Track) -> Self {
        let mix = track.mix();
        Self {
            position,
            id: track.id(),
            name: track.name().to_string(),
            channels: track.channel_config(),
            volume: mix.volume,
            left_gain: mix.left_gain,
            right_gain: mix.right_gain,
            muted: mix.muted,
            reversed: track.is_reversed(),
            pitch_modulation: track.pitch_modulation(),
            time_dilation: track.time_dilation(),
            audio: None,
        }
    }

    /// Rebuild the track around `buffer`
    ///
    /// The buffer must already have the manifest's channel layout.
    pub fn to_track(&self, buffer: SampleBuffer) -> Result<Track, TransportError> {
        if buffer.config() != self.channels {
            return Err(TransportError::InvalidParameter {
                name: "track channel count",
                value: buffer.channels() as f64,
            });
        }
        let mut track = Track::from_buffer(self.name.clone(), buffer).with_id(self.id);
        track.set_volume(self.volume)?;
        for (name, gain) in [("left gain", self.left_gain), ("right gain", self.right_gain)] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(TransportError::InvalidParameter {
                    name,
                    value: gain as f64,
                });
            }
        }
        TrackEffect::PitchModulation(self.pitch_modulation).validate()?;
        TrackEffect::TimeDilation(self.time_dilation).validate()?;
        track.restore_mix(TrackMix {
            volume: self.volume,
            left_gain: self.left_gain,
            right_gain: self.right_gain,
            muted: self.muted,
        });
        track.restore_effect_state(self.reversed, self.pitch_modulation, self.time_dilation);
        Ok(track)
    }
}

impl LoopManifest {
    /// Describe `source` without audio paths
    pub fn from_loop(source: &Loop) -> Self {
        Self {
            id: source.id(),
            name: source.name().to_string(),
            birth: source.birth(),
            sample_rate: source.sample_rate(),
            length_frames: source.length_frames(),
            tracks: source
                .tracks()
                .map(|(position, track)| TrackManifest::from_track(position, track))
                .collect(),
        }
    }

    /// Rebuild the loop, asking `load_audio` for each track's buffer
    pub fn build_loop<F, E>(&self, mut load_audio: F) -> Result<Loop, E>
    where
        F: FnMut(&TrackManifest) -> Result<SampleBuffer, E>,
        E: From<TransportError>,
    {
        let mut rebuilt = Loop::new(self.name.clone(), self.length_frames, self.sample_rate)
            .with_identity(self.id, self.birth);
        for entry in &self.tracks {
            let buffer = load_audio(entry)?;
            let track = entry.to_track(buffer)?;
            if rebuilt.set_track(entry.position, track)?.is_some() {
                log::warn!(
                    "Manifest for {} lists position {} twice; keeping the last track",
                    self.id,
                    entry.position
                );
            }
        }
        Ok(rebuilt)
    }
}

impl Loop {
    pub fn manifest(&self) -> LoopManifest {
        LoopManifest::from_loop(self)
    }
}

/// Directory a loop is saved to under `root`
pub fn loop_dir(root: &Path, id: LoopId) -> PathBuf {
    root.join(id.to_string())
}

/// Save `source` under `root`, returning the manifest path
pub fn save_loop(source: &Loop, root: &Path) -> Result<PathBuf> {
    let dir = loop_dir(root, source.id());
    let mut manifest = source.manifest();
    for entry in &mut manifest.tracks {
        let Some(track) = source.track(entry.position) else {
            continue;
        };
        let file = PathBuf::from(format!("{}.wav", entry.id));
        write_wav_float(dir.join(&file), track.buffer(), source.sample_rate())
            .with_context(|| format!("Failed to write audio for {}", entry.id))?;
        entry.audio = Some(file);
    }

    let path = dir.join(MANIFEST_FILE);
    write_yaml(&manifest, &path)?;
    log::info!(
        "Saved {} '{}' ({} tracks) to {:?}",
        source.id(),
        source.name(),
        manifest.tracks.len(),
        dir
    );
    Ok(path)
}

/// Load a loop saved by [`save_loop`]
///
/// Tracks without an audio file come back silent.
pub fn load_loop(manifest_path: &Path) -> Result<Loop> {
    let manifest: LoopManifest = read_yaml(manifest_path).context("Failed to load loop manifest")?;
    let dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let loaded = manifest.build_loop(|entry| -> Result<SampleBuffer> {
        match &entry.audio {
            Some(file) => read_wav(
                dir.join(file),
                entry.channels,
                manifest.length_frames,
                manifest.sample_rate,
            )
            .with_context(|| format!("Failed to read audio for {}", entry.id)),
            None => Ok(SampleBuffer::silent(entry.channels, manifest.length_frames)),
        }
    })?;
    log::info!("Loaded {} '{}' from {:?}", loaded.id(), loaded.name(), dir);
    Ok(loaded)
}
