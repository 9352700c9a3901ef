//! Loop session - record a take on the default audio devices
//!
//! Creates a loop, arms position 1 and records while the loop plays for a
//! number of passes, then saves the loop (manifest plus WAV files) to the
//! recordings directory.
//!
//! ## Usage
//!
//! `loop-session [passes] [--mono]` (default: 2 passes, stereo track)

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use loopstation_core::audio::start_audio_system;
use loopstation_core::config::{
    default_config_path, default_recordings_dir, load_config, write_yaml, StationConfig,
};
use loopstation_core::manifest::save_loop;
use loopstation_core::{ChannelConfig, Position, TransportController};

/// How often the controller collects engine feedback
const SYNC_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the engine to hand back the recorded take
const TAKE_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mono = args.iter().any(|arg| arg == "--mono");
    let passes: u64 = match args.iter().find(|arg| !arg.starts_with("--")) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid pass count: {}", raw))?,
        None => 2,
    };

    let config_path = default_config_path();
    let config: StationConfig = load_config(&config_path);
    if !config_path.exists() {
        write_yaml(&config, &config_path)?;
    }
    config.validate().context("Invalid station configuration")?;

    let (mut controller, runtime) = TransportController::new(&config)?;
    let audio = start_audio_system(&config.audio, config.sample_rate, runtime)
        .context("Failed to start audio")?;
    log::info!(
        "Audio running at {}Hz, {} frame buffers (~{:.1}ms)",
        audio.sample_rate,
        audio.buffer_size,
        audio.latency_ms
    );

    let position = Position::new(1)?;
    let channels = if mono {
        ChannelConfig::Mono
    } else {
        ChannelConfig::Stereo
    };
    controller.create_track(position, "Take 1", channels)?;
    controller.arm(position)?;
    controller.play()?;

    let loop_length = controller.current_loop().length_frames() as u64;
    let start = controller.atomics().sample_index();
    let end = start + passes * loop_length;
    log::info!(
        "Recording {} pass(es) of {:.2}s",
        passes,
        loop_length as f64 / config.sample_rate as f64
    );

    while controller.atomics().sample_index() < end {
        thread::sleep(SYNC_INTERVAL);
        let report = controller.sync();
        for (id, reason) in report.rejected {
            log::warn!("Event {} rejected: {:?}", id, reason);
        }
    }

    controller.disarm()?;
    let deadline = Instant::now() + TAKE_TIMEOUT;
    while controller.has_pending_takes() {
        if Instant::now() > deadline {
            bail!("Engine did not hand back the recorded take");
        }
        thread::sleep(SYNC_INTERVAL);
        controller.sync();
    }
    controller.stop()?;

    let snapshot = controller.snapshot();
    if snapshot.xruns > 0 {
        log::warn!("{} block(s) lost to xruns during the session", snapshot.xruns);
    }

    let saved = save_loop(controller.current_loop(), &default_recordings_dir())?;
    println!("Saved loop to {}", saved.display());
    Ok(())
}
