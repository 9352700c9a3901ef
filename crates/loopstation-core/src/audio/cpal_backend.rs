//! CPAL duplex backend
//!
//! cpal opens capture and playback as two independent streams, so the input
//! callback hands frames to the output callback through a lock-free ring:
//!
//! ```text
//! ┌──────────────────┐   push()   ┌─────────────────────┐
//! │   Input Stream   │───────────►│  Input Sample Ring  │
//! │  (capture only)  │            │  (SPSC, 4 blocks)   │
//! └──────────────────┘            └──────────┬──────────┘
//!                                            │ pop()
//! ┌──────────────────┐   push()   ┌──────────▼──────────┐
//! │    Controller    │───────────►│    Output Stream    │
//! │                  │  commands  │ (owns EngineRuntime)│
//! └────────▲─────────┘            └──────────┬──────────┘
//!          │ Relaxed atomics                 │
//!          └─────────────────────────────────┘
//! ```
//!
//! The output callback owns the engine outright; nothing on the audio path
//! takes a lock.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig, StreamInstant};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::engine::{CallbackTiming, EngineRuntime, StreamStatus};
use crate::types::{StereoBuffer, StereoSample};

/// Blocks of input the ring can hold before capture overflows
const INPUT_RING_BLOCKS: usize = 4;

/// Keeps both streams alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _input_stream: Stream,
    _output_stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Round-trip latency in milliseconds (input cushion plus output buffer)
    pub fn latency_ms(&self) -> f32 {
        (2.0 * self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Drop to stop audio
    pub handle: CpalAudioHandle,
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// Round-trip latency in milliseconds
    pub latency_ms: f32,
}

/// Conditions raised by the stream callbacks for the next engine block
#[derive(Default)]
struct StreamFlags {
    /// Input ring was full; captured frames were dropped
    input_overflow: AtomicBool,
    /// cpal reported a stream error
    stream_error: AtomicBool,
    /// Capture-to-callback delay of the last input block, in microseconds
    capture_latency_us: AtomicU32,
}

/// Open the duplex streams and move `runtime` into the output callback
///
/// Both devices must run at `sample_rate`, the rate the transport clock was
/// built with.
pub fn start_audio_system(
    config: &AudioConfig,
    sample_rate: u32,
    runtime: EngineRuntime,
) -> AudioResult<AudioSystemResult> {
    let input_device = resolve_device(config.input_device.as_ref(), Direction::Input)?;
    let output_device = resolve_device(config.output_device.as_ref(), Direction::Output)?;

    log::info!(
        "Input device: {}",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    log::info!(
        "Output device: {}",
        output_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let buffer_size = config.buffer_size.frames();
    let input_config = get_stream_config(&input_device, Direction::Input, sample_rate, buffer_size)?;
    let output_config =
        get_stream_config(&output_device, Direction::Output, sample_rate, buffer_size)?;

    log::info!(
        "Audio config: {} in / {} out channels, {}Hz, {} frames (~{:.1}ms per buffer)",
        input_config.channels,
        output_config.channels,
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate)
    );

    let ring_capacity = buffer_size as usize * INPUT_RING_BLOCKS;
    let (mut input_tx, input_rx) = rtrb::RingBuffer::<StereoSample>::new(ring_capacity);
    // One block of silence so the output side does not underflow while the
    // two streams settle
    for _ in 0..buffer_size {
        if input_tx.push(StereoSample::silence()).is_err() {
            break;
        }
    }
    log::debug!("Input ring created with capacity {} frames", ring_capacity);

    let flags = Arc::new(StreamFlags::default());
    let state = DuplexCallbackState::new(runtime, input_rx, Arc::clone(&flags), sample_rate);

    let input_stream = build_input_stream(&input_device, &input_config, input_tx, Arc::clone(&flags))?;
    let output_stream = build_output_stream(&output_device, &output_config, state, flags)?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamStart {
            direction: Direction::Input,
            reason: e.to_string(),
        })?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamStart {
            direction: Direction::Output,
            reason: e.to_string(),
        })?;

    log::info!("Audio streams started");

    let handle = CpalAudioHandle {
        _input_stream: input_stream,
        _output_stream: output_stream,
        sample_rate,
        buffer_size,
    };
    let latency_ms = handle.latency_ms();

    Ok(AudioSystemResult {
        handle,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Pick an f32 configuration running at `sample_rate`
fn get_stream_config(
    device: &cpal::Device,
    direction: Direction,
    sample_rate: u32,
    buffer_size: u32,
) -> AudioResult<StreamConfig> {
    let query_failed = |e: cpal::SupportedStreamConfigsError| AudioError::DeviceQuery {
        direction,
        reason: e.to_string(),
    };
    let supported: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device.supported_input_configs().map_err(query_failed)?.collect(),
        Direction::Output => device.supported_output_configs().map_err(query_failed)?.collect(),
    };

    let float: Vec<_> = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();
    if float.is_empty() {
        let offered = supported
            .first()
            .map(|c| format!("{:?}", c.sample_format()))
            .unwrap_or_else(|| "none".to_string());
        return Err(AudioError::NoFloatFormat { direction, offered });
    }

    let in_range = |c: &&&cpal::SupportedStreamConfigRange| {
        sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0
    };

    // Stereo preferred, mono accepted
    let best = float
        .iter()
        .filter(in_range)
        .find(|c| c.channels() == 2)
        .or_else(|| float.iter().filter(in_range).find(|c| c.channels() >= 2))
        .or_else(|| float.iter().find(|c| in_range(c)))
        .ok_or_else(|| AudioError::SampleRateMismatch {
            requested: sample_rate,
            device: float.iter().map(|c| c.max_sample_rate().0).max().unwrap_or(0),
            direction,
        })?;

    Ok(StreamConfig {
        channels: best.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    })
}

fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut input_tx: rtrb::Producer<StereoSample>,
    flags: Arc<StreamFlags>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let error_flags = Arc::clone(&flags);

    device
        .build_input_stream(
            config,
            move |data: &[f32], info: &cpal::InputCallbackInfo| {
                let ts = info.timestamp();
                if let Some(delay) = ts.callback.duration_since(&ts.capture) {
                    flags
                        .capture_latency_us
                        .store(delay.as_micros() as u32, Ordering::Relaxed);
                }
                for frame in data.chunks(channels) {
                    let sample = match frame {
                        [left, right, ..] => StereoSample::new(*left, *right),
                        [mono] => StereoSample::mono(*mono),
                        [] => continue,
                    };
                    if input_tx.push(sample).is_err() {
                        flags.input_overflow.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Input audio stream error: {}", err);
                error_flags.stream_error.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| AudioError::StreamOpen {
            direction: Direction::Input,
            reason: e.to_string(),
        })
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: DuplexCallbackState,
    flags: Arc<StreamFlags>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                state.process(data, channels, info);
            },
            move |err| {
                log::error!("Output audio stream error: {}", err);
                flags.stream_error.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| AudioError::StreamOpen {
            direction: Direction::Output,
            reason: e.to_string(),
        })
}

/// Everything the output callback owns
struct DuplexCallbackState {
    runtime: EngineRuntime,
    input_rx: rtrb::Consumer<StereoSample>,
    flags: Arc<StreamFlags>,
    sample_rate: u32,
    /// Pre-allocated engine input block
    input_block: StereoBuffer,
    /// Pre-allocated engine output block
    output_block: StereoBuffer,
    /// Instant of the first callback; stream times are measured from here
    origin: Option<StreamInstant>,
}

impl DuplexCallbackState {
    fn new(
        runtime: EngineRuntime,
        input_rx: rtrb::Consumer<StereoSample>,
        flags: Arc<StreamFlags>,
        sample_rate: u32,
    ) -> Self {
        Self {
            runtime,
            input_rx,
            flags,
            sample_rate,
            input_block: StereoBuffer::silence(MAX_BUFFER_SIZE),
            output_block: StereoBuffer::silence(MAX_BUFFER_SIZE),
            origin: None,
        }
    }

    fn timing(&mut self, info: &cpal::OutputCallbackInfo) -> CallbackTiming {
        let ts = info.timestamp();
        let origin = *self.origin.get_or_insert(ts.callback);
        let secs = |t: &StreamInstant| t.duration_since(&origin).map_or(0.0, |d| d.as_secs_f64());
        let current_time = secs(&ts.callback);
        let capture_latency =
            self.flags.capture_latency_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        CallbackTiming {
            current_time,
            input_adc_time: (current_time - capture_latency).max(0.0),
            output_dac_time: secs(&ts.playback),
        }
    }

    /// Render one device callback, splitting it into engine-sized blocks
    fn process(&mut self, data: &mut [f32], channels: usize, info: &cpal::OutputCallbackInfo) {
        if channels == 0 {
            return;
        }
        let mut timing = self.timing(info);

        for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
            let n_frames = chunk.len() / channels;
            self.input_block.set_len_from_capacity(n_frames);
            self.output_block.set_len_from_capacity(n_frames);

            let mut status = StreamStatus::empty();
            if self.flags.input_overflow.swap(false, Ordering::Relaxed) {
                status |= StreamStatus::INPUT_OVERFLOW;
            }
            if self.flags.stream_error.swap(false, Ordering::Relaxed) {
                status |= StreamStatus::STREAM_ERROR;
            }

            let mut received = 0;
            for sample in self.input_block.as_mut_slice() {
                match self.input_rx.pop() {
                    Ok(s) => {
                        *sample = s;
                        received += 1;
                    }
                    Err(_) => *sample = StereoSample::silence(),
                }
            }
            if received < n_frames {
                status |= StreamStatus::INPUT_UNDERFLOW;
            }

            self.runtime.process(
                self.input_block.as_slice(),
                self.output_block.as_mut_slice(),
                n_frames,
                &timing,
                status,
            );

            let samples = self.output_block.as_slice();
            for (frame, sample) in chunk.chunks_mut(channels).zip(samples) {
                frame[0] = sample.left;
                if channels > 1 {
                    frame[1] = sample.right;
                }
                for ch in frame.iter_mut().skip(2) {
                    *ch = 0.0;
                }
            }

            let advance = n_frames as f64 / self.sample_rate as f64;
            timing.current_time += advance;
            timing.input_adc_time += advance;
            timing.output_dac_time += advance;
        }
    }
}
