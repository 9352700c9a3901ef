//! RT-safe deferred deallocation for track buffers
//!
//! Every `SampleBuffer` handed to the audio thread is wrapped in
//! `basedrop::Owned`. When the engine replaces or clears a buffer, dropping
//! the old `Owned` only enqueues a pointer; the memory is freed later on the
//! `audio-gc` thread, away from the callback.
//!
//! ```ignore
//! use basedrop::Owned;
//! use crate::engine::gc::gc_handle;
//!
//! let buffer = Owned::new(&gc_handle(), SampleBuffer::silent(ChannelConfig::Stereo, 96000));
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread reclaims queued buffers
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // Collector is !Sync, so it is created and kept on its own thread
    thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Handle for wrapping buffers in `Owned<T>` before sending them to the engine
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
