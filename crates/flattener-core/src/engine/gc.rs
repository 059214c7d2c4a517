//! Deferred deallocation for components swapped out on the audio thread
//!
//! Reconfiguration replaces the estimator or the lookahead feeder while
//! audio is running. The replaced component is wrapped in
//! `basedrop::Owned`, so dropping it on the audio thread only enqueues a
//! pointer; the memory is freed on the collector thread.
//!
//! ```ignore
//! use basedrop::Owned;
//! use crate::engine::gc::gc_handle;
//!
//! let estimator = Owned::new(&gc_handle(), PitchEstimator::build(...));
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle, initialised on first use
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Collection cadence; reclamation is not latency sensitive
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("flattener-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::info!("GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned {
        Ok(_) => match rx.recv() {
            Ok(handle) => return handle,
            Err(e) => log::error!("GC thread did not report a handle: {}", e),
        },
        Err(e) => log::error!("Failed to spawn GC thread: {}", e),
    }

    // Without a collector thread, deferred drops are never reclaimed.
    // Swaps are rare, so the leak is bounded by the number of reconfigurations.
    let collector = Collector::new();
    let handle = collector.handle();
    std::mem::forget(collector);
    handle
}

/// Handle for allocating `Owned<T>` / `Shared<T>` values
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;

    #[test]
    fn test_owned_drop_is_deferred() {
        let value = Owned::new(&gc_handle(), vec![0.0f32; 4096]);
        assert_eq!(value.len(), 4096);
        drop(value);
    }

    #[test]
    fn test_handle_is_shared() {
        let a = gc_handle();
        let b = gc_handle();
        drop(Owned::new(&a, 1u32));
        drop(Owned::new(&b, 2u32));
    }
}
