//! Reconfiguration commands for the audio thread
//!
//! Components that need allocation to change (the estimator, the lookahead
//! ring) are rebuilt on the control thread and handed over through an
//! `rtrb` SPSC queue. The engine drains the queue at the start of each
//! block and swaps the new component in; the replaced one is dropped
//! through the basedrop collector.
//!
//! ```ignore
//! let (tx, rx) = command_channel();
//! tx.push(EngineCommand::SwapFeeder(Owned::new(&gc_handle(), feeder)))?;
//! ```

use basedrop::Owned;

use super::lookahead::LookaheadFeeder;
use crate::detection::PitchEstimator;

/// Commands sent from the control thread to the engine
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Component swaps
    // ─────────────────────────────────────────────────────────────
    /// Replace the pitch estimator (algorithm switch, DIO retune)
    ///
    /// Restarts warm-up and, for DIO, the prebuffer.
    SwapEstimator(Owned<PitchEstimator>),
    /// Replace the lookahead feeder (lookahead multiplier change)
    SwapFeeder(Owned<LookaheadFeeder>),
}

/// Queue capacity; swaps are rare, so this only absorbs bursts
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Create a command channel: the producer goes to the control thread,
/// the consumer to the engine
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc::gc_handle;

    #[test]
    fn test_command_channel_delivers_in_order() {
        let (mut tx, mut rx) = command_channel();
        let feeder = LookaheadFeeder::new(256, 3.0, 0);
        assert!(tx.push(EngineCommand::SwapFeeder(Owned::new(&gc_handle(), feeder))).is_ok());

        match rx.pop() {
            Ok(EngineCommand::SwapFeeder(feeder)) => assert_eq!(feeder.lookahead(), 768),
            _ => panic!("expected SwapFeeder"),
        }
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_channel_capacity() {
        let (mut tx, _rx) = command_channel();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            let feeder = LookaheadFeeder::new(16, 1.0, 0);
            assert!(tx.push(EngineCommand::SwapFeeder(Owned::new(&gc_handle(), feeder))).is_ok());
        }
        let feeder = LookaheadFeeder::new(16, 1.0, 0);
        assert!(tx.push(EngineCommand::SwapFeeder(Owned::new(&gc_handle(), feeder))).is_err());
    }

    #[test]
    fn test_command_size() {
        // Components are behind Owned pointers, so the enum stays two words
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 16, "EngineCommand is {} bytes, expected <= 16", size);
    }
}
