//! cpal duplex host
//!
//! ```text
//! ┌──────────────────┐  push()   ┌─────────────────────┐  pop()   ┌──────────────────────┐
//! │  Input Stream    │──────────►│   Capture Ring      │─────────►│  Output Stream       │
//! │  (device thread) │           │  (lock-free SPSC)   │          │  (owns FlattenEngine)│
//! └──────────────────┘           └─────────────────────┘          └──────────┬───────────┘
//!                                                                            │ Relaxed atomics
//! ┌──────────────────┐  params / EngineCommand queue                          ▼
//! │  Console Thread  │────────────────────────────────────────►  FlattenAtomics (telemetry)
//! │ (FlattenController)
//! └──────────────────┘
//! ```
//!
//! The two streams run on independent device threads. The capture ring is
//! primed with one buffer of silence so the output side normally finds a
//! full buffer waiting; when it does not, the missing frames are silence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};

use flattener_core::{flatten_engine, FlattenController, FlattenEngine, FlattenerConfig, PitchShifter, SignalsmithShifter};
use flattener_core::{StereoBuffer, StereoSample};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{find_device, Direction};
use super::error::{AudioError, AudioResult};

/// Ring capacity in host buffers; absorbs scheduling jitter between streams
const CAPTURE_RING_BUFFERS: usize = 4;

/// Dropped or missing frame counters shared with the console
#[derive(Debug, Default)]
pub struct StreamCounters {
    /// Input callbacks that found the capture ring full
    pub overflows: AtomicU64,
    /// Output callbacks that found the capture ring short
    pub underruns: AtomicU64,
}

/// Keeps both streams alive. Drop to stop audio.
pub struct AudioHandle {
    _input_stream: Stream,
    _output_stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
    counters: Arc<StreamCounters>,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Buffering latency of one host buffer plus the capture ring priming
    pub fn latency_ms(&self) -> f32 {
        (2 * self.buffer_size) as f32 / self.sample_rate as f32 * 1000.0
    }

    pub fn counters(&self) -> &Arc<StreamCounters> {
        &self.counters
    }
}

/// Result of starting the host: the streams and the engine's control handle
pub struct AudioSystem {
    pub handle: AudioHandle,
    pub controller: FlattenController,
}

/// Input callback state: deinterleave to stereo and push into the ring
pub(crate) struct CaptureState {
    producer: rtrb::Producer<StereoSample>,
    counters: Arc<StreamCounters>,
}

impl CaptureState {
    pub(crate) fn new(producer: rtrb::Producer<StereoSample>, counters: Arc<StreamCounters>) -> Self {
        Self { producer, counters }
    }

    /// Mono input is duplicated to both channels; channels past two are ignored
    pub(crate) fn capture(&mut self, data: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in data.chunks_exact(channels) {
            let sample = if channels == 1 {
                StereoSample::mono(frame[0])
            } else {
                StereoSample::new(frame[0], frame[1])
            };
            if self.producer.push(sample).is_err() {
                // Output side stalled; drop the rest of this buffer
                self.counters.overflows.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
}

/// Output callback state: owns the engine
pub(crate) struct RenderState<S: PitchShifter> {
    engine: FlattenEngine<S>,
    consumer: rtrb::Consumer<StereoSample>,
    /// Pre-allocated working buffer
    buffer: StereoBuffer,
    counters: Arc<StreamCounters>,
}

impl<S: PitchShifter> RenderState<S> {
    pub(crate) fn new(
        engine: FlattenEngine<S>,
        consumer: rtrb::Consumer<StereoSample>,
        counters: Arc<StreamCounters>,
    ) -> Self {
        Self {
            engine,
            consumer,
            buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            counters,
        }
    }

    /// Pull captured frames, flatten them and interleave into `data`
    pub(crate) fn render(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for chunk in data.chunks_mut(channels * MAX_BUFFER_SIZE) {
            let n_frames = chunk.len() / channels;
            // RT-safe: the buffer never grows past its initial capacity
            self.buffer.set_len_from_capacity(n_frames);

            let mut short = false;
            for frame in self.buffer.as_mut_slice() {
                *frame = match self.consumer.pop() {
                    Ok(sample) => sample,
                    Err(_) => {
                        short = true;
                        StereoSample::silence()
                    }
                };
            }
            if short {
                self.counters.underruns.fetch_add(1, Ordering::Relaxed);
            }

            self.engine.process(self.buffer.as_mut_slice());

            if channels == 2 {
                chunk[..n_frames * 2].copy_from_slice(self.buffer.as_interleaved());
                continue;
            }
            for (out, sample) in chunk.chunks_mut(channels).zip(self.buffer.as_slice()) {
                if channels == 1 {
                    out[0] = sample.to_mono();
                    continue;
                }
                out[0] = sample.left;
                out[1] = sample.right;
                for ch in out.iter_mut().skip(2) {
                    *ch = 0.0;
                }
            }
        }
    }
}

/// Open both devices, build the engine and start streaming
pub fn start_duplex(audio: &AudioConfig, flattener: &FlattenerConfig) -> AudioResult<AudioSystem> {
    let input_device = find_device(audio.input_device.as_deref(), Direction::Input)?;
    let output_device = find_device(audio.output_device.as_deref(), Direction::Output)?;
    log::info!(
        "Input device: {}, output device: {}",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string()),
        output_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let output_ranges: Vec<_> = output_device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();
    let input_ranges: Vec<_> = input_device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    // The output device picks the rate; the input device has to follow
    let (output_range, sample_rate) = pick_config(&output_ranges, audio.target_sample_rate(), 2)
        .ok_or_else(|| AudioError::ConfigError("No usable f32 output configuration".to_string()))?;
    let (input_range, input_rate) = pick_config(&input_ranges, sample_rate, 1)
        .ok_or_else(|| AudioError::ConfigError("No usable f32 input configuration".to_string()))?;
    if input_rate != sample_rate {
        return Err(AudioError::SampleRateMismatch {
            input: input_rate,
            output: sample_rate,
        });
    }

    let buffer_size = audio.buffer_size.frames();
    let output_config = StreamConfig {
        channels: output_range.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let input_config = StreamConfig {
        channels: input_range.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    log::info!(
        "Audio config: {}Hz, {} frames (~{:.1}ms), {} in / {} out channels",
        sample_rate,
        buffer_size,
        audio.buffer_size.latency_ms(sample_rate),
        input_config.channels,
        output_config.channels
    );

    let max_block = buffer_size as usize;
    let shifter = SignalsmithShifter::new(sample_rate, max_block);
    let (engine, controller) = flatten_engine(flattener, sample_rate, max_block, shifter)?;

    let counters = Arc::new(StreamCounters::default());
    let (mut producer, consumer) = rtrb::RingBuffer::<StereoSample>::new(max_block * CAPTURE_RING_BUFFERS);
    for _ in 0..max_block {
        // Capacity is larger than one buffer, so priming cannot fail
        let _ = producer.push(StereoSample::silence());
    }

    let mut capture = CaptureState::new(producer, Arc::clone(&counters));
    let input_channels = input_config.channels as usize;
    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| capture.capture(data, input_channels),
            move |err| log::error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Input: {}", e)))?;

    let mut render = RenderState::new(engine, consumer, Arc::clone(&counters));
    let output_channels = output_config.channels as usize;
    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| render.render(data, output_channels),
            move |err| log::error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Output: {}", e)))?;

    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;
    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    log::info!("Duplex streams started");

    Ok(AudioSystem {
        handle: AudioHandle {
            _input_stream: input_stream,
            _output_stream: output_stream,
            sample_rate,
            buffer_size,
            counters,
        },
        controller,
    })
}

/// Choose an f32 configuration with at least `min_channels`
///
/// Prefers one that supports `target_rate`; otherwise falls back to the
/// first f32 range at its maximum rate.
fn pick_config(
    ranges: &[SupportedStreamConfigRange],
    target_rate: u32,
    min_channels: u16,
) -> Option<(SupportedStreamConfigRange, u32)> {
    let usable = || {
        ranges
            .iter()
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .filter(move |c| c.channels() >= min_channels)
    };

    if let Some(range) = usable().find(|c| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate)) {
        return Some((range.clone(), target_rate));
    }

    let fallback = usable().next()?;
    let rate = fallback.max_sample_rate().0;
    log::warn!("Device doesn't support {}Hz, falling back to {}Hz", target_rate, rate);
    Some((fallback.clone(), rate))
}
