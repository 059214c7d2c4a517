//! Pitch Flattener - live duplex host
//!
//! Captures from an input device, flattens the pitch towards the target
//! and plays the result. It:
//! 1. Loads the host configuration and seeds the factory presets
//! 2. Opens the cpal input and output streams around a `FlattenEngine`
//! 3. Runs the control console on stdin while a background thread logs
//!    telemetry
//!
//! ## Command line flags
//!
//! - `--list-devices`: print the available audio devices and exit
//! - `--no-save`: do not write the configuration back on exit

mod audio;
mod config;
mod console;

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

use flattener_core::config::{default_presets_dir, load_config, save_config, PresetStore};
use flattener_core::engine::FlattenAtomics;

use audio::{list_devices, start_duplex, AudioSystem, StreamCounters};
use config::{live_config_path, LiveConfig};
use console::{parse_command, status_line, Console, Flow};

/// Interval between telemetry log lines
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let list_only = args.iter().any(|arg| arg == "--list-devices");
    let no_save = args.iter().any(|arg| arg == "--no-save");

    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if list_only {
        for device in list_devices() {
            println!("{}", device);
        }
        return Ok(());
    }

    log::info!("pitch-flattener starting up");

    let config_path = live_config_path();
    let mut live: LiveConfig = load_config(&config_path);

    let presets = PresetStore::new(default_presets_dir());
    if let Err(e) = presets.ensure_factory_defaults() {
        log::warn!("Could not write factory presets to {:?}: {}", presets.root(), e);
    }

    let AudioSystem { handle, mut controller } =
        start_duplex(&live.audio, &live.flattener).context("Failed to start audio")?;

    println!(
        "Pitch Flattener running: {}Hz, {} frames (~{:.1}ms buffering)",
        handle.sample_rate(),
        handle.buffer_size(),
        handle.latency_ms()
    );
    println!("Type 'help' for commands.");

    let stop = Arc::new(AtomicBool::new(false));
    let logger = spawn_telemetry_logger(controller.atomics(), Arc::clone(handle.counters()), Arc::clone(&stop))
        .context("Failed to start telemetry thread")?;

    let mut console = Console {
        controller: &mut controller,
        presets: &presets,
        last_preset: live.last_preset.take(),
    };

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            // EOF on stdin
            break;
        };
        let line = line.context("Failed to read stdin")?;

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match console.execute(command) {
            Ok((Flow::Quit, _)) => break,
            Ok((Flow::Continue, message)) => println!("{}", message),
            Err(e) => println!("error: {:#}", e),
        }
    }

    live.last_preset = console.last_preset.take();
    stop.store(true, Ordering::Relaxed);
    if logger.join().is_err() {
        log::warn!("Telemetry thread panicked");
    }

    live.flattener = controller.config().clone();
    if !no_save {
        save_config(&live, &config_path)?;
    }

    drop(handle);
    log::info!("pitch-flattener stopped");
    Ok(())
}

/// Log a status line periodically while audio is flowing
fn spawn_telemetry_logger(
    atomics: Arc<FlattenAtomics>,
    counters: Arc<StreamCounters>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("flattener-telemetry".to_string())
        .spawn(move || {
            let tick = Duration::from_millis(100);
            let ticks_per_line = (TELEMETRY_INTERVAL.as_millis() / tick.as_millis()) as u32;
            let mut last_blocks = 0;
            let mut last_xruns = (0, 0);
            let mut ticks = 0;

            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(tick);
                ticks += 1;
                if ticks < ticks_per_line {
                    continue;
                }
                ticks = 0;

                let snapshot = atomics.snapshot();
                if snapshot.blocks_processed == last_blocks {
                    log::warn!("Audio callback stalled");
                    continue;
                }
                last_blocks = snapshot.blocks_processed;
                log::info!("{}", status_line(&snapshot));

                let xruns = (
                    counters.overflows.load(Ordering::Relaxed),
                    counters.underruns.load(Ordering::Relaxed),
                );
                if xruns != last_xruns {
                    log::warn!("Capture ring: {} overflows, {} underruns", xruns.0, xruns.1);
                    last_xruns = xruns;
                }
            }
        })
}
