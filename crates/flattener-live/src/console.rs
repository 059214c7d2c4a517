//! Line-based control console on stdin
//!
//! Each line is parsed into a [`ConsoleCommand`] and run against the
//! engine's controller and the preset store.

use thiserror::Error;

use flattener_core::config::{PresetSource, PresetStore};
use flattener_core::{Algorithm, FlattenController, TelemetrySnapshot};

pub const HELP: &str = "\
commands:
  status                       show pitch, ratio and latch state
  reset                        reset the whole pipeline
  latch [on|off]               reset the latch, or enable/disable it
  target <hz>                  set the target pitch
  override <hz|off>            pin the target, unlocking the latch
  mix <0-1>                    dry/wet mix
  algo yin|dio                 switch the pitch estimator
  hard on|off                  hard flatten (ignore smoothing)
  preset list                  list factory and user presets
  preset load|save|delete <n>  manage presets
  defaults                     restore default settings
  help                         show this text
  quit                         save settings and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum PresetAction {
    List,
    Load(String),
    Save(String),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Reset,
    ResetLatch,
    LatchEnabled(bool),
    Target(f32),
    Override(Option<f32>),
    Mix(f32),
    Algorithm(Algorithm),
    HardFlatten(bool),
    Preset(PresetAction),
    Defaults,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command {0:?}, type 'help'")]
    UnknownCommand(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid {what}: {value:?}")]
    InvalidValue { what: &'static str, value: String },
}

fn parse_on_off(what: &'static str, value: &str) -> Result<bool, ConsoleError> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(ConsoleError::InvalidValue {
            what,
            value: value.to_string(),
        }),
    }
}

fn parse_number(what: &'static str, value: &str) -> Result<f32, ConsoleError> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConsoleError::InvalidValue {
            what,
            value: value.to_string(),
        })
}

/// Parse one input line; `Ok(None)` for a blank line
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match (head, arg) {
        ("status" | "s", _) => ConsoleCommand::Status,
        ("reset", _) => ConsoleCommand::Reset,
        ("latch", None) => ConsoleCommand::ResetLatch,
        ("latch", Some(v)) => ConsoleCommand::LatchEnabled(parse_on_off("latch", v)?),
        ("target", Some(v)) => ConsoleCommand::Target(parse_number("target", v)?),
        ("target", None) => return Err(ConsoleError::MissingArgument("target")),
        ("override", Some("off")) => ConsoleCommand::Override(None),
        ("override", Some(v)) => ConsoleCommand::Override(Some(parse_number("override", v)?)),
        ("override", None) => return Err(ConsoleError::MissingArgument("override")),
        ("mix", Some(v)) => ConsoleCommand::Mix(parse_number("mix", v)?),
        ("mix", None) => return Err(ConsoleError::MissingArgument("mix")),
        ("algo", Some("yin")) => ConsoleCommand::Algorithm(Algorithm::Yin),
        ("algo", Some("dio")) => ConsoleCommand::Algorithm(Algorithm::Dio),
        ("algo", Some(v)) => {
            return Err(ConsoleError::InvalidValue {
                what: "algorithm",
                value: v.to_string(),
            })
        }
        ("algo", None) => return Err(ConsoleError::MissingArgument("algo")),
        ("hard", Some(v)) => ConsoleCommand::HardFlatten(parse_on_off("hard", v)?),
        ("hard", None) => return Err(ConsoleError::MissingArgument("hard")),
        ("preset", Some("list")) | ("presets", None) => ConsoleCommand::Preset(PresetAction::List),
        ("preset", Some(action)) => {
            // Preset names may contain spaces
            let name = words.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(ConsoleError::MissingArgument("preset"));
            }
            match action {
                "load" => ConsoleCommand::Preset(PresetAction::Load(name)),
                "save" => ConsoleCommand::Preset(PresetAction::Save(name)),
                "delete" => ConsoleCommand::Preset(PresetAction::Delete(name)),
                _ => {
                    return Err(ConsoleError::InvalidValue {
                        what: "preset action",
                        value: action.to_string(),
                    })
                }
            }
        }
        ("preset", None) => return Err(ConsoleError::MissingArgument("preset")),
        ("defaults", _) => ConsoleCommand::Defaults,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit" | "q", _) => ConsoleCommand::Quit,
        _ => return Err(ConsoleError::UnknownCommand(head.to_string())),
    };
    Ok(Some(command))
}

/// One-line summary of the engine state
pub fn status_line(t: &TelemetrySnapshot) -> String {
    let latch = if t.latch_locked {
        format!("locked {:.1}Hz", t.locked_frequency)
    } else {
        "unlocked".to_string()
    };
    let state = if t.dio_prebuffering {
        " [DIO prebuffering]"
    } else if !t.warmed_up {
        " [warming up]"
    } else {
        ""
    };
    format!(
        "{} pitch {:.1}Hz -> target {:.1}Hz | ratio {:.3} ({:+.2} st) | latch {} | in {:.1}dB | rejected {} starved {}{}",
        t.algorithm.name(),
        t.detected_pitch,
        t.effective_target,
        t.applied_ratio,
        t.correction_semitones(),
        latch,
        t.input_level_db,
        t.rejected_jumps,
        t.starved_blocks,
        state
    )
}

/// Whether the console loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Runs parsed commands against the controller and preset store
pub struct Console<'a> {
    pub controller: &'a mut FlattenController,
    pub presets: &'a PresetStore,
    /// Name of the preset applied last
    pub last_preset: Option<String>,
}

impl Console<'_> {
    /// Execute one command, returning the text to show the user
    pub fn execute(&mut self, command: ConsoleCommand) -> anyhow::Result<(Flow, String)> {
        let c = &mut *self.controller;
        let message = match command {
            ConsoleCommand::Status => {
                let mut line = status_line(&c.telemetry());
                if let Some(name) = &self.last_preset {
                    line.push_str(&format!(" | preset {}", name));
                }
                line
            }
            ConsoleCommand::Reset => {
                c.reset();
                "pipeline reset".to_string()
            }
            ConsoleCommand::ResetLatch => {
                c.reset_latch();
                "latch reset".to_string()
            }
            ConsoleCommand::LatchEnabled(enabled) => {
                c.set_latch_enabled(enabled)?;
                format!("latch {}", if enabled { "enabled" } else { "disabled" })
            }
            ConsoleCommand::Target(hz) => {
                c.set_target_pitch(hz)?;
                format!("target {:.1}Hz", c.config().flatten.target_pitch)
            }
            ConsoleCommand::Override(Some(hz)) => {
                c.set_manual_override(Some(hz))?;
                format!("override {:.1}Hz", c.config().flatten.override_freq)
            }
            ConsoleCommand::Override(None) => {
                c.set_manual_override(None)?;
                "override off".to_string()
            }
            ConsoleCommand::Mix(mix) => {
                c.set_mix(mix)?;
                format!("mix {:.2}", c.config().output.mix)
            }
            ConsoleCommand::Algorithm(algorithm) => {
                c.set_algorithm(algorithm)?;
                format!("algorithm {}", algorithm.name())
            }
            ConsoleCommand::HardFlatten(hard) => {
                c.set_hard_flatten(hard)?;
                format!("hard flatten {}", if hard { "on" } else { "off" })
            }
            ConsoleCommand::Preset(action) => self.preset(action)?,
            ConsoleCommand::Defaults => {
                c.reset_to_defaults()?;
                self.last_preset = None;
                "defaults restored".to_string()
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => return Ok((Flow::Quit, "bye".to_string())),
        };
        Ok((Flow::Continue, message))
    }

    fn preset(&mut self, action: PresetAction) -> anyhow::Result<String> {
        let message = match action {
            PresetAction::List => {
                let entries = self.presets.list();
                if entries.is_empty() {
                    return Ok("no presets".to_string());
                }
                entries
                    .iter()
                    .map(|e| match e.source {
                        PresetSource::Factory => format!("  {} (factory)", e.name),
                        PresetSource::User => format!("  {}", e.name),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            PresetAction::Load(name) => {
                let config = self.presets.load(&name)?;
                self.controller.apply_config(&config)?;
                self.last_preset = Some(name.clone());
                format!("loaded preset {}", name)
            }
            PresetAction::Save(name) => {
                self.presets.save_user(&name, self.controller.config())?;
                self.last_preset = Some(name.clone());
                format!("saved preset {}", name)
            }
            PresetAction::Delete(name) => {
                self.presets.delete_user(&name)?;
                if self.last_preset.as_deref() == Some(name.as_str()) {
                    self.last_preset = None;
                }
                format!("deleted preset {}", name)
            }
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flattener_core::config::DEFAULT_PRESET_NAME;
    use flattener_core::shifter::FrameFifo;
    use flattener_core::{flatten_engine, FlattenEngine, FlattenerConfig, PitchShifter, StereoSample};
    use tempfile::TempDir;

    struct Fifo(FrameFifo);

    impl PitchShifter for Fifo {
        fn set_pitch_scale(&mut self, _scale: f64) {}
        fn process(&mut self, input: &[StereoSample], _is_final: bool) {
            self.0.push_slice(input);
        }
        fn available(&self) -> usize {
            self.0.len()
        }
        fn retrieve(&mut self, output: &mut [StereoSample]) -> usize {
            self.0.pop_into(output)
        }
        fn latency(&self) -> usize {
            0
        }
        fn reset(&mut self) {
            self.0.clear();
        }
    }

    fn setup() -> (FlattenEngine<Fifo>, FlattenController, TempDir, PresetStore) {
        let (engine, controller) =
            flatten_engine(&FlattenerConfig::default(), 48000, 256, Fifo(FrameFifo::with_capacity(4096))).unwrap();
        let temp = TempDir::new().unwrap();
        let presets = PresetStore::new(temp.path());
        presets.ensure_factory_defaults().unwrap();
        (engine, controller, temp, presets)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_command("latch"), Ok(Some(ConsoleCommand::ResetLatch)));
        assert_eq!(parse_command("latch off"), Ok(Some(ConsoleCommand::LatchEnabled(false))));
        assert_eq!(parse_command("target 220"), Ok(Some(ConsoleCommand::Target(220.0))));
        assert_eq!(parse_command("override off"), Ok(Some(ConsoleCommand::Override(None))));
        assert_eq!(parse_command("override 330.5"), Ok(Some(ConsoleCommand::Override(Some(330.5)))));
        assert_eq!(parse_command("algo dio"), Ok(Some(ConsoleCommand::Algorithm(Algorithm::Dio))));
        assert_eq!(parse_command("hard on"), Ok(Some(ConsoleCommand::HardFlatten(true))));
        assert_eq!(parse_command("quit"), Ok(Some(ConsoleCommand::Quit)));
    }

    #[test]
    fn test_parse_preset_names_with_spaces() {
        assert_eq!(
            parse_command("preset save Deep Voice"),
            Ok(Some(ConsoleCommand::Preset(PresetAction::Save("Deep Voice".to_string()))))
        );
        assert_eq!(parse_command("preset list"), Ok(Some(ConsoleCommand::Preset(PresetAction::List))));
        assert_eq!(parse_command("preset load"), Err(ConsoleError::MissingArgument("preset")));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("warp 9"), Err(ConsoleError::UnknownCommand("warp".to_string())));
        assert_eq!(parse_command("target"), Err(ConsoleError::MissingArgument("target")));
        assert!(matches!(parse_command("target high"), Err(ConsoleError::InvalidValue { .. })));
        assert!(matches!(parse_command("mix NaN"), Err(ConsoleError::InvalidValue { .. })));
        assert!(matches!(parse_command("algo crepe"), Err(ConsoleError::InvalidValue { .. })));
        assert!(matches!(parse_command("hard maybe"), Err(ConsoleError::InvalidValue { .. })));
    }

    #[test]
    fn test_execute_updates_controller() {
        let (_engine, mut controller, _temp, presets) = setup();
        let mut console = Console {
            controller: &mut controller,
            presets: &presets,
            last_preset: None,
        };

        console.execute(ConsoleCommand::Target(196.0)).unwrap();
        console.execute(ConsoleCommand::Mix(0.4)).unwrap();
        console.execute(ConsoleCommand::Override(Some(250.0))).unwrap();
        let (flow, _) = console.execute(ConsoleCommand::Status).unwrap();
        assert_eq!(flow, Flow::Continue);

        let config = controller.config();
        assert_eq!(config.flatten.target_pitch, 196.0);
        assert_eq!(config.output.mix, 0.4);
        assert!(config.flatten.manual_override);
        assert_eq!(config.flatten.override_freq, 250.0);
    }

    #[test]
    fn test_execute_preset_cycle() {
        let (_engine, mut controller, _temp, presets) = setup();
        let mut console = Console {
            controller: &mut controller,
            presets: &presets,
            last_preset: None,
        };

        console.execute(ConsoleCommand::Target(150.0)).unwrap();
        console
            .execute(ConsoleCommand::Preset(PresetAction::Save("Low".to_string())))
            .unwrap();
        console.execute(ConsoleCommand::Defaults).unwrap();
        assert_eq!(console.controller.config().flatten.target_pitch, 440.0);

        console
            .execute(ConsoleCommand::Preset(PresetAction::Load("Low".to_string())))
            .unwrap();
        assert_eq!(console.controller.config().flatten.target_pitch, 150.0);
        assert_eq!(console.last_preset.as_deref(), Some("Low"));

        console
            .execute(ConsoleCommand::Preset(PresetAction::Delete("Low".to_string())))
            .unwrap();
        assert!(console.last_preset.is_none());

        // Factory presets are read-only
        assert!(console
            .execute(ConsoleCommand::Preset(PresetAction::Delete(DEFAULT_PRESET_NAME.to_string())))
            .is_err());
    }

    #[test]
    fn test_quit_stops_loop() {
        let (_engine, mut controller, _temp, presets) = setup();
        let mut console = Console {
            controller: &mut controller,
            presets: &presets,
            last_preset: None,
        };
        let (flow, _) = console.execute(ConsoleCommand::Quit).unwrap();
        assert_eq!(flow, Flow::Quit);
    }

    #[test]
    fn test_status_line_mentions_latch() {
        let mut t = flattener_core::engine::FlattenAtomics::new().snapshot();
        assert!(status_line(&t).contains("unlocked"));
        t.latch_locked = true;
        t.locked_frequency = 301.0;
        assert!(status_line(&t).contains("locked 301.0Hz"));
    }
}
