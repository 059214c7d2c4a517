//! Device lookup across every available cpal host

use cpal::traits::{DeviceTrait, HostTrait};

use super::error::{AudioError, AudioResult};

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// A device as shown by `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    /// Host backend name (e.g. "Alsa", "Jack", "CoreAudio")
    pub host: String,
    pub direction: Direction,
    pub is_default: bool,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<6} [{}] {}{}",
            self.direction.label(),
            self.host,
            self.name,
            if self.is_default { " (default)" } else { "" }
        )
    }
}

fn devices_of(host: &cpal::Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices: Result<Vec<cpal::Device>, _> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices: {}", direction.label(), e);
            None
        }
    }
}

fn default_of(host: &cpal::Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

/// Enumerate input and output devices from all hosts
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut all = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_name = format!("{:?}", host_id);

        for direction in [Direction::Input, Direction::Output] {
            let default_name = default_of(&host, direction).and_then(|d| d.name().ok());
            for device in devices_of(&host, direction).unwrap_or_default() {
                let Ok(name) = device.name() else { continue };
                all.push(DeviceInfo {
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    host: host_name.clone(),
                    direction,
                });
            }
        }
    }

    log::debug!("Enumerated {} audio devices", all.len());
    all
}

/// Resolve a device by name, or the default host's default device
pub fn find_device(name: Option<&str>, direction: Direction) -> AudioResult<cpal::Device> {
    let Some(name) = name else {
        return default_of(&cpal::default_host(), direction)
            .ok_or(AudioError::NoDefaultDevice(direction.label()));
    };

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else { continue };
        if let Some(device) = devices_of(&host, direction)
            .unwrap_or_default()
            .into_iter()
            .find(|d| d.name().ok().as_deref() == Some(name))
        {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}
