//! Audio device enumeration and lookup
//!
//! Devices are listed from every available cpal host so a capture interface
//! on one host can be paired with playback on another.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Stream direction a device is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn devices_of(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    };
    devices.ok()
}

fn default_of(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Identifier for configuration (includes host)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g. "ALSA", "CoreAudio")
    pub host: String,
    /// Whether this is the host's default device for the direction
    pub is_default: bool,
    /// Common sample rates within the supported range
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// All devices usable for `direction`, defaults first
pub fn get_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_name_str = host_name(host_id);
        let default_name = default_of(&host, direction).and_then(|d| d.name().ok());

        let Some(devices) = devices_of(&host, direction) else {
            log::debug!("Could not enumerate {} devices for {:?}", direction, host_id);
            continue;
        };

        for device in devices {
            let Ok(name) = device.name() else { continue };

            let ranges: Vec<(u16, u32, u32)> = match direction {
                Direction::Input => device.supported_input_configs().map(|c| {
                    c.map(|r| (r.channels(), r.min_sample_rate().0, r.max_sample_rate().0))
                        .collect()
                }),
                Direction::Output => device.supported_output_configs().map(|c| {
                    c.map(|r| (r.channels(), r.min_sample_rate().0, r.max_sample_rate().0))
                        .collect()
                }),
            }
            .unwrap_or_default();

            if ranges.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;
            for (channels, min, max) in &ranges {
                max_channels = max_channels.max(*channels);
                for rate in [44100, 48000, 88200, 96000, 176400, 192000] {
                    if rate >= *min && rate <= *max && !sample_rates.contains(&rate) {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_name_str.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction));
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!("Enumerated {} {} devices", all_devices.len(), direction);
    Ok(all_devices)
}

/// Find a device by ID, searching the named host first and then every host
pub fn find_device_by_id(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return devices_of(&host, direction)
            .ok_or_else(|| AudioError::DeviceQuery {
                direction,
                reason: "host cannot list devices".to_string(),
            })?
            .into_iter()
            .find(matches)
            .ok_or_else(|| AudioError::DeviceNotFound {
                name: id.name.clone(),
                direction,
            });
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| devices_of(&host, direction))
        .flatten()
        .find(matches)
        .ok_or_else(|| AudioError::DeviceNotFound {
            name: id.name.clone(),
            direction,
        })
}

/// Default device of the default host
pub fn get_cpal_default_device(direction: Direction) -> AudioResult<cpal::Device> {
    default_of(&cpal::default_host(), direction)
        .ok_or(AudioError::NoDefaultDevice(direction))
}

/// Configured device, or the default one
pub(crate) fn resolve_device(
    id: Option<&DeviceId>,
    direction: Direction,
) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => find_device_by_id(id, direction),
        None => get_cpal_default_device(direction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // No devices is normal on CI machines
        for direction in [Direction::Input, Direction::Output] {
            match get_devices(direction) {
                Ok(devices) => {
                    assert!(devices.iter().all(|d| d.max_channels > 0));
                    // Defaults sort first
                    let first_non_default = devices.iter().position(|d| !d.is_default);
                    if let Some(idx) = first_non_default {
                        assert!(devices[idx..].iter().all(|d| !d.is_default));
                    }
                }
                Err(AudioError::NoDevices(_)) => {}
                Err(e) => println!("Error enumerating {} devices: {}", direction, e),
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::with_host("no-such-device-loopstation", "NoSuchHost");
        assert!(matches!(
            find_device_by_id(&id, Direction::Output),
            Err(AudioError::DeviceNotFound { direction: Direction::Output, .. })
        ));
    }
}
