// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! CPU temperature readings from hwmon sysfs.
//!
//! Scans `/sys/class/hwmon/` once at startup for the CPU package device
//! (`coretemp`, `k10temp`, ...) and remembers the per-core `tempN_input`
//! files. Each poll re-reads those files; a sensor that fails to read
//! reports NaN rather than failing the whole snapshot.

use crate::state::{ComputerState, StateSource};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const HWMON_ROOT: &str = "/sys/class/hwmon";

/// hwmon device names that expose per-core CPU temperatures.
const CPU_HWMON_NAMES: &[&str] = &["coretemp", "k10temp", "zenpower"];

/// Per-core CPU temperature source backed by one hwmon device.
pub struct CpuTempSensors {
    /// `tempN_input` paths for per-core sensors, in label order.
    core_inputs: Vec<PathBuf>,
    /// `tempN_input` for the package/die sensor, if the device has one.
    package_input: Option<PathBuf>,
    hwmon_name: String,
}

impl CpuTempSensors {
    /// Find the CPU temperature device. Fails when no known CPU hwmon
    /// device exists, which the daemon treats as fatal at startup.
    pub fn discover() -> io::Result<Self> {
        Self::discover_under(Path::new(HWMON_ROOT))
    }

    fn discover_under(root: &Path) -> io::Result<Self> {
        for entry in fs::read_dir(root)? {
            let hwmon_dir = entry?.path();
            let Some(name) = read_trimmed(&hwmon_dir.join("name")) else {
                continue;
            };
            if !CPU_HWMON_NAMES.contains(&name.as_str()) {
                continue;
            }

            let mut cores: Vec<(usize, PathBuf)> = Vec::new();
            let mut package_input = None;

            for n in 1..=64 {
                let input = hwmon_dir.join(format!("temp{n}_input"));
                if !input.exists() {
                    continue;
                }
                match read_trimmed(&hwmon_dir.join(format!("temp{n}_label"))).as_deref() {
                    Some(label) if is_package_label(label) => package_input = Some(input),
                    Some(label) => {
                        if let Some(core) = parse_core_label(label) {
                            cores.push((core, input));
                        }
                    }
                    // Unlabelled single-sensor devices (k10temp on older
                    // kernels) still give us a package reading.
                    None if package_input.is_none() => package_input = Some(input),
                    None => {}
                }
            }

            if cores.is_empty() && package_input.is_none() {
                continue;
            }

            cores.sort_by_key(|&(core, _)| core);
            log::info!(
                "using hwmon device '{name}' with {} core sensor(s)",
                cores.len()
            );
            return Ok(Self {
                core_inputs: cores.into_iter().map(|(_, p)| p).collect(),
                package_input,
                hwmon_name: name,
            });
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no CPU temperature device found under /sys/class/hwmon",
        ))
    }

    pub fn hwmon_name(&self) -> &str {
        &self.hwmon_name
    }
}

impl StateSource for CpuTempSensors {
    fn read_state(&mut self) -> io::Result<ComputerState> {
        let core_temps: Vec<f32> = self
            .core_inputs
            .iter()
            .map(|p| read_temp(p).unwrap_or(f32::NAN))
            .collect();

        let finite: Vec<f32> = core_temps.iter().copied().filter(|t| t.is_finite()).collect();
        let package = self
            .package_input
            .as_deref()
            .and_then(read_temp)
            .unwrap_or(f32::NAN);

        // The hottest reading available drives the curve; the package
        // sensor stands in when core sensors are missing or unreadable.
        let core_max_temp = finite
            .iter()
            .copied()
            .chain(package.is_finite().then_some(package))
            .fold(f32::NAN, f32::max);
        let core_avg_temp = if finite.is_empty() {
            package
        } else {
            finite.iter().sum::<f32>() / finite.len() as f32
        };

        log::debug!("CPU temperatures: max {core_max_temp:.1}C avg {core_avg_temp:.1}C");

        Ok(ComputerState {
            core_max_temp,
            core_avg_temp,
            core_temps,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a per-core sensor label like "Core 3" or "Ccd1" into an index.
fn parse_core_label(label: &str) -> Option<usize> {
    let rest = label
        .strip_prefix("Core ")
        .or_else(|| label.strip_prefix("Ccd"))?;
    rest.trim().parse().ok()
}

fn is_package_label(label: &str) -> bool {
    label.starts_with("Package id") || label == "Tdie" || label == "Tctl"
}

/// Read a `tempN_input` file (millidegrees Celsius).
fn read_temp(path: &Path) -> Option<f32> {
    read_trimmed(path)?
        .parse::<i64>()
        .ok()
        .map(|millic| millic as f32 / 1000.0)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_labels_parse_to_indices() {
        assert_eq!(parse_core_label("Core 0"), Some(0));
        assert_eq!(parse_core_label("Core 12"), Some(12));
        assert_eq!(parse_core_label("Ccd1"), Some(1));
        assert_eq!(parse_core_label("Package id 0"), None);
        assert_eq!(parse_core_label("Composite"), None);
    }

    #[test]
    fn test_package_labels_recognized() {
        assert!(is_package_label("Package id 0"));
        assert!(is_package_label("Tdie"));
        assert!(!is_package_label("Core 2"));
    }

    #[test]
    fn test_discover_reads_fake_hwmon_tree() {
        let root = std::env::temp_dir().join(format!("ecfand-hwmon-{}", std::process::id()));
        let dev = root.join("hwmon0");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("name"), "coretemp\n").unwrap();
        fs::write(dev.join("temp1_input"), "45000\n").unwrap();
        fs::write(dev.join("temp1_label"), "Package id 0\n").unwrap();
        fs::write(dev.join("temp2_input"), "41000\n").unwrap();
        fs::write(dev.join("temp2_label"), "Core 0\n").unwrap();
        fs::write(dev.join("temp3_input"), "47000\n").unwrap();
        fs::write(dev.join("temp3_label"), "Core 1\n").unwrap();

        let mut sensors = CpuTempSensors::discover_under(&root).unwrap();
        let state = sensors.read_state().unwrap();

        assert_eq!(state.core_temps, vec![41.0, 47.0]);
        assert_eq!(state.core_max_temp, 47.0);
        assert_eq!(state.core_avg_temp, 44.0);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_unreadable_core_reads_as_nan() {
        let root = std::env::temp_dir().join(format!("ecfand-hwmon-nan-{}", std::process::id()));
        let dev = root.join("hwmon0");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("name"), "coretemp\n").unwrap();
        fs::write(dev.join("temp2_input"), "garbage\n").unwrap();
        fs::write(dev.join("temp2_label"), "Core 0\n").unwrap();
        fs::write(dev.join("temp3_input"), "52000\n").unwrap();
        fs::write(dev.join("temp3_label"), "Core 1\n").unwrap();

        let mut sensors = CpuTempSensors::discover_under(&root).unwrap();
        let state = sensors.read_state().unwrap();

        assert!(state.core_temps[0].is_nan());
        assert_eq!(state.core_max_temp, 52.0);

        fs::remove_dir_all(&root).unwrap();
    }
}
