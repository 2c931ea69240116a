// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! CPU temperature snapshots and snapshot averaging.

use std::io;
use thiserror::Error;

/// One temperature reading across the CPU package. Values may be NaN when a
/// sensor could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputerState {
    /// Hottest core, in degrees Celsius. Drives the fan curve.
    pub core_max_temp: f32,
    /// Mean across cores, in degrees Celsius.
    pub core_avg_temp: f32,
    /// Per-core temperatures, in sensor order.
    pub core_temps: Vec<f32>,
}

/// Averaging over zero samples has no meaningful answer.
#[derive(Debug, Error)]
#[error("cannot average an empty set of temperature samples")]
pub struct EmptyWindow;

impl ComputerState {
    /// Element-wise arithmetic mean over a set of snapshots.
    ///
    /// The per-core vector is averaged position by position, truncated to
    /// the shortest vector present. Sensor sets can change size between
    /// polls, and blending a core's reading with another core's would be
    /// worse than dropping the tail.
    pub fn average(states: &[ComputerState]) -> Result<ComputerState, EmptyWindow> {
        if states.is_empty() {
            return Err(EmptyWindow);
        }
        let n = states.len() as f32;

        let core_max_temp = states.iter().map(|s| s.core_max_temp).sum::<f32>() / n;
        let core_avg_temp = states.iter().map(|s| s.core_avg_temp).sum::<f32>() / n;

        let cores = states
            .iter()
            .map(|s| s.core_temps.len())
            .min()
            .unwrap_or(0);
        let core_temps = (0..cores)
            .map(|i| states.iter().map(|s| s.core_temps[i]).sum::<f32>() / n)
            .collect();

        Ok(ComputerState {
            core_max_temp,
            core_avg_temp,
            core_temps,
        })
    }
}

/// Anything that can produce a fresh [`ComputerState`] once per tick.
pub trait StateSource {
    fn read_state(&mut self) -> io::Result<ComputerState>;
}
