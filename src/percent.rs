// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Duty-cycle percentage value type.

use std::fmt;

/// A fan duty cycle. Construction clamps to 0-100, so a `Percentage` held
/// anywhere in the pipeline is always a valid duty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percentage(u8);

impl Percentage {
    pub const MAX: Percentage = Percentage(100);

    /// Create a percentage, clamping out-of-range input.
    pub fn new(value: i32) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    /// Round a 0.0-1.0 fraction to the nearest whole percentage.
    pub fn from_fraction(fraction: f64) -> Self {
        Self::new((fraction * 100.0).round() as i32)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn to_fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// Distance to another duty value, used by the debounce gate.
    pub fn abs_diff(self, other: Percentage) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl From<Percentage> for u32 {
    fn from(p: Percentage) -> Self {
        u32::from(p.0)
    }
}
