// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve definition and interpolation.
//!
//! A curve maps the hottest core temperature to a duty cycle via linear
//! interpolation between configured breakpoints. At or beyond the last
//! breakpoint the curve always commands full speed.

use crate::percent::Percentage;
use crate::state::ComputerState;
use thiserror::Error;

/// A piecewise-linear temperature-to-duty curve.
///
/// Breakpoints are sorted ascending by temperature at construction, so the
/// order they arrive in (config files make no ordering promise) never
/// affects evaluation.
#[derive(Debug, Clone)]
pub struct FanCurve {
    points: Vec<(f32, Percentage)>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    #[error("control curve must define at least one breakpoint")]
    Empty,
    #[error("control curve defines temperature {0}C more than once")]
    DuplicateTemperature(f32),
    #[error("control curve breakpoint temperature must be finite, got {0}")]
    NonFiniteTemperature(f32),
}

impl FanCurve {
    /// Build a curve from breakpoints in any order. Temperatures must be
    /// finite and unique.
    pub fn new(
        breakpoints: impl IntoIterator<Item = (f32, Percentage)>,
    ) -> Result<Self, CurveError> {
        let mut points: Vec<(f32, Percentage)> = breakpoints.into_iter().collect();
        if points.is_empty() {
            return Err(CurveError::Empty);
        }
        for &(temp, _) in &points {
            if !temp.is_finite() {
                return Err(CurveError::NonFiniteTemperature(temp));
            }
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in points.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(CurveError::DuplicateTemperature(pair[0].0));
            }
        }
        Ok(Self { points })
    }

    /// Evaluate the curve against a temperature snapshot.
    ///
    /// Below the first breakpoint the curve is flat at that breakpoint's
    /// duty. Between breakpoints the duty is linearly interpolated and
    /// truncated to a whole percentage. At or beyond the last breakpoint,
    /// full speed.
    ///
    /// A NaN temperature compares less-than nothing, so it falls through
    /// every breakpoint and lands on full speed. A dead sensor must fail
    /// toward maximum cooling, not minimum.
    pub fn get(&self, state: &ComputerState) -> Percentage {
        let current = state.core_max_temp;

        for (i, &(temp, duty)) in self.points.iter().enumerate() {
            if current < temp {
                if i == 0 {
                    return duty;
                }
                let (prev_temp, prev_duty) = self.points[i - 1];
                let ratio = (current - prev_temp) / (temp - prev_temp);
                let span = f32::from(duty.value()) - f32::from(prev_duty.value());
                return Percentage::new((f32::from(prev_duty.value()) + ratio * span) as i32);
            }
        }

        Percentage::MAX
    }
}
