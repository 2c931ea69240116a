// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Moving-average smoothing over a temperature source.

use crate::state::{ComputerState, StateSource};
use std::collections::VecDeque;
use std::io;

/// Wraps a [`StateSource`] and reports the average of the last `width`
/// samples instead of each raw reading, taming sensor noise before it
/// reaches the curve.
pub struct MovingAverageSmoother<S: StateSource> {
    source: S,
    width: usize,
    window: VecDeque<ComputerState>,
}

impl<S: StateSource> MovingAverageSmoother<S> {
    /// `width` is the number of samples averaged; zero is treated as one.
    pub fn new(source: S, width: usize) -> Self {
        let width = width.max(1);
        Self {
            source,
            width,
            window: VecDeque::with_capacity(width),
        }
    }

    /// Drop all buffered samples. Called on resume from suspend so stale
    /// pre-suspend readings never blend into post-resume ones.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.window.len()
    }
}

impl<S: StateSource> StateSource for MovingAverageSmoother<S> {
    fn read_state(&mut self) -> io::Result<ComputerState> {
        let state = self.source.read_state()?;

        while self.window.len() >= self.width {
            self.window.pop_front();
        }
        self.window.push_back(state);

        // The window holds at least the sample just pushed.
        ComputerState::average(self.window.make_contiguous()).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays back a fixed sequence of snapshots.
    struct SequenceSource {
        states: Vec<ComputerState>,
        next: usize,
    }

    impl SequenceSource {
        fn new(temps: &[f32]) -> Self {
            let states = temps
                .iter()
                .map(|&t| ComputerState {
                    core_max_temp: t,
                    core_avg_temp: t,
                    core_temps: vec![t, t],
                })
                .collect();
            Self { states, next: 0 }
        }
    }

    impl StateSource for SequenceSource {
        fn read_state(&mut self) -> io::Result<ComputerState> {
            let state = self.states[self.next].clone();
            self.next += 1;
            Ok(state)
        }
    }

    #[test]
    fn test_first_read_is_the_raw_sample() {
        let mut smoother = MovingAverageSmoother::new(SequenceSource::new(&[50.0]), 4);
        assert_eq!(smoother.read_state().unwrap().core_max_temp, 50.0);
    }

    #[test]
    fn test_reports_window_average() {
        let mut smoother = MovingAverageSmoother::new(SequenceSource::new(&[40.0, 60.0]), 4);
        smoother.read_state().unwrap();
        assert_eq!(smoother.read_state().unwrap().core_max_temp, 50.0);
    }

    #[test]
    fn test_window_never_exceeds_width_and_evicts_oldest() {
        let mut smoother =
            MovingAverageSmoother::new(SequenceSource::new(&[10.0, 20.0, 30.0, 40.0]), 2);

        for _ in 0..3 {
            smoother.read_state().unwrap();
        }
        assert_eq!(smoother.len(), 2);

        // Window is now [30, 40]; the 10 and 20 samples are gone.
        assert_eq!(smoother.read_state().unwrap().core_max_temp, 35.0);
    }

    #[test]
    fn test_zero_width_behaves_as_one() {
        let mut smoother = MovingAverageSmoother::new(SequenceSource::new(&[10.0, 90.0]), 0);
        smoother.read_state().unwrap();
        assert_eq!(smoother.read_state().unwrap().core_max_temp, 90.0);
    }

    #[test]
    fn test_reset_discards_history() {
        let mut smoother = MovingAverageSmoother::new(SequenceSource::new(&[80.0, 40.0]), 4);
        smoother.read_state().unwrap();

        smoother.reset();
        assert_eq!(smoother.len(), 0);

        // Only the post-reset sample contributes.
        assert_eq!(smoother.read_state().unwrap().core_max_temp, 40.0);
    }
}
