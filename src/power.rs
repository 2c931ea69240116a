// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Suspend/resume detection.
//!
//! There is no portable userspace callback for "the machine just woke up",
//! so the watcher samples the wall clock against the monotonic clock once a
//! second. Across a suspend the wall clock keeps running while the
//! monotonic clock does not, so a gap beyond the threshold means the
//! machine slept, and a resume event is broadcast to whoever subscribed.

use std::time::{Duration, Instant, SystemTime};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

/// Power-state transitions relevant to the control pipeline. Only `Resume`
/// triggers state resets; `Suspend` is carried for subscribers that may
/// care later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Resume,
    Suspend,
}

/// Minimum wall-vs-monotonic divergence treated as a suspend cycle.
/// Scheduling jitter stays well under this.
pub const DEFAULT_RESUME_GAP: Duration = Duration::from_secs(5);

/// True when the wall clock ran ahead of the monotonic clock by more than
/// the threshold since the last sample, which only happens when the machine
/// slept in between.
fn slept(wall_elapsed: Duration, mono_elapsed: Duration, gap_threshold: Duration) -> bool {
    wall_elapsed > mono_elapsed + gap_threshold
}

/// Spawn the clock-gap watcher and return the event channel. Subscribe via
/// [`broadcast::Sender::subscribe`]; the watcher stops once every handle to
/// the channel is gone.
pub fn spawn_suspend_watcher(gap_threshold: Duration) -> broadcast::Sender<PowerEvent> {
    let (tx, _) = broadcast::channel(8);
    let sender = tx.clone();

    tokio::spawn(async move {
        let mut wall = SystemTime::now();
        let mut mono = Instant::now();
        let mut ticker = time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let wall_elapsed = SystemTime::now()
                .duration_since(wall)
                .unwrap_or(Duration::ZERO);
            let mono_elapsed = mono.elapsed();

            if slept(wall_elapsed, mono_elapsed, gap_threshold) {
                let gap = wall_elapsed - mono_elapsed;
                log::info!("detected resume from suspend ({}s clock gap)", gap.as_secs());
                if sender.send(PowerEvent::Resume).is_err() {
                    // No subscribers left; nothing to watch for.
                    break;
                }
            }

            wall = SystemTime::now();
            mono = Instant::now();
        }
    });

    tx
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GAP: Duration = DEFAULT_RESUME_GAP;

    #[test]
    fn test_ordinary_jitter_is_not_a_suspend() {
        let mono = Duration::from_secs(1);
        assert!(!slept(mono + Duration::from_millis(200), mono, GAP));
    }

    #[test]
    fn test_gap_exactly_at_threshold_is_not_a_suspend() {
        let mono = Duration::from_secs(1);
        assert!(!slept(mono + GAP, mono, GAP));
    }

    #[test]
    fn test_gap_beyond_threshold_is_a_suspend() {
        let mono = Duration::from_secs(1);
        assert!(slept(mono + GAP + Duration::from_millis(1), mono, GAP));
    }

    #[test]
    fn test_wall_clock_stepped_backwards_is_not_a_suspend() {
        // An NTP correction can leave the wall clock behind the monotonic
        // clock; that must never look like a resume.
        assert!(!slept(Duration::ZERO, Duration::from_secs(1), GAP));
    }
}
