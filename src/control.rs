// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The control loop: read temperatures, evaluate the curve, drive the fan.
//!
//! One cooperative task owns the whole pipeline, so the smoothing window
//! and debounce state have a single writer. The only suspension points are
//! the inter-cycle wait and the event channels; a hardware exchange, once
//! started, always runs to completion before the loop looks at shutdown or
//! resume signals again.

use crate::curve::FanCurve;
use crate::fan::{DebounceGate, FanController};
use crate::power::PowerEvent;
use crate::smooth::MovingAverageSmoother;
use crate::state::StateSource;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::time::{self, MissedTickBehavior};

/// Drives one fan from one temperature source on a fixed tick.
pub struct ControlLoop<S: StateSource, C: FanController> {
    states: MovingAverageSmoother<S>,
    curve: FanCurve,
    fan: DebounceGate<C>,
    interval: Duration,
}

impl<S: StateSource, C: FanController> ControlLoop<S, C> {
    pub fn new(
        states: MovingAverageSmoother<S>,
        curve: FanCurve,
        fan: DebounceGate<C>,
        interval: Duration,
    ) -> Self {
        Self {
            states,
            curve,
            fan,
            interval,
        }
    }

    /// Run until `shutdown` fires or a cycle fails.
    ///
    /// Whatever the exit path, automatic fan control is handed back to the
    /// EC before returning; the fan must never stay pinned at a stale
    /// manual duty after this process is gone. An `Err` return is the
    /// fatal path: the caller is expected to exit non-zero and leave
    /// restarts to the service manager.
    pub async fn run(
        mut self,
        shutdown: Arc<Notify>,
        power: broadcast::Sender<PowerEvent>,
    ) -> anyhow::Result<()> {
        let mut power_rx = power.subscribe();
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle() {
                        break Err(e);
                    }
                }
                event = power_rx.recv() => match event {
                    Ok(PowerEvent::Resume) => self.handle_resume(),
                    Ok(PowerEvent::Suspend) => {}
                    // Missed events can hide a resume; reset as if one
                    // arrived rather than risk stale state.
                    Err(broadcast::error::RecvError::Lagged(_)) => self.handle_resume(),
                    // Sender gone: no more power events will arrive.
                    Err(broadcast::error::RecvError::Closed) => {
                        shutdown.notified().await;
                        break Ok(());
                    }
                },
                _ = shutdown.notified() => break Ok(()),
            }
        };

        log::info!("restoring automatic fan control");
        if let Err(e) = self.fan.activate_auto_fan_control() {
            log::error!("failed to restore automatic fan control: {e}");
            if result.is_ok() {
                return Err(e).context("restoring automatic fan control");
            }
        }

        result
    }

    /// One read -> compute -> apply cycle. Any failure is returned to the
    /// caller untried; the EC's semantics for a failing command are
    /// command-specific and a blind retry can mask a hardware fault.
    fn run_cycle(&mut self) -> anyhow::Result<()> {
        let state = self
            .states
            .read_state()
            .context("reading CPU temperatures")?;
        log::info!("CPU max at {:.1}C", state.core_max_temp);

        let duty = self.curve.get(&state);
        log::info!("setting fan duty to {duty}");
        self.fan
            .set_fan_duty(duty)
            .context("sending fan duty to the EC")?;
        Ok(())
    }

    fn handle_resume(&mut self) {
        log::info!("resume detected, resetting smoothing window and debounce state");
        self.states.reset();
        self.fan.reset();
    }
}
