// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan command sinks: the EC-backed controller and the debounce gate that
//! sits in front of it.

use crate::ec::{
    EC_CMD_PWM_SET_FAN_DUTY, EC_CMD_THERMAL_AUTO_FAN_CTRL, EcCommandChannel, EcError, EcTransport,
};
use crate::percent::Percentage;

/// Something that accepts fan duty commands.
pub trait FanController {
    /// Pin the fan at a manual duty cycle.
    fn set_fan_duty(&mut self, duty: Percentage) -> Result<(), EcError>;

    /// Hand thermal control back to the EC's own table.
    fn activate_auto_fan_control(&mut self) -> Result<(), EcError>;
}

// ---------------------------------------------------------------------------
// EC-backed controller
// ---------------------------------------------------------------------------

/// Drives the EC fan through the command channel.
pub struct EcFanController<T: EcTransport> {
    channel: EcCommandChannel<T>,
}

impl<T: EcTransport> EcFanController<T> {
    pub fn new(channel: EcCommandChannel<T>) -> Self {
        Self { channel }
    }
}

impl<T: EcTransport> FanController for EcFanController<T> {
    fn set_fan_duty(&mut self, duty: Percentage) -> Result<(), EcError> {
        self.channel
            .send_command_u32(EC_CMD_PWM_SET_FAN_DUTY, u32::from(duty))?;
        Ok(())
    }

    fn activate_auto_fan_control(&mut self) -> Result<(), EcError> {
        self.channel
            .send_command_bool(EC_CMD_THERMAL_AUTO_FAN_CTRL, false)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Debounce gate
// ---------------------------------------------------------------------------

/// Duty-cycle change below this many percentage points is not worth a
/// hardware command.
pub const DEFAULT_DEBOUNCE_THRESHOLD: u8 = 5;

/// Suppresses duty commands that differ from the last forwarded value by
/// less than a threshold, so sensor jitter doesn't turn into fan chatter.
pub struct DebounceGate<C: FanController> {
    inner: C,
    threshold: u8,
    last_forwarded: Option<Percentage>,
}

impl<C: FanController> DebounceGate<C> {
    pub fn new(inner: C, threshold: u8) -> Self {
        Self {
            inner,
            threshold,
            last_forwarded: None,
        }
    }

    /// Forget the last forwarded value. Called on resume from suspend so
    /// the fan never stays parked at a pre-suspend duty.
    pub fn reset(&mut self) {
        self.last_forwarded = None;
    }
}

impl<C: FanController> FanController for DebounceGate<C> {
    fn set_fan_duty(&mut self, duty: Percentage) -> Result<(), EcError> {
        if let Some(last) = self.last_forwarded {
            if duty.abs_diff(last) < self.threshold {
                log::info!("ignoring {duty}, keeping the fan at the previous value of {last}");
                return Ok(());
            }
        }
        self.inner.set_fan_duty(duty)?;
        self.last_forwarded = Some(duty);
        Ok(())
    }

    // Debounce applies only to explicit duty commands.
    fn activate_auto_fan_control(&mut self) -> Result<(), EcError> {
        self.inner.activate_auto_fan_control()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FanCall, RecordingController};
    use super::*;
    use crate::ec::ScriptedTransport;

    #[test]
    fn test_first_duty_always_forwards() {
        let recorder = RecordingController::default();
        let mut gate = DebounceGate::new(recorder.clone(), 5);

        gate.set_fan_duty(Percentage::new(30)).unwrap();
        assert_eq!(recorder.calls(), vec![FanCall::SetDuty(30)]);
    }

    #[test]
    fn test_within_threshold_is_dropped() {
        let recorder = RecordingController::default();
        let mut gate = DebounceGate::new(recorder.clone(), 5);

        gate.set_fan_duty(Percentage::new(30)).unwrap();
        gate.set_fan_duty(Percentage::new(33)).unwrap();
        assert_eq!(recorder.calls(), vec![FanCall::SetDuty(30)]);
    }

    #[test]
    fn test_at_threshold_forwards_and_becomes_reference() {
        let recorder = RecordingController::default();
        let mut gate = DebounceGate::new(recorder.clone(), 5);

        gate.set_fan_duty(Percentage::new(30)).unwrap();
        gate.set_fan_duty(Percentage::new(35)).unwrap();
        // 38 is within threshold of the new reference 35, not of 30.
        gate.set_fan_duty(Percentage::new(38)).unwrap();
        assert_eq!(
            recorder.calls(),
            vec![FanCall::SetDuty(30), FanCall::SetDuty(35)]
        );
    }

    #[test]
    fn test_reset_forces_next_forward() {
        let recorder = RecordingController::default();
        let mut gate = DebounceGate::new(recorder.clone(), 5);

        gate.set_fan_duty(Percentage::new(30)).unwrap();
        gate.reset();
        gate.set_fan_duty(Percentage::new(31)).unwrap();
        assert_eq!(
            recorder.calls(),
            vec![FanCall::SetDuty(30), FanCall::SetDuty(31)]
        );
    }

    #[test]
    fn test_auto_control_bypasses_debounce() {
        let recorder = RecordingController::default();
        let mut gate = DebounceGate::new(recorder.clone(), 5);

        gate.set_fan_duty(Percentage::new(30)).unwrap();
        gate.activate_auto_fan_control().unwrap();
        gate.activate_auto_fan_control().unwrap();
        assert_eq!(
            recorder.calls(),
            vec![
                FanCall::SetDuty(30),
                FanCall::AutoControl,
                FanCall::AutoControl
            ]
        );
    }

    #[test]
    fn test_ec_controller_issues_duty_and_auto_commands() {
        let transport = ScriptedTransport::new();
        let mut controller = EcFanController::new(EcCommandChannel::new(transport.clone()));

        controller.set_fan_duty(Percentage::new(40)).unwrap();
        controller.activate_auto_fan_control().unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].command, EC_CMD_PWM_SET_FAN_DUTY);
        assert_eq!(sent[0].data[..4], 40u32.to_le_bytes());
        assert_eq!(sent[1].command, EC_CMD_THERMAL_AUTO_FAN_CTRL);
        assert_eq!(sent[1].data[..1], [0]);
    }
}
