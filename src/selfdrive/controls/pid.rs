use std::collections::VecDeque;

use crate::common::numeric::{apply_deadzone, clip, interp};
use crate::selfdrive::controls::saturation::SaturationDetector;
use crate::selfdrive::controls::DT_CTRL;

/// Number of past errors the derivative is taken over.
const DERIVATIVE_WINDOW: usize = 5;

/// A gain scheduled over speed.
#[derive(Debug, Clone, PartialEq)]
pub struct GainSchedule {
    /// Speed breakpoints, m/s.
    pub bp: Vec<f64>,
    /// Gain at each breakpoint.
    pub v: Vec<f64>,
}

impl GainSchedule {
    pub fn new(bp: Vec<f64>, v: Vec<f64>) -> Self {
        Self { bp, v }
    }

    /// The same gain at every speed.
    pub fn constant(k: f64) -> Self {
        Self::new(vec![0.0], vec![k])
    }

    /// Gain at `speed`.
    pub fn at(&self, speed: f64) -> f64 {
        interp(&self.bp, &self.v, speed)
    }
}

/// PID controller with feedforward, deadzone and anti-windup, used for
/// lateral control.
///
/// The proportional term acts on the raw error. The integral and
/// derivative terms see the error with the deadzone removed, so small
/// tracking errors do not wind the integrator. While the driver overrides,
/// the integrator is held at its current value.
#[derive(Debug, Clone)]
pub struct LatPidController {
    kp: GainSchedule,
    ki: GainSchedule,
    kd: GainSchedule,
    /// Feedforward gain.
    pub k_f: f64,

    /// Upper output limit, updated by the caller every cycle.
    pub pos_limit: f64,
    /// Lower output limit, updated by the caller every cycle.
    pub neg_limit: f64,

    i_rate: f64,

    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
    /// Last clipped output.
    pub control: f64,

    sat: SaturationDetector,
    errors: VecDeque<f64>,
}

impl LatPidController {
    /// Creates a controller with output limits `[-1, 1]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use openpilot_lateral::selfdrive::controls::pid::{GainSchedule, LatPidController};
    ///
    /// let mut pid = LatPidController::new(
    ///     GainSchedule::constant(0.5),
    ///     GainSchedule::constant(0.0),
    ///     GainSchedule::constant(0.0),
    ///     0.0,
    ///     0.8,
    /// );
    ///
    /// let output = pid.update(2.0, 1.0, 20.0, true, false, 0.0, 0.0);
    /// assert_eq!(output, 0.5);
    /// ```
    pub fn new(kp: GainSchedule, ki: GainSchedule, kd: GainSchedule, k_f: f64, sat_limit: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            k_f,
            pos_limit: 1.0,
            neg_limit: -1.0,
            i_rate: DT_CTRL,
            p: 0.0,
            i: 0.0,
            d: 0.0,
            f: 0.0,
            control: 0.0,
            sat: SaturationDetector::new(sat_limit),
            errors: VecDeque::with_capacity(DERIVATIVE_WINDOW + 1),
        }
    }

    /// Replaces the gains with constant values.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64, k_f: f64) {
        self.kp = GainSchedule::constant(kp);
        self.ki = GainSchedule::constant(ki);
        self.kd = GainSchedule::constant(kd);
        self.k_f = k_f;
    }

    pub fn kp(&self) -> &GainSchedule {
        &self.kp
    }

    pub fn ki(&self) -> &GainSchedule {
        &self.ki
    }

    pub fn kd(&self) -> &GainSchedule {
        &self.kd
    }

    pub fn saturated(&self) -> bool {
        self.sat.saturated()
    }

    /// Current saturation timer.
    pub fn sat_count(&self) -> f64 {
        self.sat.count()
    }

    /// Clears every term, the error history and the saturation timer.
    pub fn reset(&mut self) {
        self.p = 0.0;
        self.i = 0.0;
        self.d = 0.0;
        self.f = 0.0;
        self.control = 0.0;
        self.sat.reset();
        self.errors.clear();
    }

    /// Runs one cycle and returns the clipped output.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        setpoint: f64,
        measurement: f64,
        speed: f64,
        check_saturation: bool,
        override_: bool,
        feedforward: f64,
        deadzone: f64,
    ) -> f64 {
        let error = setpoint - measurement;
        let slow_error = apply_deadzone(error, deadzone);

        self.p = error * self.kp.at(speed);
        self.f = feedforward * self.k_f;
        self.d = match self.errors.front() {
            Some(&oldest) if self.errors.len() >= DERIVATIVE_WINDOW => {
                self.kd.at(speed) * (slow_error - oldest) / DERIVATIVE_WINDOW as f64
            }
            _ => 0.0,
        };

        if !override_ {
            let i = self.i + slow_error * self.ki.at(speed) * self.i_rate;
            let control = self.p + self.f + i + self.d;

            // Only integrate when it moves the output away from a limit, or
            // when the integrator is already working against the error.
            if (slow_error >= 0.0 && (control <= self.pos_limit || i < 0.0))
                || (slow_error <= 0.0 && (control >= self.neg_limit || i > 0.0))
            {
                self.i = i;
            }
        }

        let control = self.p + self.f + self.i + self.d;
        self.control = clip(control, self.neg_limit, self.pos_limit);

        let at_limit = self.control >= self.pos_limit || self.control <= self.neg_limit;
        self.sat.update(at_limit, check_saturation);

        self.errors.push_back(slow_error);
        while self.errors.len() > DERIVATIVE_WINDOW {
            self.errors.pop_front();
        }

        self.control
    }
}
