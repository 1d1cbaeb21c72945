use std::sync::Arc;

use log::info;

use crate::common::params::ParamsReader;
use crate::selfdrive::car_params::{CarParams, ConfigError, LateralTuning};
use crate::selfdrive::controls::lat_control_lqr::LatControlLqr;
use crate::selfdrive::controls::lat_control_pid::LatControlPid;

/// Below this speed lateral control is held neutral, m/s.
pub const MIN_STEER_SPEED: f64 = 0.3;

/// Car state struct.
#[derive(Debug, Clone, Default)]
pub struct CarState {
    /// Ego vehicle speed, m/s.
    pub v_ego: f64,
    /// Measured steering wheel angle, degrees.
    pub steering_angle_deg: f64,
    /// Measured steering wheel rate, degrees/s.
    pub steering_rate_deg: f64,
    /// Indicates if the driver is steering.
    pub steering_pressed: bool,
    /// Indicates if the steering command is being rate limited.
    pub steering_rate_limited: bool,
    /// Torque measured at the steering actuator.
    pub steering_torque_eps: f64,
    /// Driving mode selected by the user; picks the lean policy.
    pub mode_select: i32,
    /// Current path curvature, 1/m.
    pub curvature: f64,
}

/// Lateral plan struct.
#[derive(Debug, Clone, Default)]
pub struct LateralPlan {
    /// Desired steering wheel angle, degrees, offset included.
    pub steering_angle_deg: f64,
    /// Steering angle offset, degrees.
    pub angle_offset_deg: f64,
    /// Desired path curvature, 1/m.
    pub curvature: f64,
}

/// Diagnostics of one LQR cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LqrLog {
    pub active: bool,
    /// Observer's steering angle estimate, offset included.
    pub steering_angle_deg: f64,
    pub i: f64,
    pub output: f64,
    /// Output of the state-feedback law alone.
    pub lqr_output: f64,
    pub saturated: bool,
}

/// Diagnostics of one PID cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidLog {
    pub active: bool,
    pub steering_angle_deg: f64,
    pub steering_rate_deg: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
    pub output: f64,
    pub saturated: bool,
}

/// Diagnostics of the controller that ran this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LatControlLog {
    Lqr(LqrLog),
    Pid(PidLog),
}

impl LatControlLog {
    pub fn active(&self) -> bool {
        match self {
            LatControlLog::Lqr(log) => log.active,
            LatControlLog::Pid(log) => log.active,
        }
    }

    pub fn saturated(&self) -> bool {
        match self {
            LatControlLog::Lqr(log) => log.saturated,
            LatControlLog::Pid(log) => log.saturated,
        }
    }

    /// Steering command reported by the controller.
    pub fn output(&self) -> f64 {
        match self {
            LatControlLog::Lqr(log) => log.output,
            LatControlLog::Pid(log) => log.output,
        }
    }
}

/// Represents lateral control logic.
///
/// Exactly one controller is chosen from the car parameters at startup.
#[derive(Debug)]
pub enum LatControl {
    Lqr(LatControlLqr),
    Pid(LatControlPid),
}

impl LatControl {
    /// Builds the controller named by `cp.lateral_tuning`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use openpilot_lateral::common::params::MemoryParams;
    /// use openpilot_lateral::selfdrive::car_params::CarParams;
    /// use openpilot_lateral::selfdrive::controls::lat_control::{CarState, LatControl, LateralPlan};
    ///
    /// let cp = CarParams::load("params/hyundai_lqr.toml").unwrap();
    /// let mut lac = LatControl::from_car_params(&cp, Arc::new(MemoryParams::default())).unwrap();
    ///
    /// let cs = CarState { v_ego: 0.0, ..Default::default() };
    /// let (output, _, log) = lac.update(true, &cs, &LateralPlan::default());
    /// assert_eq!(output, 0.0);
    /// assert!(!log.active());
    /// ```
    pub fn from_car_params(cp: &CarParams, params: Arc<dyn ParamsReader>) -> Result<Self, ConfigError> {
        cp.validate()?;
        let lac = match &cp.lateral_tuning {
            LateralTuning::Lqr(_) => LatControl::Lqr(LatControlLqr::new(cp, params)?),
            LateralTuning::Pid(_) => LatControl::Pid(LatControlPid::new(cp, params)?),
        };
        info!("Lateral control: {}", cp.lateral_tuning.name());
        Ok(lac)
    }

    /// Runs one control cycle.
    ///
    /// # Arguments
    ///
    /// * `active` - Whether lateral control is engaged.
    /// * `cs` - Current vehicle state.
    /// * `lat_plan` - Desired steering angle and curvature for this cycle.
    ///
    /// # Returns
    ///
    /// (`f64`, `f64`, `LatControlLog`): The steering command, the desired steering angle in degrees and the
    /// cycle's diagnostics.
    pub fn update(&mut self, active: bool, cs: &CarState, lat_plan: &LateralPlan) -> (f64, f64, LatControlLog) {
        match self {
            LatControl::Lqr(lqr) => lqr.update(active, cs, lat_plan),
            LatControl::Pid(pid) => pid.update(active, cs, lat_plan),
        }
    }

    pub fn reset(&mut self) {
        match self {
            LatControl::Lqr(lqr) => lqr.reset(),
            LatControl::Pid(pid) => pid.reset(),
        }
    }
}
