use std::sync::Arc;

use log::debug;

use crate::common::params::{refresh_scaled, LiveTune, ParamsReader};
use crate::selfdrive::car_params::{CarParams, ConfigError, DesiredAngleSource, LateralTuning};
use crate::selfdrive::controls::drive_helpers::{get_steer_max, VehicleModel};
use crate::selfdrive::controls::lat_control::{CarState, LatControlLog, LateralPlan, PidLog, MIN_STEER_SPEED};
use crate::selfdrive::controls::pid::{GainSchedule, LatPidController};
use crate::selfdrive::controls::saturation::check_saturation;

/// Speed-dependent feedforward gain applied to the desired steering angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedforwardModel {
    /// `v^2`.
    Legacy,
    /// `c1 v^2 + c2 v + c3`.
    Tuned { c1: f64, c2: f64, c3: f64 },
}

impl FeedforwardModel {
    /// Quadratic fitted against logged steering data.
    pub const TUNED: FeedforwardModel = FeedforwardModel::Tuned {
        c1: 0.35189607550172824,
        c2: 7.506201251644202,
        c3: 69.226826411091,
    };

    pub fn from_flag(new_kf_tuned: bool) -> Self {
        if new_kf_tuned {
            Self::TUNED
        } else {
            FeedforwardModel::Legacy
        }
    }

    /// Feedforward gain at `v_ego`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use openpilot_lateral::selfdrive::controls::lat_control_pid::FeedforwardModel;
    ///
    /// assert_eq!(FeedforwardModel::Legacy.scale(10.0), 100.0);
    /// assert!(FeedforwardModel::TUNED.scale(10.0) > 100.0);
    /// ```
    pub fn scale(&self, v_ego: f64) -> f64 {
        match *self {
            FeedforwardModel::Legacy => v_ego.powi(2),
            FeedforwardModel::Tuned { c1, c2, c3 } => c1 * v_ego.powi(2) + c2 * v_ego + c3,
        }
    }
}

/// Gains set from the tunable store.
#[derive(Debug, Clone, PartialEq)]
pub struct PidTuning {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
    /// Error band ignored by the integral and derivative terms, degrees.
    pub deadzone: f64,
}

/// PID steering controller with speed-scaled feedforward.
#[derive(Debug)]
pub struct LatControlPid {
    cp: CarParams,
    pid: LatPidController,
    feedforward: FeedforwardModel,
    source: DesiredAngleSource,
    vm: VehicleModel,
    tuning: PidTuning,
    angle_steers_des: f64,

    params: Arc<dyn ParamsReader>,
    live_tune: LiveTune,
}

impl LatControlPid {
    /// Creates a PID lateral controller.
    ///
    /// # Arguments
    ///
    /// * `cp` - Vehicle parameters; `lateral_tuning` must be the `pid` variant.
    /// * `params` - Tunables store, read every 300 cycles when live tuning is on.
    ///
    /// # Returns
    ///
    /// (`LatControlPid`): The controller, or [`ConfigError::WrongTuning`] for an LQR tuning.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use openpilot_lateral::common::params::MemoryParams;
    /// use openpilot_lateral::selfdrive::car_params::CarParams;
    /// use openpilot_lateral::selfdrive::controls::lat_control_pid::LatControlPid;
    ///
    /// let cp = CarParams::load("params/hyundai_pid.toml").unwrap();
    /// let pid = LatControlPid::new(&cp, Arc::new(MemoryParams::default())).unwrap();
    /// assert_eq!(pid.tuning().kp, 0.25);
    ///
    /// let lqr = CarParams::load("params/hyundai_lqr.toml").unwrap();
    /// assert!(LatControlPid::new(&lqr, Arc::new(MemoryParams::default())).is_err());
    /// ```
    pub fn new(cp: &CarParams, params: Arc<dyn ParamsReader>) -> Result<Self, ConfigError> {
        let tune = match &cp.lateral_tuning {
            LateralTuning::Pid(pid) => pid,
            other => {
                return Err(ConfigError::WrongTuning {
                    expected: "pid",
                    found: other.name(),
                })
            }
        };

        let kp = GainSchedule::new(tune.kp_bp.clone(), tune.kp_v.clone());
        let ki = GainSchedule::new(tune.ki_bp.clone(), tune.ki_v.clone());
        let kd = GainSchedule::new(tune.kd_bp.clone(), tune.kd_v.clone());

        // Live tuning starts from the high-speed end of each schedule.
        let last = |v: &[f64]| v.last().copied().unwrap_or(0.0);
        let tuning = PidTuning {
            kp: last(&tune.kp_v),
            ki: last(&tune.ki_v),
            kd: last(&tune.kd_v),
            kf: tune.kf,
            deadzone: tune.deadzone,
        };

        Ok(Self {
            cp: cp.clone(),
            pid: LatPidController::new(kp, ki, kd, tune.kf, cp.steer_limit_timer),
            feedforward: FeedforwardModel::from_flag(tune.new_kf_tuned),
            source: tune.desired_angle_source,
            vm: VehicleModel::from_car_params(cp),
            tuning,
            angle_steers_des: 0.0,
            params,
            live_tune: LiveTune::default(),
        })
    }

    /// Underlying PID state.
    pub fn pid(&self) -> &LatPidController {
        &self.pid
    }

    /// Gains currently set from the tunable store.
    pub fn tuning(&self) -> &PidTuning {
        &self.tuning
    }

    pub fn feedforward(&self) -> FeedforwardModel {
        self.feedforward
    }

    pub fn reset(&mut self) {
        self.pid.reset();
    }

    fn refresh_tuning(&mut self) {
        let params = self.params.as_ref();
        let mut gains_changed = false;
        gains_changed |= refresh_scaled(params, "PidKp", 0.01, &mut self.tuning.kp);
        gains_changed |= refresh_scaled(params, "PidKi", 0.001, &mut self.tuning.ki);
        gains_changed |= refresh_scaled(params, "PidKd", 0.01, &mut self.tuning.kd);
        gains_changed |= refresh_scaled(params, "PidKf", 0.00001, &mut self.tuning.kf);
        refresh_scaled(params, "IgnoreZone", 0.1, &mut self.tuning.deadzone);
        self.tuning.deadzone = self.tuning.deadzone.max(0.0);

        if gains_changed {
            let t = &self.tuning;
            self.pid.set_gains(t.kp, t.ki, t.kd, t.kf);
        }
        debug!("PID tuning: {:?}", self.tuning);
    }

    fn desired_angle(&self, v_ego: f64, lat_plan: &LateralPlan) -> f64 {
        match self.source {
            DesiredAngleSource::Angle => lat_plan.steering_angle_deg,
            DesiredAngleSource::Curvature => {
                self.vm.steer_angle_from_curvature(v_ego, lat_plan.curvature) + lat_plan.angle_offset_deg
            }
        }
    }

    /// Runs one cycle; returns the steering command, the desired angle and
    /// the diagnostics.
    ///
    /// While `cs.steering_pressed` is set the integrator keeps its value.
    pub fn update(&mut self, active: bool, cs: &CarState, lat_plan: &LateralPlan) -> (f64, f64, LatControlLog) {
        if self.live_tune.tick(self.params.as_ref()) {
            self.refresh_tuning();
        }

        let mut log = PidLog {
            steering_angle_deg: cs.steering_angle_deg,
            steering_rate_deg: cs.steering_rate_deg,
            ..Default::default()
        };

        let output_steer = if cs.v_ego < MIN_STEER_SPEED || !active {
            self.pid.reset();
            0.0
        } else {
            self.angle_steers_des = self.desired_angle(cs.v_ego, lat_plan);

            let steers_max = get_steer_max(&self.cp, cs.v_ego);
            self.pid.pos_limit = steers_max;
            self.pid.neg_limit = -steers_max;

            // Feedforward is proportional to the angle without the offset.
            let steer_feedforward =
                (self.angle_steers_des - lat_plan.angle_offset_deg) * self.feedforward.scale(cs.v_ego);

            let output_steer = self.pid.update(
                self.angle_steers_des,
                cs.steering_angle_deg,
                cs.v_ego,
                check_saturation(cs),
                cs.steering_pressed,
                steer_feedforward,
                self.tuning.deadzone,
            );

            log.active = true;
            log.p = self.pid.p;
            log.i = self.pid.i;
            log.d = self.pid.d;
            log.f = self.pid.f;
            log.saturated = self.pid.saturated();
            output_steer
        };
        log.output = output_steer;

        (output_steer, self.angle_steers_des, LatControlLog::Pid(log))
    }
}
