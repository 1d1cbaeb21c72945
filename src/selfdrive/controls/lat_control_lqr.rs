use std::sync::Arc;

use log::debug;
use ndarray::Array1;

use crate::common::kalman::KalmanObserver;
use crate::common::numeric::{clip, unwind};
use crate::common::params::{refresh_positive, refresh_scaled, LiveTune, ParamsReader};
use crate::selfdrive::car_params::{CarParams, ConfigError, LateralTuning};
use crate::selfdrive::controls::drive_helpers::get_steer_max;
use crate::selfdrive::controls::lat_control::{CarState, LatControlLog, LateralPlan, LqrLog, MIN_STEER_SPEED};
use crate::selfdrive::controls::saturation::{check_saturation, SaturationDetector};
use crate::selfdrive::controls::DT_CTRL;

/// Gains that can be changed while driving.
#[derive(Debug, Clone, PartialEq)]
pub struct LqrTuning {
    /// Divides the state-feedback output.
    pub scale: f64,
    /// Integral gain.
    pub ki: f64,
    /// Steady-state gain from torque to steering angle.
    pub dc_gain: f64,
}

/// Kalman-observer LQR steering controller with an anti-windup integrator.
///
/// The observer estimates the steering angle and rate from the measured
/// angle and the actuator torque, every cycle, whether or not the controller
/// is engaged. The state-feedback law and the integrator only run while
/// active.
#[derive(Debug)]
pub struct LatControlLqr {
    cp: CarParams,
    tuning: LqrTuning,
    k: Array1<f64>,
    observer: KalmanObserver,

    i_unwind_rate: f64,
    i_rate: f64,
    i_lqr: f64,
    output_steer: f64,

    sat: SaturationDetector,
    params: Arc<dyn ParamsReader>,
    live_tune: LiveTune,
}

impl LatControlLqr {
    /// Creates an LQR lateral controller.
    ///
    /// # Arguments
    ///
    /// * `cp` - Vehicle parameters; `lateral_tuning` must be the `lqr` variant.
    /// * `params` - Tunables store for `Scale`, `LqrKi` and `DcGain`.
    ///
    /// # Returns
    ///
    /// (`LatControlLqr`): The controller, or a [`ConfigError`] when the tuning is
    /// not LQR or the matrices do not agree in size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use openpilot_lateral::common::params::MemoryParams;
    /// use openpilot_lateral::selfdrive::car_params::CarParams;
    /// use openpilot_lateral::selfdrive::controls::lat_control_lqr::LatControlLqr;
    ///
    /// let cp = CarParams::load("params/hyundai_lqr.toml").unwrap();
    /// let lqr = LatControlLqr::new(&cp, Arc::new(MemoryParams::default())).unwrap();
    /// assert_eq!(lqr.tuning().scale, 1500.0);
    /// assert_eq!(lqr.i_lqr(), 0.0);
    /// ```
    pub fn new(cp: &CarParams, params: Arc<dyn ParamsReader>) -> Result<Self, ConfigError> {
        let lqr = match &cp.lateral_tuning {
            LateralTuning::Lqr(lqr) => lqr,
            other => {
                return Err(ConfigError::WrongTuning {
                    expected: "lqr",
                    found: other.name(),
                })
            }
        };

        let observer = KalmanObserver::from_slices(&lqr.a, &lqr.b, &lqr.c, &lqr.l)?;
        if lqr.k.len() != observer.dim() {
            return Err(crate::common::kalman::ObserverError::Dimension {
                name: "k",
                expected: observer.dim(),
                found: lqr.k.len(),
            }
            .into());
        }

        Ok(Self {
            cp: cp.clone(),
            tuning: LqrTuning {
                scale: lqr.scale,
                ki: lqr.ki,
                dc_gain: lqr.dc_gain,
            },
            k: Array1::from(lqr.k.clone()),
            observer,
            i_unwind_rate: 0.3 * DT_CTRL,
            i_rate: DT_CTRL,
            i_lqr: 0.0,
            output_steer: 0.0,
            sat: SaturationDetector::new(cp.steer_limit_timer),
            params,
            live_tune: LiveTune::default(),
        })
    }

    /// Gains in use, after any live tune refresh.
    pub fn tuning(&self) -> &LqrTuning {
        &self.tuning
    }

    /// Integrator state.
    pub fn i_lqr(&self) -> f64 {
        self.i_lqr
    }

    pub fn observer(&self) -> &KalmanObserver {
        &self.observer
    }

    pub fn sat_count(&self) -> f64 {
        self.sat.count()
    }

    /// Clears the integrator, the output and the saturation timer.
    ///
    /// The observer keeps its estimate.
    pub fn reset(&mut self) {
        self.i_lqr = 0.0;
        self.output_steer = 0.0;
        self.sat.reset();
    }

    fn refresh_tuning(&mut self) {
        let params = self.params.as_ref();
        refresh_positive(params, "Scale", 1.0, &mut self.tuning.scale);
        refresh_scaled(params, "LqrKi", 0.001, &mut self.tuning.ki);
        refresh_positive(params, "DcGain", 0.0001, &mut self.tuning.dc_gain);
        debug!("LQR tuning: {:?}", self.tuning);
    }

    /// Runs one cycle; returns the steering command, the desired angle
    /// (offset removed) and the diagnostics.
    pub fn update(&mut self, active: bool, cs: &CarState, lat_plan: &LateralPlan) -> (f64, f64, LatControlLog) {
        if self.live_tune.tick(self.params.as_ref()) {
            self.refresh_tuning();
        }

        let steers_max = get_steer_max(&self.cp, cs.v_ego);
        let torque_scale = (0.45 + cs.v_ego.max(0.0) / 60.0).powi(2);

        // Offsets are removed so the observer only sees the real angle.
        let angle_steers_des = lat_plan.steering_angle_deg - lat_plan.angle_offset_deg;
        let steering_angle = cs.steering_angle_deg - lat_plan.angle_offset_deg;

        let angle_steers_k = self
            .observer
            .correct(steering_angle, cs.steering_torque_eps / torque_scale);

        let mut log = LqrLog {
            steering_angle_deg: angle_steers_k + lat_plan.angle_offset_deg,
            ..Default::default()
        };

        if cs.v_ego < MIN_STEER_SPEED || !active {
            self.reset();
        } else {
            log.active = true;

            let u_lqr = angle_steers_des / self.tuning.dc_gain - self.k.dot(self.observer.state());
            let lqr_output = torque_scale * u_lqr / self.tuning.scale;

            if cs.steering_pressed {
                self.i_lqr = unwind(self.i_lqr, self.i_unwind_rate);
            } else {
                let error = angle_steers_des - angle_steers_k;
                let i = self.i_lqr + self.tuning.ki * self.i_rate * error;
                let control = lqr_output + i;

                if (error >= 0.0 && (control <= steers_max || i < 0.0))
                    || (error <= 0.0 && (control >= -steers_max || i > 0.0))
                {
                    self.i_lqr = i;
                }
            }

            self.output_steer = clip(lqr_output + self.i_lqr, -steers_max, steers_max);
            log.lqr_output = lqr_output;
        }

        let at_limit = self.output_steer.abs() >= steers_max;
        log.saturated = self.sat.update(at_limit, check_saturation(cs));
        log.i = self.i_lqr;
        log.output = self.output_steer;

        (self.output_steer, angle_steers_des, LatControlLog::Lqr(log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::params::{MemoryParams, LIVE_TUNE_KEY, LIVE_TUNE_PERIOD};
    use approx::assert_abs_diff_eq;

    const LQR_TOML: &str = include_str!("../../../params/hyundai_lqr.toml");

    fn lqr_with(params: Arc<dyn ParamsReader>) -> LatControlLqr {
        let cp = CarParams::from_toml_str(LQR_TOML).unwrap();
        LatControlLqr::new(&cp, params).unwrap()
    }

    fn lqr() -> LatControlLqr {
        lqr_with(Arc::new(MemoryParams::default()))
    }

    fn driving(v_ego: f64) -> CarState {
        CarState {
            v_ego,
            ..Default::default()
        }
    }

    fn plan(angle: f64) -> LateralPlan {
        LateralPlan {
            steering_angle_deg: angle,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_pid_tuning() {
        let cp = CarParams::from_toml_str(include_str!("../../../params/hyundai_pid.toml")).unwrap();
        assert!(matches!(
            LatControlLqr::new(&cp, Arc::new(MemoryParams::default())),
            Err(ConfigError::WrongTuning { expected: "lqr", found: "pid" })
        ));
    }

    #[test]
    fn test_standstill_is_neutral() {
        let mut lqr = lqr();
        let (output, _, log) = lqr.update(true, &driving(0.0), &plan(10.0));

        assert_eq!(output, 0.0);
        assert_eq!(lqr.i_lqr(), 0.0);
        match log {
            LatControlLog::Lqr(log) => {
                assert!(!log.active);
                assert_eq!(log.i, 0.0);
                assert_eq!(log.lqr_output, 0.0);
            }
            LatControlLog::Pid(_) => panic!("expected an LQR log"),
        }
    }

    #[test]
    fn test_disengaging_resets() {
        let mut lqr = lqr();
        for _ in 0..50 {
            lqr.update(true, &driving(20.0), &plan(0.5));
        }
        assert!(lqr.i_lqr() > 0.0);

        let (output, _, log) = lqr.update(false, &driving(20.0), &plan(0.5));
        assert_eq!(output, 0.0);
        assert!(!log.active());
        assert_eq!(lqr.i_lqr(), 0.0);
        assert_eq!(lqr.sat_count(), 0.0);

        lqr.reset();
        assert_eq!(lqr.i_lqr(), 0.0);
    }

    #[test]
    fn test_feedback_law() {
        let mut lqr = lqr();
        let v_ego = 20.0;
        let (output, angle_des, log) = lqr.update(true, &driving(v_ego), &plan(0.5));

        // A zero state stays zero with no measured angle and no torque.
        assert_eq!(lqr.observer().state().sum(), 0.0);
        let torque_scale = (0.45f64 + v_ego / 60.0).powi(2);
        let expected = torque_scale * (0.5 / lqr.tuning().dc_gain) / lqr.tuning().scale;

        assert_eq!(angle_des, 0.5);
        match log {
            LatControlLog::Lqr(log) => assert_abs_diff_eq!(log.lqr_output, expected, epsilon = 1e-9),
            LatControlLog::Pid(_) => panic!("expected an LQR log"),
        }
        assert_abs_diff_eq!(output, expected + lqr.i_lqr(), epsilon = 1e-9);
    }

    #[test]
    fn test_offset_is_removed_from_target() {
        let mut lqr = lqr();
        let lat_plan = LateralPlan {
            steering_angle_deg: 3.0,
            angle_offset_deg: 1.0,
            curvature: 0.0,
        };
        let (_, angle_des, log) = lqr.update(true, &driving(20.0), &lat_plan);

        assert_eq!(angle_des, 2.0);
        match log {
            // The observer starts at zero; the reported angle adds the offset back.
            LatControlLog::Lqr(log) => assert_eq!(log.steering_angle_deg, 1.0),
            LatControlLog::Pid(_) => panic!("expected an LQR log"),
        }
    }

    #[test]
    fn test_anti_windup_at_limit() {
        let mut lqr = lqr();
        for _ in 0..200 {
            let (output, _, _) = lqr.update(true, &driving(20.0), &plan(90.0));
            assert_eq!(output, 1.0);
        }
        assert_eq!(lqr.i_lqr(), 0.0);
    }

    #[test]
    fn test_driver_override_unwinds() {
        let mut lqr = lqr();
        for _ in 0..50 {
            lqr.update(true, &driving(20.0), &plan(0.5));
        }
        assert_abs_diff_eq!(lqr.i_lqr(), 0.0025, epsilon = 1e-9);

        let pressed = CarState {
            steering_pressed: true,
            ..driving(20.0)
        };
        lqr.update(true, &pressed, &plan(0.5));
        assert_eq!(lqr.i_lqr(), 0.0);
        lqr.update(true, &pressed, &plan(0.5));
        assert_eq!(lqr.i_lqr(), 0.0);
    }

    #[test]
    fn test_output_within_limit() {
        let mut lqr = lqr();
        for k in 0..2000 {
            let t = k as f64;
            let cs = CarState {
                v_ego: 5.0 + 30.0 * (t * 0.001).sin().abs(),
                steering_angle_deg: 50.0 * (t * 0.013).cos(),
                steering_torque_eps: 3000.0 * (t * 0.007).sin(),
                steering_pressed: k % 97 < 10,
                ..Default::default()
            };
            let (output, _, log) = lqr.update(true, &cs, &plan(200.0 * (t * 0.01).sin()));

            assert!(output.abs() <= 1.0);
            assert!((0.0..=1.0).contains(&lqr.sat_count()));
            assert_eq!(log.output(), output);
        }
    }

    #[test]
    fn test_saturation_needs_sustained_limit() {
        let mut lqr = lqr();
        let mut flags = Vec::new();
        for _ in 0..120 {
            let (_, _, log) = lqr.update(true, &driving(20.0), &plan(90.0));
            flags.push(log.saturated());
        }
        assert!(!flags[..75].iter().any(|&f| f));
        assert!(flags[85..].iter().all(|&f| f));

        // Below the check speed the timer only falls.
        let mut lqr = lqr_with(Arc::new(MemoryParams::default()));
        for _ in 0..200 {
            let (_, _, log) = lqr.update(true, &driving(8.0), &plan(90.0));
            assert!(!log.saturated());
        }
        assert_eq!(lqr.sat_count(), 0.0);
    }

    #[test]
    fn test_live_tune_refresh() {
        let params = Arc::new(MemoryParams::from_pairs([
            (LIVE_TUNE_KEY, "1"),
            ("Scale", "2000"),
            ("LqrKi", "15"),
            ("DcGain", "25"),
        ]));
        let mut lqr = lqr_with(params.clone());
        let initial = lqr.tuning().clone();

        for _ in 0..LIVE_TUNE_PERIOD - 1 {
            lqr.update(true, &driving(20.0), &plan(0.0));
        }
        assert_eq!(lqr.tuning(), &initial);

        lqr.update(true, &driving(20.0), &plan(0.0));
        assert_eq!(lqr.tuning().scale, 2000.0);
        assert_abs_diff_eq!(lqr.tuning().ki, 0.015, epsilon = 1e-12);
        assert_abs_diff_eq!(lqr.tuning().dc_gain, 0.0025, epsilon = 1e-12);

        // Bad values keep the last good tuning.
        params.put("Scale", "abc");
        params.put("DcGain", "0");
        params.remove("LqrKi");
        for _ in 0..LIVE_TUNE_PERIOD {
            lqr.update(true, &driving(20.0), &plan(0.0));
        }
        assert_eq!(lqr.tuning().scale, 2000.0);
        assert_abs_diff_eq!(lqr.tuning().ki, 0.015, epsilon = 1e-12);
        assert_abs_diff_eq!(lqr.tuning().dc_gain, 0.0025, epsilon = 1e-12);
    }

    #[test]
    fn test_live_tune_disabled_keeps_config() {
        let params = Arc::new(MemoryParams::from_pairs([(LIVE_TUNE_KEY, "0"), ("Scale", "2000")]));
        let mut lqr = lqr_with(params);

        for _ in 0..LIVE_TUNE_PERIOD * 2 {
            lqr.update(true, &driving(20.0), &plan(0.0));
        }
        assert_eq!(lqr.tuning().scale, 1500.0);
    }
}
