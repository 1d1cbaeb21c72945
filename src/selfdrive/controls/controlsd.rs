//! One lateral control cycle, from perception to steering command.

use std::sync::Arc;

use log::debug;

use crate::common::params::{refresh_scaled, LiveTune, ParamsReader};
use crate::selfdrive::car_params::{CarParams, ConfigError};
use crate::selfdrive::controls::drive_helpers::{desired_steer_angle, VehicleModel};
use crate::selfdrive::controls::lane_planner::{CurvatureOffsetAdj, LanePlanner, ModelOutput, PathPoint};
use crate::selfdrive::controls::lat_control::{CarState, LatControl, LatControlLog, LateralPlan};

/// Result of one control cycle.
#[derive(Debug, Clone)]
pub struct ControlsOutput {
    /// Steering command, within the speed-dependent limit.
    pub steer: f64,
    /// Desired steering angle reported by the controller, degrees.
    pub angle_steers_des: f64,
    /// Plan handed to the controller.
    pub lat_plan: LateralPlan,
    /// Prior path with the lane lines blended in.
    pub path: Vec<PathPoint>,
    /// Lane line confidence used for the blend.
    pub d_prob: f64,
    pub log: LatControlLog,
}

/// Lane tracking, path blending and lateral control run together.
#[derive(Debug)]
pub struct Controls {
    lane_planner: LanePlanner,
    lat_control: LatControl,
    vm: VehicleModel,
    params: Arc<dyn ParamsReader>,
    live_tune: LiveTune,
}

impl Controls {
    /// Builds the pipeline for one vehicle.
    ///
    /// The curve lean adjustment is read from `params` right away, whether or
    /// not live tuning is enabled. Later changes are picked up on the live tune
    /// cadence.
    ///
    /// # Arguments
    ///
    /// * `cp` - Static vehicle parameters, including the lateral tuning.
    /// * `params` - Tunables store shared with the controller.
    ///
    /// # Returns
    ///
    /// (`Controls`): The pipeline, or the [`ConfigError`] raised while building the controller.
    pub fn new(cp: &CarParams, params: Arc<dyn ParamsReader>) -> Result<Self, ConfigError> {
        let lat_control = LatControl::from_car_params(cp, params.clone())?;
        let mut controls = Self {
            lane_planner: LanePlanner::new(cp.camera_offset),
            lat_control,
            vm: VehicleModel::from_car_params(cp),
            params,
            live_tune: LiveTune::default(),
        };
        controls.refresh_lean();
        Ok(controls)
    }

    pub fn lane_planner(&self) -> &LanePlanner {
        &self.lane_planner
    }

    pub fn lat_control(&self) -> &LatControl {
        &self.lat_control
    }

    pub fn reset(&mut self) {
        self.lat_control.reset();
    }

    fn refresh_lean(&mut self) {
        let mut adj: CurvatureOffsetAdj = self.lane_planner.curvature_offset_adj();
        let params = self.params.as_ref();
        refresh_scaled(params, "LeftCurvOffsetAdj", 1.0, &mut adj.left);
        refresh_scaled(params, "RightCurvOffsetAdj", 1.0, &mut adj.right);
        debug!("Curve lean adjustment: {:?}", adj);
        self.lane_planner.set_curvature_offset_adj(adj);
    }

    /// Runs one cycle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use openpilot_lateral::common::params::MemoryParams;
    /// use openpilot_lateral::selfdrive::car_params::CarParams;
    /// use openpilot_lateral::selfdrive::controls::controlsd::Controls;
    /// use openpilot_lateral::selfdrive::controls::lane_planner::{ModelOutput, PathPoint};
    /// use openpilot_lateral::selfdrive::controls::lat_control::CarState;
    ///
    /// let cp = CarParams::load("params/hyundai_pid.toml").unwrap();
    /// let mut controls = Controls::new(&cp, Arc::new(MemoryParams::default())).unwrap();
    ///
    /// let prior: Vec<PathPoint> = (0..33).map(|i| PathPoint::new(i as f64 * 3.0, 0.0, 0.0)).collect();
    /// let cs = CarState { v_ego: 15.0, ..Default::default() };
    ///
    /// let out = controls.step(&ModelOutput::default(), &cs, prior, true, 0.0);
    /// assert!(out.steer.abs() <= 1.0);
    /// assert!(out.log.active());
    /// ```
    pub fn step(
        &mut self,
        md: &ModelOutput,
        cs: &CarState,
        prior_path: Vec<PathPoint>,
        active: bool,
        angle_offset_deg: f64,
    ) -> ControlsOutput {
        if self.live_tune.tick(self.params.as_ref()) {
            self.refresh_lean();
        }

        self.lane_planner.ingest(md, cs.v_ego, cs.mode_select, cs.curvature);
        let path = self.lane_planner.blend(prior_path, cs.v_ego);

        let (steering_angle_deg, curvature) = desired_steer_angle(&path, cs.v_ego, &self.vm, angle_offset_deg);
        let lat_plan = LateralPlan {
            steering_angle_deg,
            angle_offset_deg,
            curvature,
        };

        let (steer, angle_steers_des, log) = self.lat_control.update(active, cs, &lat_plan);

        ControlsOutput {
            steer,
            angle_steers_des,
            lat_plan,
            path,
            d_prob: self.lane_planner.d_prob,
            log,
        }
    }
}
