use crate::common::numeric::interp;
use crate::selfdrive::car_params::CarParams;
use crate::selfdrive::controls::lane_planner::PathPoint;

/// Speed-dependent steering limit.
///
/// # Arguments
///
/// * `cp` - Vehicle parameters holding the `steer_max_bp` / `steer_max_v` table.
/// * `v_ego` - Vehicle speed in m/s.
///
/// # Returns
///
/// (`f64`): The largest steering command allowed at `v_ego`.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::selfdrive::car_params::CarParams;
/// use openpilot_lateral::selfdrive::controls::drive_helpers::get_steer_max;
///
/// let cp = CarParams::load("params/hyundai_pid.toml").unwrap();
/// assert_eq!(get_steer_max(&cp, 20.0), 1.0);
/// ```
pub fn get_steer_max(cp: &CarParams, v_ego: f64) -> f64 {
    interp(&cp.steer_max_bp, &cp.steer_max_v, v_ego)
}

/// Linear steering model relating steering wheel angle and path curvature.
#[derive(Debug, Clone)]
pub struct VehicleModel {
    /// Steering ratio of the vehicle.
    pub steer_ratio: f64,
    /// Wheelbase of the vehicle.
    pub wheelbase: f64,
    /// Slip factor of the vehicle.
    pub slip_factor: f64,
}

impl VehicleModel {
    pub fn from_car_params(cp: &CarParams) -> Self {
        Self {
            steer_ratio: cp.steer_ratio,
            wheelbase: cp.wheelbase,
            slip_factor: cp.slip_factor,
        }
    }

    fn curvature_factor(&self, v_ego: f64) -> f64 {
        self.steer_ratio * self.wheelbase * (1. + self.slip_factor * v_ego.powi(2))
    }

    /// Steering wheel angle (degrees, offset excluded) needed for `curvature`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use openpilot_lateral::selfdrive::controls::drive_helpers::VehicleModel;
    ///
    /// let vm = VehicleModel { steer_ratio: 15.0, wheelbase: 2.5, slip_factor: 0.02 };
    /// assert!(vm.steer_angle_from_curvature(20.0, 0.001) > 0.0);
    /// assert_eq!(vm.steer_angle_from_curvature(20.0, 0.0), 0.0);
    /// ```
    pub fn steer_angle_from_curvature(&self, v_ego: f64, curvature: f64) -> f64 {
        (curvature * self.curvature_factor(v_ego)).to_degrees()
    }
}

/// Lookahead distance used to steer onto the path, growing with speed.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::selfdrive::controls::drive_helpers::calc_d_lookahead;
///
/// assert!(calc_d_lookahead(25.0) > calc_d_lookahead(5.0));
/// assert_eq!(calc_d_lookahead(-3.0), 1.0);
/// ```
pub fn calc_d_lookahead(v_ego: f64) -> f64 {
    let offset_lookahead = 1.0;
    let coeff_lookahead = 4.4;
    offset_lookahead + (v_ego.max(0.0)).sqrt() * coeff_lookahead
}

/// Curvature of the arc through the origin and the point `y_des` to the side
/// at `d_lookahead` ahead.
pub fn calc_lookahead_curvature(d_lookahead: f64, y_des: f64) -> f64 {
    (2.0 * y_des / d_lookahead).atan().sin() / d_lookahead
}

/// Steering wheel angle (degrees, offset included) that steers onto `path`.
///
/// The path's lateral offset is read at the speed-dependent lookahead and
/// converted to an arc curvature, then to a steering angle.
///
/// # Arguments
///
/// * `path` - Blended path, sorted by `x`.
/// * `v_ego` - Vehicle speed in m/s.
/// * `vm` - Steering model of the vehicle.
/// * `angle_offset` - Steering angle offset in degrees.
///
/// # Returns
///
/// (`f64`, `f64`): The desired steering angle in degrees and the path curvature in 1/m.
pub fn desired_steer_angle(path: &[PathPoint], v_ego: f64, vm: &VehicleModel, angle_offset: f64) -> (f64, f64) {
    let d_lookahead = calc_d_lookahead(v_ego);
    let xs: Vec<f64> = path.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = path.iter().map(|p| p.y).collect();
    let y_des = interp(&xs, &ys, d_lookahead);

    let curvature = calc_lookahead_curvature(d_lookahead, y_des);
    (vm.steer_angle_from_curvature(v_ego, curvature) + angle_offset, curvature)
}
