/// Control loop period, s.
pub const DT_CTRL: f64 = 0.01;

pub mod controlsd;
pub mod drive_helpers;
pub mod lane_planner;
pub mod lat_control;
pub mod lat_control_lqr;
pub mod lat_control_pid;
pub mod pid;
pub mod saturation;
