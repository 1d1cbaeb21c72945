//! # openpilot-lateral
//!
//! `openpilot-lateral` is a Rust crate that turns lane line observations from a perception model into steering
//! commands. It tracks the two lane lines closest to the vehicle, blends them into the model's planned path
//! according to how much they can be trusted, and steers onto that path with either an LQR or a PID controller.
//!
//! ## Modules
//!
//! `openpilot-lateral` is organized into several modules, each serving a specific purpose:
//!
//! - [LanePlanner](selfdrive/controls/lane_planner/struct.LanePlanner.html): Smooths lane line geometry, estimates
//!   the lane width and blends the lane center into the planned path.
//!
//! - [LatControlLqr](selfdrive/controls/lat_control_lqr/struct.LatControlLqr.html): Kalman-observer LQR steering
//!   controller with an anti-windup integrator.
//!
//! - [LatControlPid](selfdrive/controls/lat_control_pid/struct.LatControlPid.html): PID steering controller with
//!   speed-scaled feedforward and an integrator deadzone.
//!
//! - [LatControl](selfdrive/controls/lat_control/enum.LatControl.html): The controller selected by the car
//!   parameters.
//!
//! - [Controls](selfdrive/controls/controlsd/struct.Controls.html): One full cycle, from model output to steering
//!   command.
//!
//! - [ParamsReader](common/params/trait.ParamsReader.html): Read-only access to live tunables, refreshed every
//!   300 control cycles.
//!
//! - [ThermalStatus](selfdrive/thermal_status/enum.ThermalStatus.html): Hysteresis bands deciding whether the
//!   device is cool enough to engage.
//!
//! ## Usage
//!
//! To use the `openpilot-lateral` crate in your project, add the following line to your `Cargo.toml` file:
//!
//! ```toml
//! [dependencies]
//! openpilot-lateral = "0.1.0"
//! ```
//!
//! Vehicle parameters are read from a TOML file; see `params/` for an LQR and a PID tuning.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use openpilot_lateral::common::params::MemoryParams;
//! use openpilot_lateral::selfdrive::car_params::CarParams;
//! use openpilot_lateral::selfdrive::controls::controlsd::Controls;
//! use openpilot_lateral::selfdrive::controls::lane_planner::{LaneLine, ModelOutput, PathPoint, TRAJECTORY_SIZE};
//! use openpilot_lateral::selfdrive::controls::lat_control::CarState;
//!
//! // Load the vehicle and build the configured controller
//! let cp = CarParams::load("params/hyundai_lqr.toml").unwrap();
//! let params = Arc::new(MemoryParams::from_pairs([("OpkrLiveTune", "1"), ("LqrKi", "15")]));
//! let mut controls = Controls::new(&cp, params).unwrap();
//!
//! // A straight lane, 3.7 m wide, seen with full confidence
//! let grid: Vec<f64> = (0..TRAJECTORY_SIZE).map(|i| i as f64 * 3.0).collect();
//! let line = |y: f64| LaneLine { x: grid.clone(), y: vec![y; TRAJECTORY_SIZE], prob: 1.0, std: 0.05 };
//! let md = ModelOutput {
//!     lane_lines: vec![line(-5.55), line(-1.85), line(1.85), line(5.55)],
//!     desire_state: vec![],
//! };
//! let prior: Vec<PathPoint> = grid.iter().map(|&x| PathPoint::new(x, 0.4, 0.0)).collect();
//!
//! let cs = CarState { v_ego: 20.0, ..Default::default() };
//! let out = controls.step(&md, &cs, prior, true, 0.0);
//!
//! // The lane lines win over the drifting model path; the camera sits off-center
//! assert!(out.d_prob > 0.99);
//! assert!(out.path.iter().all(|p| (p.y + cp.camera_offset).abs() < 0.01));
//! assert!(out.steer.abs() <= 1.0);
//! ```
//!
//! ## Contributing
//!
//! Contributions and feedback are welcome! If you'd like to contribute, report an issue, or suggest an enhancement,
//! please open an issue on the project's repository.
//!
//! ## License
//!
//! This project is licensed under the [MIT License](LICENSE).

pub mod common;
pub mod selfdrive;
