use std::sync::Arc;

use approx::assert_abs_diff_eq;
use openpilot_lateral::common::params::{MemoryParams, ParamsReader};
use openpilot_lateral::selfdrive::car_params::CarParams;
use openpilot_lateral::selfdrive::controls::controlsd::Controls;
use openpilot_lateral::selfdrive::controls::lane_planner::{LaneLine, ModelOutput, PathPoint, TRAJECTORY_SIZE};
use openpilot_lateral::selfdrive::controls::lat_control::{CarState, LatControlLog};
use openpilot_lateral::selfdrive::thermal_status::{ThermalMonitor, ThermalReading, ThermalStatus};

const PARAM_FILES: [&str; 2] = ["params/hyundai_lqr.toml", "params/hyundai_pid.toml"];

fn grid() -> Vec<f64> {
    (0..TRAJECTORY_SIZE).map(|i| i as f64 * 3.0).collect()
}

fn line(y: f64, prob: f64) -> LaneLine {
    LaneLine {
        x: grid(),
        y: vec![y; TRAJECTORY_SIZE],
        prob,
        std: 0.1,
    }
}

fn model(left_y: f64, right_y: f64, left_prob: f64, right_prob: f64) -> ModelOutput {
    ModelOutput {
        lane_lines: vec![
            line(left_y - 3.7, 0.3),
            line(left_y, left_prob),
            line(right_y, right_prob),
            line(right_y + 3.7, 0.3),
        ],
        desire_state: vec![0.0; 8],
    }
}

fn prior_path(y: f64) -> Vec<PathPoint> {
    grid().into_iter().map(|x| PathPoint::new(x, y, 0.0)).collect()
}

fn controls(path: &str, params: Arc<dyn ParamsReader>) -> (CarParams, Controls) {
    let mut cp = CarParams::load(path).unwrap();
    cp.camera_offset = 0.0;
    let controls = Controls::new(&cp, params).unwrap();
    (cp, controls)
}

fn driving(v_ego: f64) -> CarState {
    CarState {
        v_ego,
        ..Default::default()
    }
}

#[test]
fn symmetric_lane_keeps_center() {
    for file in PARAM_FILES {
        let (_, mut controls) = controls(file, Arc::new(MemoryParams::default()));
        let out = controls.step(&model(-1.85, 1.85, 1.0, 1.0), &driving(10.0), prior_path(0.8), true, 0.0);

        assert_eq!(out.path.len(), TRAJECTORY_SIZE);
        for p in &out.path {
            assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn left_line_only_follows_left_candidate() {
    let (_, mut controls) = controls(PARAM_FILES[1], Arc::new(MemoryParams::default()));
    let out = controls.step(&model(-1.85, 1.85, 1.0, 0.0), &driving(10.0), prior_path(3.0), true, 0.0);

    let lane_width = controls.lane_planner().lane_width.min(4.0);
    for p in &out.path {
        assert_abs_diff_eq!(p.y, -1.85 + lane_width / 2.0, epsilon = 1e-3);
    }
}

#[test]
fn wide_corridor_keeps_prior_path() {
    let (_, mut controls) = controls(PARAM_FILES[0], Arc::new(MemoryParams::default()));
    let prior = prior_path(-0.25);
    let out = controls.step(&model(-3.0, 3.0, 1.0, 1.0), &driving(10.0), prior.clone(), true, 0.0);

    assert_eq!(out.d_prob, 0.0);
    assert_eq!(out.path, prior);
}

#[test]
fn standstill_is_neutral() {
    for file in PARAM_FILES {
        let (_, mut controls) = controls(file, Arc::new(MemoryParams::default()));
        let out = controls.step(&model(-1.0, 2.7, 1.0, 1.0), &driving(0.0), prior_path(0.0), true, 0.0);

        assert_eq!(out.steer, 0.0);
        assert!(!out.log.active());
        match out.log {
            LatControlLog::Lqr(log) => assert_eq!(log.i, 0.0),
            LatControlLog::Pid(log) => assert_eq!(log.i, 0.0),
        }
    }
}

#[test]
fn long_drive_stays_within_limits() {
    for file in PARAM_FILES {
        let params = Arc::new(MemoryParams::from_pairs([
            ("OpkrLiveTune", "1"),
            ("LeftCurvOffsetAdj", "-3"),
            ("RightCurvOffsetAdj", "2"),
        ]));
        let (cp, mut controls) = controls(file, params);

        for k in 0..3000 {
            let t = k as f64;
            let drift = 0.8 * (t * 0.004).sin();
            let md = model(
                -1.85 + drift,
                1.85 + drift,
                0.5 + 0.5 * (t * 0.01).cos().abs(),
                0.5 + 0.5 * (t * 0.017).sin().abs(),
            );
            let cs = CarState {
                v_ego: 2.0 + 28.0 * (t * 0.0015).sin().abs(),
                steering_angle_deg: 20.0 * (t * 0.009).sin(),
                steering_rate_deg: 5.0 * (t * 0.009).cos(),
                steering_pressed: k % 211 < 15,
                steering_torque_eps: 500.0 * (t * 0.02).sin(),
                mode_select: (k / 500) as i32 % 4,
                curvature: 0.002 * (t * 0.003).sin(),
                ..Default::default()
            };

            let out = controls.step(&md, &cs, prior_path(0.3 * (t * 0.005).cos()), true, 0.5);
            let steer_max = cp.steer_max_v[0];

            assert!(out.steer.is_finite());
            assert!(out.steer.abs() <= steer_max);
            assert!((0.0..=1.0).contains(&out.d_prob));
            assert_eq!(out.log.output(), out.steer);
        }
    }
}

#[test]
fn sustained_limit_flags_saturation() {
    for file in PARAM_FILES {
        let (_, mut controls) = controls(file, Arc::new(MemoryParams::default()));
        // Lane far to the left while the wheel stays centered.
        let md = model(1.0, 4.5, 1.0, 1.0);

        let mut flags = Vec::new();
        for _ in 0..200 {
            let out = controls.step(&md, &driving(20.0), prior_path(0.0), true, 0.0);
            flags.push(out.log.saturated());
        }
        assert!(!flags[0]);
        assert!(*flags.last().unwrap());
    }
}

#[test]
fn thermal_status_gates_engagement() {
    let mut monitor = ThermalMonitor::default();
    let hot = ThermalReading {
        cpu_temp_c: 110.0,
        ..Default::default()
    };

    for _ in 0..200 {
        monitor.update(&hot);
    }
    let status = monitor.status();
    assert_eq!(status, ThermalStatus::Danger);
    assert!(!status.engage_allowed());
    assert!(!status.onroad_allowed());
}
