//! Lane line tracking and path blending.
//!
//! [`LanePlanner::ingest`] keeps a smoothed picture of the two lane lines
//! closest to the vehicle. [`LanePlanner::blend`] fuses them into a lateral
//! path and mixes that into the model's own path according to how much the
//! lane lines can be trusted.

use log::debug;

use crate::common::filters::FirstOrderFilter;
use crate::common::numeric::interp;

/// Number of samples in every lane line and path.
pub const TRAJECTORY_SIZE: usize = 33;

/// Number of lane lines the model reports, outer-left to outer-right.
pub const LANE_LINE_COUNT: usize = 4;

/// Index of the lane-change-left entry in the desire distribution.
pub const DESIRE_LANE_CHANGE_LEFT: usize = 3;

/// Index of the lane-change-right entry in the desire distribution.
pub const DESIRE_LANE_CHANGE_RIGHT: usize = 4;

/// Cruise mode that biases the path slightly to the left.
const LEAN_MODE_SELECT: i32 = 3;

/// Curvature magnitude above which the curve lean kicks in.
const LEAN_CURVATURE: f64 = 0.0008;

/// Minimum speed for the curve lean, m/s.
const LEAN_MIN_SPEED: f64 = 8.0;

const LANE_DIFFER_MAX: f64 = 0.6;

/// Probability demotion by corridor width.
const WIDTH_MOD_BP: [f64; 2] = [4.0, 5.0];
const WIDTH_MOD_V: [f64; 2] = [1.0, 0.0];
const WIDTH_CHECK_TIMES: [f64; 3] = [0.0, 1.5, 3.0];

/// Probability demotion by lane line uncertainty.
const STD_MOD_BP: [f64; 2] = [0.15, 0.3];
const STD_MOD_V: [f64; 2] = [1.0, 0.0];

/// Nominal lane width by speed.
const SPEED_LANE_WIDTH_BP: [f64; 2] = [0.0, 31.0];
const SPEED_LANE_WIDTH_V: [f64; 2] = [2.8, 3.5];

const MAX_LANE_WIDTH: f64 = 4.0;

/// One lane line as reported by the perception model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneLine {
    /// Longitudinal distance of each sample, m.
    pub x: Vec<f64>,
    /// Lateral offset of each sample, m.
    pub y: Vec<f64>,
    /// Probability that the line exists.
    pub prob: f64,
    /// Standard deviation of the lateral offset near the vehicle, m.
    pub std: f64,
}

/// The part of a perception model frame used for lateral planning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
    pub lane_lines: Vec<LaneLine>,
    /// Probability of each driver desire, indexed by desire.
    pub desire_state: Vec<f64>,
}

impl ModelOutput {
    /// Whether the frame carries the four full lane lines the tracker needs.
    pub fn has_valid_lane_lines(&self) -> bool {
        self.lane_lines.len() == LANE_LINE_COUNT
            && self
                .lane_lines
                .iter()
                .all(|ll| ll.x.len() == TRAJECTORY_SIZE && ll.y.len() == TRAJECTORY_SIZE)
    }
}

/// One sample of a planned path.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathPoint {
    /// Longitudinal, m.
    pub x: f64,
    /// Lateral, m.
    pub y: f64,
    /// Vertical, m.
    pub z: f64,
}

impl PathPoint {
    /// Creates a path sample at `(x, y, z)` meters.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Per-side curve lean adjustment, as configured by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurvatureOffsetAdj {
    pub left: f64,
    pub right: f64,
}

/// Lateral bias added to both lane lines.
///
/// A base bias of `-0.1` m applies in cruise mode 3. When either curve
/// adjustment is set and the vehicle is above 8 m/s the base bias is
/// replaced by the curve lean:
///
/// | curvature   | adjustment  | `lane_differ` | lean                         |
/// |-------------|-------------|---------------|------------------------------|
/// | `> 0.0008`  | left `< 0`  | `>= 0`        | `+abs(left) * d * 0.05`      |
/// | `> 0.0008`  | left `> 0`  | `<= 0`        | `-abs(left) * d * 0.05`      |
/// | `< -0.0008` | right `< 0` | `>= 0`        | `+abs(right) * d * 0.05`     |
/// | `< -0.0008` | right `> 0` | `<= 0`        | `-abs(right) * d * 0.05`     |
/// | otherwise   |             |               | `0`                          |
///
/// where `d` is `lane_differ` capped at 0.6. The first matching row wins.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::selfdrive::controls::lane_planner::{lean_offset, CurvatureOffsetAdj};
///
/// let adj = CurvatureOffsetAdj { left: -4.0, right: 0.0 };
/// assert_eq!(lean_offset(0, 20.0, 0.002, adj, 0.2), 4.0 * 0.2 * 0.05);
/// assert_eq!(lean_offset(3, 5.0, 0.002, adj, 0.2), -0.1);
/// ```
pub fn lean_offset(
    mode_select: i32,
    v_ego: f64,
    curvature: f64,
    adj: CurvatureOffsetAdj,
    lane_differ: f64,
) -> f64 {
    let base = if mode_select == LEAN_MODE_SELECT { -0.1 } else { 0.0 };
    if (adj.left == 0.0 && adj.right == 0.0) || v_ego <= LEAN_MIN_SPEED {
        return base;
    }

    let nudge = |a: f64| a.abs() * lane_differ.min(LANE_DIFFER_MAX) * 0.05;
    if curvature > LEAN_CURVATURE && adj.left < 0.0 && lane_differ >= 0.0 {
        nudge(adj.left)
    } else if curvature > LEAN_CURVATURE && adj.left > 0.0 && lane_differ <= 0.0 {
        -nudge(adj.left)
    } else if curvature < -LEAN_CURVATURE && adj.right < 0.0 && lane_differ >= 0.0 {
        nudge(adj.right)
    } else if curvature < -LEAN_CURVATURE && adj.right > 0.0 && lane_differ <= 0.0 {
        -nudge(adj.right)
    } else {
        0.0
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Smoothed lane geometry and the path blender built on it.
#[derive(Debug, Clone)]
pub struct LanePlanner {
    /// Longitudinal sample grid shared by both lane lines, m.
    pub ll_x: Vec<f64>,
    /// Left lane line lateral offsets, m.
    pub lll_y: Vec<f64>,
    /// Right lane line lateral offsets, m.
    pub rll_y: Vec<f64>,
    pub lll_prob: f64,
    pub rll_prob: f64,
    pub lll_std: f64,
    pub rll_std: f64,
    /// Lane width used for the last blend, before the 4 m cap.
    pub lane_width: f64,
    /// Combined lane confidence of the last blend.
    pub d_prob: f64,
    pub l_lane_change_prob: f64,
    pub r_lane_change_prob: f64,

    lane_width_estimate: FirstOrderFilter,
    lane_width_certainty: FirstOrderFilter,
    camera_offset: f64,
    curv_offset_adj: CurvatureOffsetAdj,
}

impl LanePlanner {
    /// Creates a planner for a camera mounted `camera_offset` m from the
    /// vehicle center line.
    pub fn new(camera_offset: f64) -> Self {
        Self {
            ll_x: vec![0.0; TRAJECTORY_SIZE],
            lll_y: vec![0.0; TRAJECTORY_SIZE],
            rll_y: vec![0.0; TRAJECTORY_SIZE],
            lll_prob: 0.0,
            rll_prob: 0.0,
            lll_std: 0.0,
            rll_std: 0.0,
            lane_width: 3.7,
            d_prob: 0.0,
            l_lane_change_prob: 0.0,
            r_lane_change_prob: 0.0,
            lane_width_estimate: FirstOrderFilter::with_rate(0.005, 3.7),
            lane_width_certainty: FirstOrderFilter::with_rate(0.05, 1.0),
            camera_offset,
            curv_offset_adj: CurvatureOffsetAdj::default(),
        }
    }

    /// Filtered width measured between the two lane lines, m.
    pub fn lane_width_estimate(&self) -> f64 {
        self.lane_width_estimate.x()
    }

    /// How much the measured width is trusted over the speed default, in `[0, 1]`.
    pub fn lane_width_certainty(&self) -> f64 {
        self.lane_width_certainty.x()
    }

    pub fn curvature_offset_adj(&self) -> CurvatureOffsetAdj {
        self.curv_offset_adj
    }

    pub fn set_curvature_offset_adj(&mut self, adj: CurvatureOffsetAdj) {
        self.curv_offset_adj = adj;
    }

    /// Takes in one model frame.
    ///
    /// Frames without exactly four lane lines of [`TRAJECTORY_SIZE`] samples
    /// leave the lane geometry untouched.
    ///
    /// # Arguments
    ///
    /// * `md` - Model output for this cycle.
    /// * `v_ego` - Vehicle speed in m/s.
    /// * `mode_select` - Cruise mode selector; mode 3 biases both lines.
    /// * `curvature` - Current path curvature, used to pick the curve lean.
    pub fn ingest(&mut self, md: &ModelOutput, v_ego: f64, mode_select: i32, curvature: f64) {
        // The right line sits at a positive offset, so the sum measures how
        // far off-center the vehicle currently is.
        let lll_y0 = self.lll_y.first().copied().unwrap_or(0.0);
        let rll_y0 = self.rll_y.first().copied().unwrap_or(0.0);
        let lane_differ = round2((lll_y0 + rll_y0).abs());
        let lean = lean_offset(mode_select, v_ego, curvature, self.curv_offset_adj, lane_differ);

        if md.has_valid_lane_lines() {
            let left = &md.lane_lines[1];
            let right = &md.lane_lines[2];

            self.ll_x = left
                .x
                .iter()
                .zip(&right.x)
                .map(|(l, r)| (l + r) / 2.0)
                .collect();
            self.lll_y = left.y.iter().map(|y| y - self.camera_offset + lean).collect();
            self.rll_y = right.y.iter().map(|y| y - self.camera_offset + lean).collect();
            self.lll_prob = left.prob.max(0.0).min(1.0);
            self.rll_prob = right.prob.max(0.0).min(1.0);
            self.lll_std = left.std;
            self.rll_std = right.std;
        } else {
            debug!(
                "Keeping previous lane lines, model sent {} lines",
                md.lane_lines.len()
            );
        }

        if !md.desire_state.is_empty() {
            let desire = |i: usize| md.desire_state.get(i).copied().unwrap_or(0.0);
            self.l_lane_change_prob = desire(DESIRE_LANE_CHANGE_LEFT);
            self.r_lane_change_prob = desire(DESIRE_LANE_CHANGE_RIGHT);
        }
    }

    /// Blends the lane lines into `path`, overwriting its lateral offsets.
    ///
    /// With fully trusted lane lines the result is the lane center; as trust
    /// drops it falls back to the incoming path.
    ///
    /// # Returns
    ///
    /// (`Vec<PathPoint>`): `path` with the blended lateral offsets. [`LanePlanner::d_prob`] holds the weight
    /// given to the lane lines.
    pub fn blend(&mut self, mut path: Vec<PathPoint>, v_ego: f64) -> Vec<PathPoint> {
        // Reduce reliance on lane lines that are too far apart, now or in a
        // few seconds.
        let width_pts: Vec<f64> = self
            .rll_y
            .iter()
            .zip(&self.lll_y)
            .map(|(r, l)| r - l)
            .collect();
        let prob_mod = WIDTH_CHECK_TIMES
            .iter()
            .map(|t_check| {
                let width_at_t = interp(&self.ll_x, &width_pts, t_check * (v_ego + 7.0));
                interp(&WIDTH_MOD_BP, &WIDTH_MOD_V, width_at_t)
            })
            .fold(1.0, f64::min);
        let mut l_prob = self.lll_prob * prob_mod;
        let mut r_prob = self.rll_prob * prob_mod;

        // Reduce reliance on uncertain lane lines.
        l_prob *= interp(&STD_MOD_BP, &STD_MOD_V, self.lll_std);
        r_prob *= interp(&STD_MOD_BP, &STD_MOD_V, self.rll_std);

        // Width is only trusted while both lines are seen.
        let certainty = self.lane_width_certainty.update(l_prob * r_prob);
        let current_lane_width = (width_pts.first().copied().unwrap_or(0.0)).abs();
        let estimate = self.lane_width_estimate.update(current_lane_width);
        let speed_lane_width = interp(&SPEED_LANE_WIDTH_BP, &SPEED_LANE_WIDTH_V, v_ego);
        self.lane_width = certainty * estimate + (1.0 - certainty) * speed_lane_width;

        let clipped_lane_width = self.lane_width.min(MAX_LANE_WIDTH);
        self.d_prob = l_prob + r_prob - l_prob * r_prob;

        let lane_path_y: Vec<f64> = self
            .lll_y
            .iter()
            .zip(&self.rll_y)
            .map(|(l, r)| {
                let from_left = l + clipped_lane_width / 2.0;
                let from_right = r - clipped_lane_width / 2.0;
                (l_prob * from_left + r_prob * from_right) / (l_prob + r_prob + 0.0001)
            })
            .collect();

        for p in path.iter_mut() {
            let lane_y = interp(&self.ll_x, &lane_path_y, p.x);
            p.y = self.d_prob * lane_y + (1.0 - self.d_prob) * p.y;
        }
        path
    }
}

impl Default for LanePlanner {
    fn default() -> Self {
        Self::new(0.0)
    }
}
