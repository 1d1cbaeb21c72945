//! Static vehicle configuration.
//!
//! Loaded once at startup from a TOML file. Anything missing or malformed is
//! a [`ConfigError`]; no controller is built from a partial configuration.

use std::fs::read_to_string;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::common::kalman::ObserverError;

/// An error that occurs while loading or validating car parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot load the car parameter file: {0}")]
    FileLoadError(#[from] std::io::Error),

    #[error("Cannot read the car parameter file: {0}")]
    DeserialiseError(#[from] toml::de::Error),

    #[error("Breakpoint table `{0}` must be non-empty, ascending, with matching lengths")]
    BadTable(&'static str),

    #[error("Parameter `{name}` must be {requirement}, found {value}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("Invalid LQR state-space model: {0}")]
    Observer(#[from] ObserverError),

    #[error("Car parameters carry a `{found}` lateral tuning, expected `{expected}`")]
    WrongTuning {
        expected: &'static str,
        found: &'static str,
    },
}

/// Vehicle parameters needed by lateral control.
#[derive(Debug, Clone, Deserialize)]
pub struct CarParams {
    /// Speed breakpoints of the steering limit curve, m/s.
    pub steer_max_bp: Vec<f64>,
    /// Steering limit at each breakpoint.
    pub steer_max_v: Vec<f64>,
    /// Time the saturation timer must exceed before flagging saturation.
    pub steer_limit_timer: f64,
    /// Ratio between steering wheel angle and road wheel angle.
    pub steer_ratio: f64,
    /// Wheelbase, m.
    pub wheelbase: f64,
    /// Understeer slip factor, 1/(m/s)^2.
    pub slip_factor: f64,
    /// Lateral offset of the camera from the vehicle center line, m.
    #[serde(default)]
    pub camera_offset: f64,
    /// Controller selection and its gains.
    pub lateral_tuning: LateralTuning,
}

/// Which lateral controller to run.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LateralTuning {
    Lqr(LqrParams),
    Pid(PidParams),
}

/// LQR controller configuration.
///
/// Matrices are given row-major: `a` is 2x2, `b` and `l` are 2x1, `c` and
/// `k` are 1x2.
#[derive(Debug, Clone, Deserialize)]
pub struct LqrParams {
    pub scale: f64,
    pub ki: f64,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub c: Vec<f64>,
    pub k: Vec<f64>,
    pub l: Vec<f64>,
    pub dc_gain: f64,
}

/// PID controller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PidParams {
    pub kp_bp: Vec<f64>,
    pub kp_v: Vec<f64>,
    pub ki_bp: Vec<f64>,
    pub ki_v: Vec<f64>,
    #[serde(default = "zero_table")]
    pub kd_bp: Vec<f64>,
    #[serde(default = "zero_table")]
    pub kd_v: Vec<f64>,
    pub kf: f64,
    /// Use the fitted quadratic feedforward instead of `v^2`.
    #[serde(default)]
    pub new_kf_tuned: bool,
    /// Error band ignored by the integral and derivative terms, degrees.
    #[serde(default)]
    pub deadzone: f64,
    #[serde(default)]
    pub desired_angle_source: DesiredAngleSource,
}

/// Where the PID controller takes its target steering angle from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DesiredAngleSource {
    /// The planner's steering angle, already offset-corrected upstream.
    #[default]
    Angle,
    /// The planner's curvature through the vehicle model, plus the offset.
    Curvature,
}

impl LateralTuning {
    pub fn name(&self) -> &'static str {
        match self {
            LateralTuning::Lqr(_) => "lqr",
            LateralTuning::Pid(_) => "pid",
        }
    }
}

fn zero_table() -> Vec<f64> {
    vec![0.0]
}

impl CarParams {
    /// Loads and validates a parameter file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let params_str = read_to_string(path)?;
        Self::from_toml_str(&params_str)
    }

    /// Parses and validates parameters from TOML text.
    pub fn from_toml_str(params_str: &str) -> Result<Self, ConfigError> {
        let cp: CarParams = toml::from_str(params_str)?;
        cp.validate()?;
        Ok(cp)
    }

    /// Checks every invariant the controllers rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_table("steer_max", &self.steer_max_bp, &self.steer_max_v)?;
        if self.steer_max_v.iter().any(|&v| !(v >= 0.0)) {
            return Err(ConfigError::BadTable("steer_max"));
        }
        check_positive("steer_limit_timer", self.steer_limit_timer)?;
        check_positive("steer_ratio", self.steer_ratio)?;
        check_positive("wheelbase", self.wheelbase)?;
        if !self.slip_factor.is_finite() {
            return Err(ConfigError::OutOfRange {
                name: "slip_factor",
                requirement: "finite",
                value: self.slip_factor,
            });
        }

        match &self.lateral_tuning {
            LateralTuning::Lqr(lqr) => {
                check_positive("scale", lqr.scale)?;
                check_positive("dc_gain", lqr.dc_gain)?;
                if lqr.k.len() != lqr.b.len() {
                    return Err(ObserverError::Dimension {
                        name: "k",
                        expected: lqr.b.len(),
                        found: lqr.k.len(),
                    }
                    .into());
                }
                crate::common::kalman::KalmanObserver::from_slices(&lqr.a, &lqr.b, &lqr.c, &lqr.l)?;
            }
            LateralTuning::Pid(pid) => {
                check_table("kp", &pid.kp_bp, &pid.kp_v)?;
                check_table("ki", &pid.ki_bp, &pid.ki_v)?;
                check_table("kd", &pid.kd_bp, &pid.kd_v)?;
                if !(pid.deadzone >= 0.0) {
                    return Err(ConfigError::OutOfRange {
                        name: "deadzone",
                        requirement: "non-negative",
                        value: pid.deadzone,
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_table(name: &'static str, bp: &[f64], v: &[f64]) -> Result<(), ConfigError> {
    let ascending = bp.windows(2).all(|w| w[0] <= w[1]);
    if bp.is_empty() || bp.len() != v.len() || !ascending {
        return Err(ConfigError::BadTable(name));
    }
    Ok(())
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement: "positive",
            value,
        })
    }
}
