use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors raised while assembling an observer from flat coefficient lists.
#[derive(Debug, Error, PartialEq)]
pub enum ObserverError {
    #[error("Observer needs at least one state")]
    NoStates,

    #[error("Matrix `{name}` has {found} coefficients, expected {expected}")]
    Dimension {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Steady-state Kalman observer for a single-input, single-output linear
/// system.
///
/// The model is
///
/// ```text
/// x[k+1] = A x[k] + B u[k] + L (y[k] - C x[k])
/// ```
///
/// with a fixed correction gain `L`, so no covariance is propagated.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::kalman::KalmanObserver;
///
/// let mut observer = KalmanObserver::from_slices(
///     &[0.0, 1.0, -0.22619643, 1.21822268],
///     &[-1.92006585e-04, 3.95603032e-05],
///     &[1.0, 0.0],
///     &[0.3233671, 0.3185757],
/// )
/// .unwrap();
///
/// let predicted = observer.correct(2.0, 0.0);
/// assert_eq!(predicted, 0.0);
/// assert!(observer.output() != 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct KalmanObserver {
    /// State transition matrix, `n x n`.
    a: Array2<f64>,
    /// Input matrix, `n x 1`.
    b: Array1<f64>,
    /// Output matrix, `1 x n`.
    c: Array1<f64>,
    /// Correction gain, `n x 1`.
    l: Array1<f64>,
    /// State estimate.
    x_hat: Array1<f64>,
}

impl KalmanObserver {
    /// Builds an observer from row-major coefficient lists.
    ///
    /// The state dimension `n` is taken from `b`; `a` must hold `n * n`
    /// values and `c` and `l` `n` values each.
    pub fn from_slices(a: &[f64], b: &[f64], c: &[f64], l: &[f64]) -> Result<Self, ObserverError> {
        let n = b.len();
        if n == 0 {
            return Err(ObserverError::NoStates);
        }
        check_len("a", a, n * n)?;
        check_len("c", c, n)?;
        check_len("l", l, n)?;

        let a = Array2::from_shape_vec((n, n), a.to_vec()).map_err(|_| ObserverError::Dimension {
            name: "a",
            expected: n * n,
            found: a.len(),
        })?;

        Ok(Self {
            a,
            b: Array1::from(b.to_vec()),
            c: Array1::from(c.to_vec()),
            l: Array1::from(l.to_vec()),
            x_hat: Array1::zeros(n),
        })
    }

    /// Number of states.
    pub fn dim(&self) -> usize {
        self.x_hat.len()
    }

    /// Predicted output `C x`.
    pub fn output(&self) -> f64 {
        self.c.dot(&self.x_hat)
    }

    /// Current state estimate.
    pub fn state(&self) -> &Array1<f64> {
        &self.x_hat
    }

    /// Runs one correction/prediction step.
    ///
    /// Returns the output predicted *before* this step, which is the value
    /// the measurement was compared against. A step that would leave a
    /// non-finite estimate is dropped.
    pub fn correct(&mut self, measurement: f64, u: f64) -> f64 {
        let y_hat = self.output();
        let innovation = measurement - y_hat;

        let next = self.a.dot(&self.x_hat) + &self.b * u + &self.l * innovation;
        if next.iter().all(|v| v.is_finite()) {
            self.x_hat = next;
        }

        y_hat
    }
}

fn check_len(name: &'static str, values: &[f64], expected: usize) -> Result<(), ObserverError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ObserverError::Dimension {
            name,
            expected,
            found: values.len(),
        })
    }
}
