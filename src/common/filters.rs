/// A first-order discrete filter, `x += k * (input - x)`.
///
/// The gain can be given directly as a per-sample rate (an exponential
/// moving average) or derived from a cutoff frequency and sample period.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::filters::FirstOrderFilter;
///
/// let mut width = FirstOrderFilter::with_rate(0.005, 3.7);
/// let smoothed = width.update(3.5);
/// assert!(smoothed < 3.7 && smoothed > 3.5);
/// ```
#[derive(Clone, Debug)]
pub struct FirstOrderFilter {
    /// Filter gain, in `[0, 1]`.
    k: f64,
    /// Filter state.
    x: f64,
}

impl FirstOrderFilter {
    /// Creates a filter from a cutoff frequency.
    ///
    /// # Arguments
    ///
    /// * `fc` - Cutoff frequency in Hertz.
    /// * `dt` - Time step in seconds.
    /// * `x0` - Initial state.
    pub fn new(fc: f64, dt: f64, x0: f64) -> Self {
        let w = 2.0 * std::f64::consts::PI * fc * dt;
        Self::with_rate(w / (1.0 + w), x0)
    }

    /// Creates a filter with a fixed per-sample rate.
    ///
    /// The rate is clipped into `[0, 1]`; at `1.0` the filter follows its
    /// input exactly.
    pub fn with_rate(rate: f64, x0: f64) -> Self {
        Self {
            k: rate.max(0.0).min(1.0),
            x: x0,
        }
    }

    /// Moves the state towards `input` and returns the new state.
    ///
    /// A non-finite result is discarded and the previous state is kept.
    pub fn update(&mut self, input: f64) -> f64 {
        let next = self.x + self.k * (input - self.x);
        if next.is_finite() {
            self.x = next;
        }
        self.x
    }

    /// Current filter state.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Filter gain.
    pub fn rate(&self) -> f64 {
        self.k
    }
}
