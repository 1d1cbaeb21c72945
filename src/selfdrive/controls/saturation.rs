use crate::common::numeric::clip;
use crate::selfdrive::controls::lat_control::CarState;
use crate::selfdrive::controls::DT_CTRL;

/// Minimum speed for saturation to count against the driver, m/s.
const SAT_CHECK_MIN_SPEED: f64 = 10.0;

/// Debounced "steering at its limit" detector shared by both controllers.
///
/// A timer rises by `DT_CTRL` on every cycle spent at the limit while the
/// check is enabled, and falls by the same step otherwise. It is clipped to
/// `[0, 1]`; the controller is reported saturated once the timer exceeds the
/// configured limit.
#[derive(Debug, Clone)]
pub struct SaturationDetector {
    /// Saturation timer, in `[0, 1]`.
    sat_count: f64,
    /// Timer step per cycle.
    sat_count_rate: f64,
    /// Timer value above which saturation is reported.
    sat_limit: f64,
}

impl SaturationDetector {
    /// Creates a detector stepping by `DT_CTRL` per cycle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use openpilot_lateral::selfdrive::controls::saturation::SaturationDetector;
    ///
    /// let mut sat = SaturationDetector::new(0.045);
    /// let flags: Vec<bool> = (0..7).map(|_| sat.update(true, true)).collect();
    /// assert_eq!(flags, vec![false, false, false, false, true, true, true]);
    /// ```
    pub fn new(sat_limit: f64) -> Self {
        Self::with_rate(sat_limit, DT_CTRL)
    }

    pub fn with_rate(sat_limit: f64, sat_count_rate: f64) -> Self {
        Self {
            sat_count: 0.0,
            sat_count_rate,
            sat_limit,
        }
    }

    /// Advances the timer; returns the saturated flag.
    pub fn update(&mut self, at_limit: bool, check_saturation: bool) -> bool {
        if at_limit && check_saturation {
            self.sat_count += self.sat_count_rate;
        } else {
            self.sat_count -= self.sat_count_rate;
        }
        self.sat_count = clip(self.sat_count, 0.0, 1.0);

        self.saturated()
    }

    pub fn saturated(&self) -> bool {
        self.sat_count > self.sat_limit
    }

    /// Current timer value.
    pub fn count(&self) -> f64 {
        self.sat_count
    }

    pub fn reset(&mut self) {
        self.sat_count = 0.0;
    }
}

/// Whether saturation should count this cycle: fast enough, not rate limited
/// and the driver is not steering.
pub fn check_saturation(cs: &CarState) -> bool {
    cs.v_ego > SAT_CHECK_MIN_SPEED && !cs.steering_rate_limited && !cs.steering_pressed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_stays_in_range() {
        let mut sat = SaturationDetector::new(0.8);
        let pattern = [(true, true), (true, false), (false, true), (false, false)];

        for step in 0..1000 {
            let (at_limit, check) = pattern[(step * 7 + step / 3) % 4];
            sat.update(at_limit, check);
            assert!((0.0..=1.0).contains(&sat.count()));
        }

        for _ in 0..500 {
            sat.update(true, true);
        }
        assert_eq!(sat.count(), 1.0);
        for _ in 0..500 {
            sat.update(false, true);
        }
        assert_eq!(sat.count(), 0.0);
    }

    #[test]
    fn test_flag_needs_contiguous_saturation() {
        let mut sat = SaturationDetector::with_rate(0.45, 0.1);

        // Alternating contact never accumulates.
        for i in 0..100 {
            assert!(!sat.update(i % 2 == 0, true));
        }

        let flags: Vec<bool> = (0..7).map(|_| sat.update(true, true)).collect();
        assert_eq!(flags, vec![false, false, false, false, true, true, true]);

        // Gate off: the timer falls back below the limit.
        assert!(sat.update(true, false));
        assert!(sat.update(true, false));
        assert!(!sat.update(true, false));
    }

    #[test]
    fn test_reset() {
        let mut sat = SaturationDetector::new(0.8);
        for _ in 0..50 {
            sat.update(true, true);
        }
        sat.reset();
        sat.reset();
        assert_eq!(sat.count(), 0.0);
        assert!(!sat.saturated());
    }

    #[test]
    fn test_check_saturation_gate() {
        let cs = CarState {
            v_ego: 15.0,
            ..Default::default()
        };
        assert!(check_saturation(&cs));
        assert!(!check_saturation(&CarState { v_ego: 9.0, ..cs.clone() }));
        assert!(!check_saturation(&CarState {
            steering_pressed: true,
            ..cs.clone()
        }));
        assert!(!check_saturation(&CarState {
            steering_rate_limited: true,
            ..cs
        }));
    }
}
