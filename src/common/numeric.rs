//! Small scalar helpers used throughout the control loop.
//!
//! Breakpoint tables are evaluated with the `interp` crate, but clamped at
//! both ends: outside the table the first or last value is held instead of
//! extrapolating along the end segment.

/// Linearly interpolates `x` on the table `(xp, fp)`, holding the end values
/// outside of `xp`.
///
/// `xp` must be sorted ascending. An empty table yields `0.0`.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::numeric::interp;
///
/// let xp = [4.0, 5.0];
/// let fp = [1.0, 0.0];
///
/// assert_eq!(interp(&xp, &fp, 3.0), 1.0);
/// assert_eq!(interp(&xp, &fp, 4.5), 0.5);
/// assert_eq!(interp(&xp, &fp, 6.0), 0.0);
/// ```
pub fn interp(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    interp::interp(&xp[..n], &fp[..n], x)
}

/// Clips `x` into `[lo, hi]`.
///
/// Unlike [`f64::clamp`] this never panics; with `lo > hi` the upper bound
/// wins.
pub fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Sign of `x`, with `sign(0.0) == 0.0`.
///
/// [`f64::signum`] returns `1.0` for zero, which would make an unwinding
/// integrator walk away from zero.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Moves `x` towards zero by `step` without crossing it.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::numeric::unwind;
///
/// assert_eq!(unwind(0.5, 0.25), 0.25);
/// assert_eq!(unwind(-0.1, 0.25), 0.0);
/// ```
pub fn unwind(x: f64, step: f64) -> f64 {
    if x.abs() <= step {
        0.0
    } else {
        x - step * sign(x)
    }
}

/// Shrinks `error` towards zero by `deadzone`, returning zero inside the band.
///
/// # Examples
///
/// ```rust
/// use openpilot_lateral::common::numeric::apply_deadzone;
///
/// assert_eq!(apply_deadzone(0.5, 1.0), 0.0);
/// assert_eq!(apply_deadzone(1.5, 1.0), 0.5);
/// assert_eq!(apply_deadzone(-1.5, 1.0), -0.5);
/// ```
pub fn apply_deadzone(error: f64, deadzone: f64) -> f64 {
    if error > deadzone {
        error - deadzone
    } else if error < -deadzone {
        error + deadzone
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_interp_holds_ends() {
        let xp = [0.0, 31.0];
        let fp = [2.8, 3.5];

        assert_eq!(interp(&xp, &fp, -5.0), 2.8);
        assert_eq!(interp(&xp, &fp, 100.0), 3.5);
        assert_abs_diff_eq!(interp(&xp, &fp, 15.5), 3.15, epsilon = 1e-9);
    }

    #[test]
    fn test_interp_degenerate_tables() {
        assert_eq!(interp(&[], &[], 1.0), 0.0);
        assert_eq!(interp(&[2.0], &[7.0], -1.0), 7.0);
        assert_eq!(interp(&[2.0], &[7.0], 9.0), 7.0);

        // A grid that has not been populated yet collapses to its end values.
        let zeros = [0.0; 4];
        let ys = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(interp(&zeros, &ys, 10.0), 4.0);
        assert_eq!(interp(&zeros, &ys, 0.0), 1.0);
    }

    #[test]
    fn test_interp_multi_segment() {
        let xp = [0.0, 10.0, 20.0];
        let fp = [0.0, 1.0, 3.0];

        assert_abs_diff_eq!(interp(&xp, &fp, 5.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(interp(&xp, &fp, 15.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sign_of_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.2), -1.0);
        assert_eq!(sign(3.0), 1.0);
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip(2.0, -1.0, 1.0), 1.0);
        assert_eq!(clip(-2.0, -1.0, 1.0), -1.0);
        assert_eq!(clip(0.3, -1.0, 1.0), 0.3);
    }
}
