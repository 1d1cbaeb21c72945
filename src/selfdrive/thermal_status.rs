//! Device thermal status with hysteresis.
//!
//! The status is an ordered level. Hot readings raise it immediately; the
//! bands in between only ever clip the current level, so a cooling device
//! relaxes one band at a time instead of flapping around a single threshold.
//!
//! | first matching condition                        | next status                  |
//! |-------------------------------------------------|------------------------------|
//! | cpu > 107 °C, battery ≥ 63 °C, or offroad cpu > 70 °C | `Danger`               |
//! | hottest component > 96 °C or battery > 60 °C    | `current` clipped to `Red..=Danger`   |
//! | cpu > 94 °C                                     | `current` clipped to `Yellow..=Red`   |
//! | cpu > 80 °C                                     | `Yellow`                     |
//! | cpu > 75 °C                                     | `current` clipped to `Green..=Yellow` |
//! | otherwise                                       | `Green`                      |

use crate::common::filters::FirstOrderFilter;

/// Thermal sampling period in seconds.
pub const DT_TRML: f64 = 0.5;

/// Time constant of the cpu temperature filter in seconds.
pub const CPU_TEMP_TAU: f64 = 5.0;

/// Ordered thermal level; higher is hotter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ThermalStatus {
    #[default]
    Green,
    Yellow,
    Red,
    Danger,
}

impl ThermalStatus {
    /// Whether lateral control may engage at this level.
    pub fn engage_allowed(self) -> bool {
        self < ThermalStatus::Red
    }

    /// Whether the device may go onroad at this level.
    pub fn onroad_allowed(self) -> bool {
        self < ThermalStatus::Danger
    }

    fn clip(self, lo: ThermalStatus, hi: ThermalStatus) -> ThermalStatus {
        self.max(lo).min(hi)
    }
}

/// One thermal sample, in degrees Celsius.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThermalReading {
    /// Hottest cpu core.
    pub cpu_temp_c: f64,
    /// Hottest of cpu, memory and gpu.
    pub max_component_temp_c: f64,
    /// Battery temperature.
    pub battery_temp_c: f64,
    /// The device has been offroad long enough that it should cool down
    /// before going onroad.
    pub offroad_cooldown: bool,
}

/// Threshold table driving [`ThermalStatus`] transitions.
#[derive(Debug, Clone)]
pub struct ThermalBands {
    pub danger_cpu_c: f64,
    pub danger_battery_c: f64,
    pub offroad_cpu_c: f64,
    pub red_component_c: f64,
    pub red_battery_c: f64,
    pub red_cpu_c: f64,
    pub yellow_cpu_c: f64,
    pub green_cpu_c: f64,
}

impl Default for ThermalBands {
    fn default() -> Self {
        Self {
            danger_cpu_c: 107.0,
            danger_battery_c: 63.0,
            offroad_cpu_c: 70.0,
            red_component_c: 96.0,
            red_battery_c: 60.0,
            red_cpu_c: 94.0,
            yellow_cpu_c: 80.0,
            green_cpu_c: 75.0,
        }
    }
}

impl ThermalBands {
    /// Computes the next status from the current one and a reading.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use openpilot_lateral::selfdrive::thermal_status::{ThermalBands, ThermalReading, ThermalStatus};
    ///
    /// let bands = ThermalBands::default();
    /// let warm = ThermalReading { cpu_temp_c: 78.0, max_component_temp_c: 78.0, ..Default::default() };
    ///
    /// // Inside the hysteresis band the level does not rise...
    /// assert_eq!(bands.step(ThermalStatus::Green, &warm), ThermalStatus::Green);
    /// // ...and does not fall either.
    /// assert_eq!(bands.step(ThermalStatus::Yellow, &warm), ThermalStatus::Yellow);
    /// ```
    pub fn step(&self, current: ThermalStatus, reading: &ThermalReading) -> ThermalStatus {
        use ThermalStatus::*;

        let cpu = reading.cpu_temp_c;
        let battery = reading.battery_temp_c;

        if cpu > self.danger_cpu_c
            || battery >= self.danger_battery_c
            || (reading.offroad_cooldown && cpu > self.offroad_cpu_c)
        {
            Danger
        } else if reading.max_component_temp_c > self.red_component_c || battery > self.red_battery_c {
            current.clip(Red, Danger)
        } else if cpu > self.red_cpu_c {
            current.clip(Yellow, Red)
        } else if cpu > self.yellow_cpu_c {
            Yellow
        } else if cpu > self.green_cpu_c {
            current.clip(Green, Yellow)
        } else {
            Green
        }
    }
}

/// Tracks the thermal status across samples, smoothing the cpu temperature.
#[derive(Debug, Clone)]
pub struct ThermalMonitor {
    bands: ThermalBands,
    cpu_filter: FirstOrderFilter,
    status: ThermalStatus,
}

impl ThermalMonitor {
    pub fn new(bands: ThermalBands) -> Self {
        let fc = 1.0 / (2.0 * std::f64::consts::PI * CPU_TEMP_TAU);
        Self {
            bands,
            cpu_filter: FirstOrderFilter::new(fc, DT_TRML, 0.0),
            status: ThermalStatus::Green,
        }
    }

    /// Feeds one sample and returns the new status.
    pub fn update(&mut self, reading: &ThermalReading) -> ThermalStatus {
        let cpu = self.cpu_filter.update(reading.cpu_temp_c);
        let smoothed = ThermalReading {
            cpu_temp_c: cpu,
            max_component_temp_c: reading.max_component_temp_c.max(cpu),
            ..*reading
        };
        self.status = self.bands.step(self.status, &smoothed);
        self.status
    }

    pub fn status(&self) -> ThermalStatus {
        self.status
    }
}

impl Default for ThermalMonitor {
    fn default() -> Self {
        Self::new(ThermalBands::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ThermalStatus::*;

    fn cpu(temp: f64) -> ThermalReading {
        ThermalReading {
            cpu_temp_c: temp,
            max_component_temp_c: temp,
            battery_temp_c: 30.0,
            offroad_cooldown: false,
        }
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(Green < Yellow && Yellow < Red && Red < Danger);
        assert!(Yellow.engage_allowed());
        assert!(!Red.engage_allowed());
        assert!(Red.onroad_allowed());
        assert!(!Danger.onroad_allowed());
    }

    #[test]
    fn test_rising_and_falling_thresholds() {
        let bands = ThermalBands::default();

        // Heating up.
        let mut status = Green;
        for (temp, expected) in [(70.0, Green), (78.0, Green), (85.0, Yellow), (95.0, Yellow), (97.0, Red), (108.0, Danger)] {
            status = bands.step(status, &cpu(temp));
            assert_eq!(status, expected, "heating through {}", temp);
        }

        // Cooling down relaxes one band at a time.
        for (temp, expected) in [(100.0, Danger), (95.0, Red), (85.0, Yellow), (78.0, Yellow), (74.0, Green)] {
            status = bands.step(status, &cpu(temp));
            assert_eq!(status, expected, "cooling through {}", temp);
        }
    }

    #[test]
    fn test_battery_and_offroad_conditions() {
        let bands = ThermalBands::default();

        let hot_battery = ThermalReading {
            battery_temp_c: 63.0,
            ..cpu(50.0)
        };
        assert_eq!(bands.step(Green, &hot_battery), Danger);

        let warm_battery = ThermalReading {
            battery_temp_c: 61.0,
            ..cpu(50.0)
        };
        assert_eq!(bands.step(Green, &warm_battery), Red);

        let cooldown = ThermalReading {
            offroad_cooldown: true,
            ..cpu(72.0)
        };
        assert_eq!(bands.step(Green, &cooldown), Danger);
    }

    #[test]
    fn test_monitor_smooths_spikes() {
        let mut monitor = ThermalMonitor::default();
        for _ in 0..100 {
            monitor.update(&cpu(60.0));
        }
        assert_eq!(monitor.status(), Green);

        // A single hot sample does not trip the smoothed cpu threshold.
        let spike = ThermalReading {
            max_component_temp_c: 60.0,
            ..cpu(110.0)
        };
        assert_eq!(monitor.update(&spike), Green);

        for _ in 0..100 {
            monitor.update(&cpu(110.0));
        }
        assert_eq!(monitor.status(), Danger);
    }
}
