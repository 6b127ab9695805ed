use crate::SafetyParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speed directive sent to the arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeedMode {
    Normal,
    Slow,
    Stopped,
}

impl SpeedMode {
    /// Map a distance to a mode using the thresholds alone (no hysteresis).
    ///
    /// `None` means the distance is undefined and always maps to `Stopped`.
    pub fn classify(distance_m: Option<f64>, params: &SafetyParams) -> SpeedMode {
        match distance_m {
            None => SpeedMode::Stopped,
            Some(d) if d.is_nan() => SpeedMode::Stopped,
            Some(d) if d <= params.stop_threshold_m => SpeedMode::Stopped,
            Some(d) if d <= params.slow_threshold_m => SpeedMode::Slow,
            Some(_) => SpeedMode::Normal,
        }
    }

    /// Arm speed for this mode, as a percentage of nominal.
    pub fn speed_pct(self, params: &SafetyParams) -> u8 {
        match self {
            SpeedMode::Normal => 100,
            SpeedMode::Slow => params.slow_speed_pct,
            SpeedMode::Stopped => 0,
        }
    }

    /// Ordering by permitted speed: `Stopped < Slow < Normal`.
    #[inline]
    pub(crate) fn rank(self) -> u8 {
        match self {
            SpeedMode::Stopped => 0,
            SpeedMode::Slow => 1,
            SpeedMode::Normal => 2,
        }
    }
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpeedMode::Normal => "NORMAL",
            SpeedMode::Slow => "SLOW",
            SpeedMode::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_match_threshold_table() {
        let p = SafetyParams::default();
        assert_eq!(SpeedMode::classify(Some(0.0), &p), SpeedMode::Stopped);
        assert_eq!(SpeedMode::classify(Some(0.20), &p), SpeedMode::Stopped);
        assert_eq!(SpeedMode::classify(Some(0.200_000_1), &p), SpeedMode::Slow);
        assert_eq!(SpeedMode::classify(Some(0.25), &p), SpeedMode::Slow);
        assert_eq!(SpeedMode::classify(Some(0.250_000_1), &p), SpeedMode::Normal);
        assert_eq!(SpeedMode::classify(Some(f64::INFINITY), &p), SpeedMode::Normal);
        assert_eq!(SpeedMode::classify(None, &p), SpeedMode::Stopped);
        assert_eq!(SpeedMode::classify(Some(f64::NAN), &p), SpeedMode::Stopped);
    }

    #[test]
    fn speed_never_increases_as_distance_shrinks() {
        let p = SafetyParams::default();
        let mut previous = u8::MAX;
        for step in (0..=400).rev() {
            let d = step as f64 * 0.001;
            let pct = SpeedMode::classify(Some(d), &p).speed_pct(&p);
            assert!(pct <= previous, "speed rose to {pct} at {d} m");
            previous = pct;
        }
    }

    #[test]
    fn speed_percentages() {
        let p = SafetyParams::default();
        assert_eq!(SpeedMode::Normal.speed_pct(&p), 100);
        assert_eq!(SpeedMode::Slow.speed_pct(&p), 70);
        assert_eq!(SpeedMode::Stopped.speed_pct(&p), 0);
        assert_eq!(SpeedMode::Slow.to_string(), "SLOW");
    }
}
