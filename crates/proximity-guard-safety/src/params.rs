use serde::{Deserialize, Serialize};

/// Errors returned by [`SafetyParams::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SafetyParamsError {
    #[error("stop threshold must be finite and non-negative, got {0}")]
    InvalidStopThreshold(f64),
    #[error("slow threshold ({slow}) must be finite and at least the stop threshold ({stop})")]
    ThresholdOrder { stop: f64, slow: f64 },
    #[error("{name} must be finite and non-negative, got {value}")]
    NegativeMargin { name: &'static str, value: f64 },
    #[error("hysteresis hold must be at least one frame")]
    ZeroHoldFrames,
    #[error("slow speed must be a percentage in 0..=100, got {0}")]
    InvalidSlowSpeed(u8),
}

fn default_stop_threshold() -> f64 {
    0.20
}

fn default_slow_threshold() -> f64 {
    0.25
}

fn default_slow_speed_pct() -> u8 {
    70
}

fn default_hysteresis_margin() -> f64 {
    0.02
}

fn default_hold_frames() -> u32 {
    3
}

fn default_approximate_margin() -> f64 {
    0.02
}

fn default_command_epsilon() -> f64 {
    0.05
}

/// Thresholds and hysteresis settings of the speed-mode state machine.
///
/// Loaded once per session; never changed while the session runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyParams {
    /// Distance at or below which the arm is stopped, in meters.
    #[serde(default = "default_stop_threshold")]
    pub stop_threshold_m: f64,
    /// Distance at or below which the arm slows down, in meters.
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_m: f64,
    /// Arm speed while in SLOW, as a percentage of nominal.
    #[serde(default = "default_slow_speed_pct")]
    pub slow_speed_pct: u8,
    /// Extra clearance beyond `slow_threshold_m` required before relaxing.
    #[serde(default = "default_hysteresis_margin")]
    pub hysteresis_margin_m: f64,
    /// Consecutive clear frames required before relaxing.
    #[serde(default = "default_hold_frames")]
    pub hysteresis_hold_frames: u32,
    /// Subtracted from pixel-fallback distances before classification.
    #[serde(default = "default_approximate_margin")]
    pub approximate_margin_m: f64,
    /// Minimum distance change that re-emits a command without a mode change.
    #[serde(default = "default_command_epsilon")]
    pub command_epsilon_m: f64,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            stop_threshold_m: default_stop_threshold(),
            slow_threshold_m: default_slow_threshold(),
            slow_speed_pct: default_slow_speed_pct(),
            hysteresis_margin_m: default_hysteresis_margin(),
            hysteresis_hold_frames: default_hold_frames(),
            approximate_margin_m: default_approximate_margin(),
            command_epsilon_m: default_command_epsilon(),
        }
    }
}

impl SafetyParams {
    /// Distance that must be exceeded before SLOW or STOPPED may relax.
    #[inline]
    pub fn release_distance_m(&self) -> f64 {
        self.slow_threshold_m + self.hysteresis_margin_m
    }

    pub fn validate(&self) -> Result<(), SafetyParamsError> {
        let stop = self.stop_threshold_m;
        let slow = self.slow_threshold_m;
        if !stop.is_finite() || stop < 0.0 {
            return Err(SafetyParamsError::InvalidStopThreshold(stop));
        }
        if !slow.is_finite() || slow < stop {
            return Err(SafetyParamsError::ThresholdOrder { stop, slow });
        }
        for (name, value) in [
            ("hysteresis_margin_m", self.hysteresis_margin_m),
            ("approximate_margin_m", self.approximate_margin_m),
            ("command_epsilon_m", self.command_epsilon_m),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SafetyParamsError::NegativeMargin { name, value });
            }
        }
        if self.hysteresis_hold_frames == 0 {
            return Err(SafetyParamsError::ZeroHoldFrames);
        }
        if self.slow_speed_pct > 100 {
            return Err(SafetyParamsError::InvalidSlowSpeed(self.slow_speed_pct));
        }
        Ok(())
    }
}
