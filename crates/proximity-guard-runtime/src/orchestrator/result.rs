use crate::StatusLevel;
use proximity_guard_core::DistanceEstimate;
use proximity_guard_safety::{SafetyParams, SpeedCommand, SpeedMode};
use serde::{Deserialize, Serialize};

/// What one tick observed and decided.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub tick: u64,
    /// Timestamp of the detector frame, `None` when the detector timed out.
    pub frame_timestamp_ms: Option<u64>,
    pub estimate: DistanceEstimate,
    /// Mode after the tick.
    pub mode: SpeedMode,
    /// Command forwarded to the arm on this tick, if any.
    pub command: Option<SpeedCommand>,
    pub detector_timed_out: bool,
    /// Detections dropped because the depth sampler timed out or lost its stream.
    pub depth_failures: usize,
    /// Depth samples dropped for being older than the staleness tolerance.
    pub stale_depth_samples: usize,
}

impl TickOutcome {
    /// Status of this tick's raw distance, ignoring hysteresis.
    pub fn status(&self, params: &SafetyParams) -> StatusLevel {
        StatusLevel::of(&self.estimate, params)
    }
}
