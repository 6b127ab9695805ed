//! Session summary written at the end of a run.

use crate::{ConfigIoError, TickOutcome};
use proximity_guard_core::DistanceEstimate;
use proximity_guard_safety::{CommandKind, SafetyParams, SpeedCommand, SpeedMode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::{fmt, fs, path::Path};

/// Transitions kept in a report; older ones are counted, not stored.
pub const MAX_TRANSITIONS: usize = 1024;

/// Operator-facing proximity status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusLevel {
    Safe,
    Caution,
    Danger,
}

impl StatusLevel {
    /// Status of a raw estimate against the thresholds, without hysteresis.
    pub fn of(estimate: &DistanceEstimate, params: &SafetyParams) -> StatusLevel {
        match SpeedMode::classify(estimate.meters(), params) {
            SpeedMode::Normal => StatusLevel::Safe,
            SpeedMode::Slow => StatusLevel::Caution,
            SpeedMode::Stopped => StatusLevel::Danger,
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusLevel::Safe => "SAFE",
            StatusLevel::Caution => "CAUTION",
            StatusLevel::Danger => "DANGER",
        })
    }
}

/// One mode change observed during the session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub tick: u64,
    pub from: SpeedMode,
    pub to: SpeedMode,
    pub distance: DistanceEstimate,
}

/// Counters and transitions accumulated over a session.
///
/// Counters cover the whole session. `transitions` holds the most recent
/// [`MAX_TRANSITIONS`] mode changes so a long-running session stays bounded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub ticks: u64,
    pub commands_sent: u64,
    pub transitions: VecDeque<TransitionRecord>,
    /// Mode changes evicted from `transitions`.
    #[serde(default)]
    pub transitions_dropped: u64,
    /// Ticks whose distance came from the pixel fallback.
    pub fallback_ticks: u64,
    /// Ticks on which the tool was not tracked.
    pub undefined_ticks: u64,
    pub detector_timeouts: u64,
    /// Detections dropped for lack of a depth answer.
    pub depth_failures: u64,
    pub stale_depth_samples: u64,
    pub final_mode: SpeedMode,
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for SessionReport {
    fn default() -> Self {
        Self {
            ticks: 0,
            commands_sent: 0,
            transitions: VecDeque::new(),
            transitions_dropped: 0,
            fallback_ticks: 0,
            undefined_ticks: 0,
            detector_timeouts: 0,
            depth_failures: 0,
            stale_depth_samples: 0,
            final_mode: SpeedMode::Normal,
            error: None,
        }
    }
}

impl SessionReport {
    /// Fold one tick into the report. `previous` is the mode before the tick.
    pub fn record_tick(&mut self, previous: SpeedMode, outcome: &TickOutcome) {
        self.ticks += 1;
        if outcome.detector_timed_out {
            self.detector_timeouts += 1;
        }
        self.depth_failures += outcome.depth_failures as u64;
        self.stale_depth_samples += outcome.stale_depth_samples as u64;
        match outcome.estimate {
            DistanceEstimate::Undefined => self.undefined_ticks += 1,
            ref e if e.is_approximate() => self.fallback_ticks += 1,
            _ => {}
        }
        if outcome.mode != previous {
            if self.transitions.len() == MAX_TRANSITIONS {
                self.transitions.pop_front();
                self.transitions_dropped += 1;
            }
            self.transitions.push_back(TransitionRecord {
                tick: outcome.tick,
                from: previous,
                to: outcome.mode,
                distance: outcome.estimate,
            });
        }
        self.final_mode = outcome.mode;
    }

    /// Count a command that reached the arm.
    pub fn record_command(&mut self, command: &SpeedCommand) {
        self.commands_sent += 1;
        if command.kind == CommandKind::Final {
            self.final_mode = command.mode;
        }
    }

    /// Number of retained transitions into `mode`.
    pub fn entries_into(&self, mode: SpeedMode) -> usize {
        self.transitions.iter().filter(|t| t.to == mode).count()
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
