use crate::{SafetyParams, SpeedMode};
use proximity_guard_core::DistanceEstimate;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a command was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// The machine entered a mode (including the first evaluated tick).
    Entered,
    /// Same mode, but the distance moved by more than the command epsilon.
    Refreshed,
    /// Forced stop issued on session shutdown or after a fatal error.
    Final,
}

/// Speed directive for the arm, tagged with the tick that produced it.
///
/// Ticks increase monotonically so a consumer can drop reordered or
/// superseded commands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedCommand {
    pub tick: u64,
    pub mode: SpeedMode,
    pub speed_pct: u8,
    /// Distance estimate that produced the command.
    pub distance: DistanceEstimate,
    pub kind: CommandKind,
}

/// Long-lived proximity state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximityState {
    /// Latest distance estimate fed to the machine.
    pub distance: DistanceEstimate,
    pub mode: SpeedMode,
    /// Distance carried by the last emitted command.
    pub last_transition_distance: Option<f64>,
    /// Consecutive ticks spent beyond the release distance while held.
    pub clear_streak: u32,
}

impl Default for ProximityState {
    fn default() -> Self {
        Self {
            distance: DistanceEstimate::Undefined,
            mode: SpeedMode::Normal,
            last_transition_distance: None,
            clear_streak: 0,
        }
    }
}

/// Hysteretic distance → speed-mode state machine.
///
/// Tightening (towards STOPPED) is immediate. Relaxing from SLOW or STOPPED
/// requires the distance to stay beyond `slow_threshold_m + hysteresis_margin_m`
/// for `hysteresis_hold_frames` consecutive ticks, after which the machine
/// returns straight to NORMAL.
#[derive(Clone, Debug)]
pub struct SafetyStateMachine {
    params: SafetyParams,
    state: ProximityState,
    announced: bool,
}

impl SafetyStateMachine {
    pub fn new(params: SafetyParams) -> Self {
        Self {
            params,
            state: ProximityState::default(),
            announced: false,
        }
    }

    #[inline]
    pub fn params(&self) -> &SafetyParams {
        &self.params
    }

    #[inline]
    pub fn state(&self) -> &ProximityState {
        &self.state
    }

    #[inline]
    pub fn mode(&self) -> SpeedMode {
        self.state.mode
    }

    /// Distance the thresholds are compared against.
    ///
    /// Pixel-fallback distances are shrunk by `approximate_margin_m` so a
    /// degraded estimate errs toward slowing down.
    pub fn effective_distance(&self, estimate: &DistanceEstimate) -> Option<f64> {
        let d = estimate.meters()?;
        if estimate.is_approximate() {
            Some((d - self.params.approximate_margin_m).max(0.0))
        } else {
            Some(d)
        }
    }

    /// Feed one tick's distance estimate; returns the command to forward, if any.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, estimate), fields(mode = %self.state.mode))
    )]
    pub fn update(&mut self, estimate: DistanceEstimate, tick: u64) -> Option<SpeedCommand> {
        let effective = self.effective_distance(&estimate);
        let target = SpeedMode::classify(effective, &self.params);
        let current = self.state.mode;

        let next = if target.rank() <= current.rank() {
            self.state.clear_streak = 0;
            target
        } else if effective.is_some_and(|d| d > self.params.release_distance_m()) {
            self.state.clear_streak += 1;
            if self.state.clear_streak >= self.params.hysteresis_hold_frames {
                self.state.clear_streak = 0;
                target
            } else {
                log::debug!(
                    "tick {tick}: holding {current} ({}/{} clear frames)",
                    self.state.clear_streak,
                    self.params.hysteresis_hold_frames
                );
                current
            }
        } else {
            self.state.clear_streak = 0;
            current
        };

        self.state.distance = estimate;
        self.state.mode = next;

        let reported = estimate.meters();
        let kind = if next != current || !self.announced {
            report_transition(current, next, &estimate, tick);
            CommandKind::Entered
        } else if distance_moved(
            self.state.last_transition_distance,
            reported,
            self.params.command_epsilon_m,
        ) {
            log::debug!("tick {tick}: refreshing {next} at {}", describe(&estimate));
            CommandKind::Refreshed
        } else {
            return None;
        };

        self.announced = true;
        self.state.last_transition_distance = reported;
        Some(self.command(tick, kind))
    }

    /// Force STOPPED regardless of distance history.
    pub fn force_stop(&mut self, tick: u64) -> SpeedCommand {
        if self.state.mode != SpeedMode::Stopped {
            log::warn!("tick {tick}: forcing {} -> STOPPED", self.state.mode);
        }
        self.state.mode = SpeedMode::Stopped;
        self.state.clear_streak = 0;
        self.state.last_transition_distance = self.state.distance.meters();
        self.announced = true;
        self.command(tick, CommandKind::Final)
    }

    fn command(&self, tick: u64, kind: CommandKind) -> SpeedCommand {
        SpeedCommand {
            tick,
            mode: self.state.mode,
            speed_pct: self.state.mode.speed_pct(&self.params),
            distance: self.state.distance,
            kind,
        }
    }
}

fn report_transition(from: SpeedMode, to: SpeedMode, estimate: &DistanceEstimate, tick: u64) {
    let what = describe(estimate);
    match to {
        SpeedMode::Stopped if matches!(estimate, DistanceEstimate::Undefined) => {
            log::warn!("tick {tick}: tool not tracked, {from} -> STOPPED (fail-safe)")
        }
        SpeedMode::Stopped | SpeedMode::Slow => {
            log::warn!("tick {tick}: hand at {what}, {from} -> {to}")
        }
        SpeedMode::Normal => log::info!("tick {tick}: hand at {what}, {from} -> NORMAL"),
    }
}

fn describe(estimate: &DistanceEstimate) -> String {
    match estimate {
        DistanceEstimate::Measured(m) if m.approximate => format!("~{:.3} m", m.meters),
        DistanceEstimate::Measured(m) => format!("{:.3} m", m.meters),
        DistanceEstimate::NoHand => "no hand".to_string(),
        DistanceEstimate::Undefined => "unknown distance".to_string(),
    }
}

fn distance_moved(last: Option<f64>, now: Option<f64>, epsilon: f64) -> bool {
    match (last, now) {
        (None, None) => false,
        (Some(a), Some(b)) if a.is_infinite() && b.is_infinite() => false,
        (Some(a), Some(b)) => (a - b).abs() > epsilon,
        _ => true,
    }
}
