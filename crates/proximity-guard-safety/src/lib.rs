//! Speed-mode state machine for the proximity guard.
//!
//! Maps the per-frame hand-to-tool distance from `proximity-guard-core` to one
//! of three speed directives (NORMAL, SLOW, STOPPED) with a hysteresis band so
//! sensor jitter near a threshold does not make the arm flap between modes.
//!
//! The machine is pure with respect to its inputs: feed it a sequence of
//! [`DistanceEstimate`](proximity_guard_core::DistanceEstimate)s and it yields
//! the commands to forward. It performs no I/O.

mod machine;
mod mode;
mod params;

pub use machine::{CommandKind, ProximityState, SafetyStateMachine, SpeedCommand};
pub use mode::SpeedMode;
pub use params::{SafetyParams, SafetyParamsError};
