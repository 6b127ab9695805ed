//! Hand proximity safety monitor for a robot-arm marking tool.
//!
//! This crate re-exports the workspace crates under short module names:
//!
//! - `proximity_guard::core`: intrinsics, unprojection and distance estimation.
//! - `proximity_guard::safety`: speed modes and the hysteretic state machine.
//! - `proximity_guard::runtime`: collaborators, the frame orchestrator and
//!   scripted simulation.
//!
//! ## Quickstart
//!
//! ```no_run
//! use proximity_guard::runtime::sim::{Scenario, ScenarioFrame};
//! use proximity_guard::runtime::{SessionConfig, ShutdownFlag};
//! use proximity_guard::core::CameraIntrinsics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let k = CameraIntrinsics::new(900.0, 900.0, 640.0, 360.0, 1280, 720);
//! let scenario = Scenario::new(k, vec![ScenarioFrame::lateral(&k, 0.5, 0.22)]);
//! let out = proximity_guard::runtime::sim::simulate(
//!     &scenario,
//!     SessionConfig::default(),
//!     &ShutdownFlag::new(),
//! )?;
//! println!("first mode: {}", out.commands[0].mode);
//! # Ok(())
//! # }
//! ```

pub use proximity_guard_core as core;
pub use proximity_guard_runtime as runtime;
pub use proximity_guard_safety as safety;

pub use proximity_guard_core::{CameraIntrinsics, DistanceEstimate, PixelDetection};
pub use proximity_guard_runtime::{
    FrameOrchestrator, SessionConfig, SessionError, SessionReport, ShutdownFlag,
};
pub use proximity_guard_safety::{SafetyParams, SpeedCommand, SpeedMode};
