//! Session runtime for the proximity guard.
//!
//! Wires the geometry of `proximity-guard-core` and the speed-mode machine of
//! `proximity-guard-safety` to the outside world:
//!
//! - [`DetectorAdapter`], [`DepthSampler`], [`CalibrationProvider`] and
//!   [`ArmCommandEmitter`]: collaborator contracts, synchronous with bounded
//!   timeouts.
//! - [`mailbox`]: channel adapters for sensors running on their own threads.
//! - [`FrameOrchestrator`]: the per-tick control loop with staleness handling,
//!   fail-safe stops and graceful shutdown.
//! - [`sim`]: scripted collaborators for replaying scenarios.

mod calibration;
mod collaborators;
mod config;
pub mod mailbox;
mod orchestrator;
mod report;
pub mod sim;

pub use calibration::{FixedCalibration, FovCalibration, JsonCalibration};
pub use collaborators::{
    ArmCommandEmitter, CalibrationError, CalibrationProvider, CommandAck, CommandChannelError,
    DepthSampler, DetectorAdapter, DetectorFrame, SensorError,
};
pub use config::{ConfigError, ConfigIoError, SessionConfig, TimingParams};
pub use mailbox::{depth_channel, detector_channel, ChannelDetector, DepthMap, DepthMapSampler};
pub use orchestrator::{FrameOrchestrator, SessionError, ShutdownFlag, TickOutcome};
pub use report::{SessionReport, StatusLevel, TransitionRecord};
