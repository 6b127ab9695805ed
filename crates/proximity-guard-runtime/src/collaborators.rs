//! Contracts the orchestrator requires from the outside world.
//!
//! Every collaborator is driven synchronously from the orchestrator thread.
//! Sources that deliver data asynchronously are adapted to these blocking,
//! timeout-bounded calls at the boundary (see [`crate::mailbox`]).

use nalgebra::Point2;
use proximity_guard_core::{CameraIntrinsics, DepthSample, IntrinsicsError, PixelDetection};
use proximity_guard_safety::SpeedCommand;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure of a sensor poll.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("no data within {0:?}")]
    Timeout(Duration),
    #[error("sensor stream disconnected")]
    Disconnected,
}

/// Detector output for one color frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorFrame {
    /// Capture timestamp of the color frame.
    pub timestamp_ms: u64,
    pub detections: Vec<PixelDetection>,
}

/// Source of labeled 2D detections.
pub trait DetectorAdapter {
    /// Wait at most `timeout` for the next frame.
    fn poll(&mut self, timeout: Duration) -> Result<DetectorFrame, SensorError>;
}

/// Source of per-pixel depth.
pub trait DepthSampler {
    /// Depth at `pixel` from the depth frame closest to `timestamp_ms`.
    ///
    /// Dropouts are reported as a sample with `valid == false`; errors are
    /// reserved for the source itself failing to answer.
    fn sample(
        &mut self,
        pixel: Point2<f32>,
        timestamp_ms: u64,
        timeout: Duration,
    ) -> Result<DepthSample, SensorError>;
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("calibration unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Invalid(#[from] IntrinsicsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Supplies camera intrinsics once, at session start.
pub trait CalibrationProvider {
    fn load(&mut self) -> Result<CameraIntrinsics, CalibrationError>;
}

/// Acknowledgement returned by the arm controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub tick: u64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandChannelError {
    #[error("no acknowledgement for tick {tick} within {timeout:?}")]
    AckTimeout { tick: u64, timeout: Duration },
    #[error("command for tick {tick} rejected: {reason}")]
    Rejected { tick: u64, reason: String },
    #[error("command channel disconnected")]
    Disconnected,
}

/// Sink for speed directives (the arm / print controller link).
pub trait ArmCommandEmitter {
    /// Deliver `command` and wait at most `ack_timeout` for its acknowledgement.
    fn send(
        &mut self,
        command: &SpeedCommand,
        ack_timeout: Duration,
    ) -> Result<CommandAck, CommandChannelError>;
}

impl<T: DetectorAdapter + ?Sized> DetectorAdapter for Box<T> {
    fn poll(&mut self, timeout: Duration) -> Result<DetectorFrame, SensorError> {
        (**self).poll(timeout)
    }
}

impl<T: DepthSampler + ?Sized> DepthSampler for Box<T> {
    fn sample(
        &mut self,
        pixel: Point2<f32>,
        timestamp_ms: u64,
        timeout: Duration,
    ) -> Result<DepthSample, SensorError> {
        (**self).sample(pixel, timestamp_ms, timeout)
    }
}

impl<T: ArmCommandEmitter + ?Sized> ArmCommandEmitter for Box<T> {
    fn send(
        &mut self,
        command: &SpeedCommand,
        ack_timeout: Duration,
    ) -> Result<CommandAck, CommandChannelError> {
        (**self).send(command, ack_timeout)
    }
}
