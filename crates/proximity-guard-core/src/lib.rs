//! Core geometry for the proximity guard.
//!
//! This crate turns detector pixels plus depth samples into a hand-to-tool
//! distance. It is purely geometric: it knows nothing about speed modes,
//! sensors or the arm link.
//!
//! - [`CameraIntrinsics`]: pinhole calibration of the color camera.
//! - [`unproject`]: pixel + depth to a camera-frame [`Point3D`].
//! - [`DistanceEstimator`]: closest hand landmark to the tool, with a pixel
//!   fallback when depth drops out.

mod detection;
mod distance;
mod intrinsics;
mod logger;
mod unproject;

pub use detection::{DepthRange, DepthSample, DetectionClass, PixelDetection, FINGERTIP_LANDMARKS};
pub use distance::{
    select_targets, DistanceEstimate, DistanceEstimator, EstimatorParams, EstimatorParamsError,
    FrameTargets, Measurement, Observation,
};
pub use intrinsics::{CameraIntrinsics, IntrinsicsError};
pub use unproject::{unproject, Point3D, PointSource, UnprojectError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, set_log_tick};
