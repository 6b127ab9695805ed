//! Calibration providers.

use crate::{CalibrationError, CalibrationProvider};
use proximity_guard_core::CameraIntrinsics;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Intrinsics known up front (e.g. read from the sensor at startup).
#[derive(Clone, Copy, Debug)]
pub struct FixedCalibration(pub CameraIntrinsics);

impl CalibrationProvider for FixedCalibration {
    fn load(&mut self) -> Result<CameraIntrinsics, CalibrationError> {
        self.0.validate()?;
        Ok(self.0)
    }
}

/// Intrinsics approximated from image size and horizontal field of view.
///
/// Used when the camera cannot report its own calibration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FovCalibration {
    pub width: u32,
    pub height: u32,
    pub fov_deg: f64,
}

impl Default for FovCalibration {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fov_deg: 87.0,
        }
    }
}

impl CalibrationProvider for FovCalibration {
    fn load(&mut self) -> Result<CameraIntrinsics, CalibrationError> {
        let k = CameraIntrinsics::from_horizontal_fov(self.width, self.height, self.fov_deg)?;
        log::info!(
            "approximate calibration from {:.0} deg FOV: fx={:.1} fy={:.1}",
            self.fov_deg,
            k.fx,
            k.fy
        );
        Ok(k)
    }
}

/// Intrinsics stored as JSON on disk.
#[derive(Clone, Debug)]
pub struct JsonCalibration {
    path: PathBuf,
}

impl JsonCalibration {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CalibrationProvider for JsonCalibration {
    fn load(&mut self) -> Result<CameraIntrinsics, CalibrationError> {
        let raw = fs::read_to_string(&self.path)?;
        let k: CameraIntrinsics = serde_json::from_str(&raw)?;
        k.validate()?;
        Ok(k)
    }
}
