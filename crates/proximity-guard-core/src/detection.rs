use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Hand-landmark indices of the five fingertips (thumb to little finger).
pub const FINGERTIP_LANDMARKS: [u32; 5] = [4, 8, 12, 16, 20];

/// Class label attached to a detection by the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionClass {
    Hand,
    Tool,
    Unknown,
}

/// One labeled pixel produced by the detector for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelDetection {
    pub class: DetectionClass,
    /// Landmark index within its class (hand keypoint id; 0 for a tool).
    #[serde(default)]
    pub landmark: u32,
    /// Pixel position in the color image.
    pub position: Point2<f32>,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

impl PixelDetection {
    pub fn hand(landmark: u32, u: f32, v: f32, confidence: f32) -> Self {
        Self {
            class: DetectionClass::Hand,
            landmark,
            position: Point2::new(u, v),
            confidence,
        }
    }

    pub fn tool(u: f32, v: f32, confidence: f32) -> Self {
        Self {
            class: DetectionClass::Tool,
            landmark: 0,
            position: Point2::new(u, v),
            confidence,
        }
    }
}

/// Depth reading for a single queried pixel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthSample {
    pub position: Point2<f32>,
    /// Depth along the optical axis, in meters.
    pub depth_m: f32,
    /// `false` when the sensor reported a dropout for this pixel.
    pub valid: bool,
    /// Sensor timestamp of the depth frame the sample was read from.
    pub captured_at_ms: u64,
}

impl DepthSample {
    pub fn new(position: Point2<f32>, depth_m: f32, captured_at_ms: u64) -> Self {
        Self {
            position,
            depth_m,
            valid: depth_m.is_finite() && depth_m > 0.0,
            captured_at_ms,
        }
    }

    pub fn invalid(position: Point2<f32>, captured_at_ms: u64) -> Self {
        Self {
            position,
            depth_m: 0.0,
            valid: false,
            captured_at_ms,
        }
    }

    /// Age of the sample relative to `frame_ms`, in milliseconds.
    #[inline]
    pub fn age_ms(&self, frame_ms: u64) -> u64 {
        frame_ms.abs_diff(self.captured_at_ms)
    }
}

/// Range of depths the sensor reports reliably (exclusive bounds), in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min_m: f32,
    pub max_m: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            min_m: 0.05,
            max_m: 2.0,
        }
    }
}

impl DepthRange {
    #[inline]
    pub fn contains(&self, depth_m: f32) -> bool {
        depth_m.is_finite() && depth_m > 0.0 && depth_m > self.min_m && depth_m < self.max_m
    }
}
