//! Hand-to-tool distance estimation.
//!
//! The estimator pairs every hand landmark with the tool and keeps the closest
//! pair. A pair whose two points both have valid depth is measured in 3D; any
//! other pair falls back to pixel distance scaled by the last known
//! meters-per-pixel ratio, and the result is flagged approximate. Pairs are
//! ranked by their conservative distance: approximate pairs are shortened by
//! the approximate margin before comparing, so a fallback landmark that may be
//! closer is never hidden behind a measured one.

use crate::{
    unproject, CameraIntrinsics, DepthRange, DepthSample, DetectionClass, PixelDetection, Point3D,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

fn default_fallback_scale() -> f64 {
    0.0018
}

fn default_min_confidence() -> f32 {
    0.2
}

/// Errors returned by [`EstimatorParams::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EstimatorParamsError {
    #[error("depth range must satisfy 0 <= min < max with finite bounds, got {min_m}..{max_m} m")]
    DepthRange { min_m: f32, max_m: f32 },
    #[error("fallback scale must be finite and positive, got {0} m/px")]
    FallbackScale(f64),
    #[error("minimum confidence must lie in 0..=1, got {0}")]
    MinConfidence(f32),
    #[error("hand landmark filter is empty; no hand would ever be measured")]
    EmptyLandmarkFilter,
}

/// Configuration for detection filtering and distance estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Depths outside this range are treated as sensor dropouts.
    #[serde(default)]
    pub depth_range: DepthRange,
    /// Meters per pixel used by the fallback path before any valid depth was seen.
    #[serde(default = "default_fallback_scale")]
    pub fallback_scale_default: f64,
    /// Detections below this confidence are discarded before estimation.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Hand landmarks to measure against; `None` uses every landmark reported.
    #[serde(default)]
    pub hand_landmarks: Option<Vec<u32>>,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            depth_range: DepthRange::default(),
            fallback_scale_default: default_fallback_scale(),
            min_confidence: default_min_confidence(),
            hand_landmarks: None,
        }
    }
}

impl EstimatorParams {
    pub fn validate(&self) -> Result<(), EstimatorParamsError> {
        let DepthRange { min_m, max_m } = self.depth_range;
        if !(min_m.is_finite() && max_m.is_finite() && min_m >= 0.0 && min_m < max_m) {
            return Err(EstimatorParamsError::DepthRange { min_m, max_m });
        }
        if !(self.fallback_scale_default.is_finite() && self.fallback_scale_default > 0.0) {
            return Err(EstimatorParamsError::FallbackScale(
                self.fallback_scale_default,
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EstimatorParamsError::MinConfidence(self.min_confidence));
        }
        if self.hand_landmarks.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Err(EstimatorParamsError::EmptyLandmarkFilter);
        }
        Ok(())
    }
}

/// Tool and hand detections retained for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameTargets {
    pub tool: Option<PixelDetection>,
    pub hands: Vec<PixelDetection>,
}

/// Pick the tool and the hand landmarks of interest from raw detections.
///
/// Unknown classes, low-confidence detections and pixels outside the image are
/// dropped. When several tools are reported the most confident one wins; ties
/// keep the earliest.
pub fn select_targets(
    detections: &[PixelDetection],
    intrinsics: &CameraIntrinsics,
    params: &EstimatorParams,
) -> FrameTargets {
    let mut targets = FrameTargets::default();

    for det in detections {
        if det.confidence.is_nan()
            || det.confidence < params.min_confidence
            || !intrinsics.contains(det.position)
        {
            continue;
        }
        match det.class {
            DetectionClass::Tool => match targets.tool {
                Some(best) if best.confidence >= det.confidence => {}
                _ => targets.tool = Some(*det),
            },
            DetectionClass::Hand => {
                let wanted = params
                    .hand_landmarks
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&det.landmark));
                if wanted {
                    targets.hands.push(*det);
                }
            }
            DetectionClass::Unknown => {}
        }
    }

    targets
}

/// A detection located in the camera frame (or left in pixel space).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub landmark: u32,
    pub pixel: Point2<f32>,
    pub point: Point3D,
}

/// Closest hand-to-tool pair of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Separation in meters, never negative.
    pub meters: f64,
    /// `true` when the value came from the pixel fallback.
    pub approximate: bool,
    /// Landmark index of the closest hand point.
    pub landmark: u32,
    pub tool: Point3D,
    pub hand: Point3D,
}

/// Distance between hand and tool for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistanceEstimate {
    Measured(Measurement),
    /// Tool visible, no hand: no proximity risk (`+inf`).
    NoHand,
    /// Tool not visible: distance is unknown and must be handled as unsafe.
    Undefined,
}

impl DistanceEstimate {
    /// Distance in meters; `+inf` without a hand, `None` when undefined.
    pub fn meters(&self) -> Option<f64> {
        match self {
            DistanceEstimate::Measured(m) => Some(m.meters),
            DistanceEstimate::NoHand => Some(f64::INFINITY),
            DistanceEstimate::Undefined => None,
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, DistanceEstimate::Measured(m) if m.approximate)
    }
}

/// Unprojects detections and measures the closest hand-to-tool pair.
///
/// Holds the last meters-per-pixel ratio derived from valid depth so the
/// fallback path can reuse it during sensor dropouts.
#[derive(Clone, Debug)]
pub struct DistanceEstimator {
    intrinsics: CameraIntrinsics,
    params: EstimatorParams,
    last_scale: Option<f64>,
    approximate_margin_m: f64,
}

impl DistanceEstimator {
    pub fn new(intrinsics: CameraIntrinsics, params: EstimatorParams) -> Self {
        Self {
            intrinsics,
            params,
            last_scale: None,
            approximate_margin_m: 0.0,
        }
    }

    /// Rank approximate pairs as if they were `margin_m` closer.
    ///
    /// Only affects which pair is chosen; the reported meters stay raw.
    pub fn with_approximate_margin(mut self, margin_m: f64) -> Self {
        self.approximate_margin_m = margin_m.max(0.0);
        self
    }

    #[inline]
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    #[inline]
    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    /// Meters per pixel the fallback path would use right now.
    pub fn fallback_scale(&self) -> f64 {
        self.last_scale.unwrap_or(self.params.fallback_scale_default)
    }

    /// Whether a scale has been learned from valid depth yet.
    pub fn has_learned_scale(&self) -> bool {
        self.last_scale.is_some()
    }

    /// Locate a detection in 3D from its depth sample, or keep it in pixel space.
    ///
    /// `depth` is `None` when no usable sample exists (timeout, stale frame).
    pub fn locate(&self, detection: &PixelDetection, depth: Option<&DepthSample>) -> Observation {
        let point = match depth.filter(|s| s.valid) {
            Some(sample) => unproject(
                detection.position,
                sample.depth_m,
                &self.intrinsics,
                &self.params.depth_range,
            )
            .unwrap_or_else(|err| {
                log::debug!("landmark {}: {err}; using pixel fallback", detection.landmark);
                Point3D::fallback(detection.position)
            }),
            None => Point3D::fallback(detection.position),
        };

        Observation {
            landmark: detection.landmark,
            pixel: detection.position,
            point,
        }
    }

    /// Measure the closest hand landmark to the tool.
    ///
    /// Closeness is judged on the conservative distance; ties are broken by
    /// the lowest landmark index.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, tool, hands), fields(hands = hands.len()))
    )]
    pub fn estimate(&mut self, tool: Option<&Observation>, hands: &[Observation]) -> DistanceEstimate {
        let Some(tool) = tool else {
            return DistanceEstimate::Undefined;
        };
        if hands.is_empty() {
            return DistanceEstimate::NoHand;
        }

        self.learn_scale(tool, hands);
        let scale = self.fallback_scale();

        let mut best: Option<(f64, Measurement)> = None;
        for hand in hands {
            let candidate = measure_pair(tool, hand, scale);
            let rank = self.conservative(&candidate);
            let better = match &best {
                None => true,
                Some((best_rank, b)) => {
                    rank < *best_rank || (rank == *best_rank && candidate.landmark < b.landmark)
                }
            };
            if better {
                best = Some((rank, candidate));
            }
        }

        best.map_or(DistanceEstimate::NoHand, |(_, m)| DistanceEstimate::Measured(m))
    }

    fn conservative(&self, m: &Measurement) -> f64 {
        if m.approximate {
            (m.meters - self.approximate_margin_m).max(0.0)
        } else {
            m.meters
        }
    }

    fn learn_scale(&mut self, tool: &Observation, hands: &[Observation]) {
        if tool.point.is_fallback() {
            return;
        }
        let focal = self.intrinsics.mean_focal();
        let mut sum = 0.0;
        let mut n = 0usize;
        for hand in hands.iter().filter(|h| !h.point.is_fallback()) {
            let mean_z = 0.5 * (tool.point.position.z + hand.point.position.z);
            sum += mean_z / focal;
            n += 1;
        }
        if n > 0 {
            self.last_scale = Some(sum / n as f64);
        }
    }
}

fn measure_pair(tool: &Observation, hand: &Observation, scale: f64) -> Measurement {
    let both_depth = !tool.point.is_fallback() && !hand.point.is_fallback();
    let meters = if both_depth {
        nalgebra::distance(&tool.point.position, &hand.point.position)
    } else {
        let du = (tool.pixel.x - hand.pixel.x) as f64;
        let dv = (tool.pixel.y - hand.pixel.y) as f64;
        (du * du + dv * dv).sqrt() * scale
    };

    Measurement {
        meters,
        approximate: !both_depth,
        landmark: hand.landmark,
        tool: tool.point,
        hand: hand.point,
    }
}
