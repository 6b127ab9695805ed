use crate::{CameraIntrinsics, DepthRange};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Returned when a depth value cannot be turned into a 3D point.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum UnprojectError {
    #[error("invalid depth {depth_m} m (valid range {min_m}..{max_m} m)")]
    InvalidDepth { depth_m: f32, min_m: f32, max_m: f32 },
}

/// Where the coordinates of a [`Point3D`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    /// Unprojected from a valid depth sample.
    Depth,
    /// Pixel-only position; no metric depth was available.
    FallbackPixel,
}

/// A point in the color-camera frame, in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub position: Point3<f64>,
    pub source: PointSource,
}

impl Point3D {
    /// Pixel-space placeholder for a point whose depth is unknown (`z = 0`).
    pub fn fallback(pixel: Point2<f32>) -> Self {
        Self {
            position: Point3::new(pixel.x as f64, pixel.y as f64, 0.0),
            source: PointSource::FallbackPixel,
        }
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.source == PointSource::FallbackPixel
    }
}

/// Pinhole inverse projection of `pixel` at depth `depth_m`.
///
/// `X = (u - cx) * Z / fx`, `Y = (v - cy) * Z / fy`, `Z = depth_m`.
pub fn unproject(
    pixel: Point2<f32>,
    depth_m: f32,
    intrinsics: &CameraIntrinsics,
    range: &DepthRange,
) -> Result<Point3D, UnprojectError> {
    if !range.contains(depth_m) {
        return Err(UnprojectError::InvalidDepth {
            depth_m,
            min_m: range.min_m,
            max_m: range.max_m,
        });
    }

    let z = depth_m as f64;
    let x = (pixel.x as f64 - intrinsics.cx) * z / intrinsics.fx;
    let y = (pixel.y as f64 - intrinsics.cy) * z / intrinsics.fy;

    Ok(Point3D {
        position: Point3::new(x, y, z),
        source: PointSource::Depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(900.0, 880.0, 640.0, 360.0, 1280, 720)
    }

    #[test]
    fn principal_point_maps_onto_optical_axis() {
        let p = unproject(
            Point2::new(640.0, 360.0),
            0.8,
            &intrinsics(),
            &DepthRange::default(),
        )
        .expect("valid depth");
        assert_relative_eq!(p.position.x, 0.0);
        assert_relative_eq!(p.position.y, 0.0);
        assert_relative_eq!(p.position.z, 0.8, epsilon = 1e-6);
        assert_eq!(p.source, PointSource::Depth);
    }

    #[test]
    fn satisfies_inverse_projection_equations() {
        let k = intrinsics();
        for (u, v, z) in [
            (100.0_f32, 50.0_f32, 0.3_f32),
            (1200.0, 700.0, 1.5),
            (640.5, 10.25, 0.06),
        ] {
            let p = unproject(Point2::new(u, v), z, &k, &DepthRange::default()).expect("valid");
            let zf = z as f64;
            assert_relative_eq!(p.position.x, (u as f64 - k.cx) * zf / k.fx, epsilon = 1e-9);
            assert_relative_eq!(p.position.y, (v as f64 - k.cy) * zf / k.fy, epsilon = 1e-9);

            // Re-projecting through K recovers the pixel.
            let proj = k.camera_matrix() * Vector3::new(p.position.x, p.position.y, p.position.z);
            assert_relative_eq!(proj.x / proj.z, u as f64, epsilon = 1e-4);
            assert_relative_eq!(proj.y / proj.z, v as f64, epsilon = 1e-4);
        }
    }

    #[test]
    fn is_deterministic() {
        let k = intrinsics();
        let a = unproject(Point2::new(321.0, 123.0), 0.42, &k, &DepthRange::default());
        let b = unproject(Point2::new(321.0, 123.0), 0.42, &k, &DepthRange::default());
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_out_of_range_depth() {
        let k = intrinsics();
        let range = DepthRange::default();
        for z in [0.0_f32, -0.3, 0.01, 2.5, f32::NAN, f32::INFINITY] {
            let err = unproject(Point2::new(10.0, 10.0), z, &k, &range);
            assert!(
                matches!(err, Err(UnprojectError::InvalidDepth { .. })),
                "depth {z} should be rejected"
            );
        }
    }

    #[test]
    fn fallback_point_keeps_pixel_coordinates() {
        let p = Point3D::fallback(Point2::new(12.0, 34.0));
        assert!(p.is_fallback());
        assert_relative_eq!(p.position.x, 12.0);
        assert_relative_eq!(p.position.y, 34.0);
    }
}
