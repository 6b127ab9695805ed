use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Errors returned when intrinsics cannot be used for unprojection.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntrinsicsError {
    #[error("focal length must be finite and positive (fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("principal point must be finite (cx={cx}, cy={cy})")]
    InvalidPrincipalPoint { cx: f64, cy: f64 },
    #[error("image size must be non-zero (width={width}, height={height})")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("horizontal field of view must be in (0, 180) degrees, got {fov_deg}")]
    InvalidFieldOfView { fov_deg: f64 },
}

/// Pinhole intrinsics of the color camera.
///
/// Depth is assumed to be aligned to the color stream, so one set of
/// intrinsics serves both. Immutable once calibration is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length along x, in pixels.
    pub fx: f64,
    /// Focal length along y, in pixels.
    pub fy: f64,
    /// Principal point x, in pixels.
    pub cx: f64,
    /// Principal point y, in pixels.
    pub cy: f64,
    /// Color image width in pixels.
    pub width: u32,
    /// Color image height in pixels.
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Approximate intrinsics from the horizontal field of view.
    ///
    /// Square pixels are assumed (`fy = fx`) and the principal point sits at
    /// the image center. Used when the sensor cannot report its own intrinsics.
    pub fn from_horizontal_fov(width: u32, height: u32, fov_deg: f64) -> Result<Self, IntrinsicsError> {
        if width == 0 || height == 0 {
            return Err(IntrinsicsError::InvalidImageSize { width, height });
        }
        if !fov_deg.is_finite() || fov_deg <= 0.0 || fov_deg >= 180.0 {
            return Err(IntrinsicsError::InvalidFieldOfView { fov_deg });
        }
        let half = (fov_deg.to_radians() * 0.5).tan();
        let fx = width as f64 / (2.0 * half);
        Ok(Self::new(
            fx,
            fx,
            width as f64 * 0.5,
            height as f64 * 0.5,
            width,
            height,
        ))
    }

    /// Check that these intrinsics can be used for unprojection.
    pub fn validate(&self) -> Result<(), IntrinsicsError> {
        let focal_ok = |f: f64| f.is_finite() && f > 0.0;
        if !focal_ok(self.fx) || !focal_ok(self.fy) {
            return Err(IntrinsicsError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(IntrinsicsError::InvalidPrincipalPoint {
                cx: self.cx,
                cy: self.cy,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(IntrinsicsError::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// The 3×3 camera matrix `K`.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Mean focal length, used to convert between pixels and meters at a given depth.
    #[inline]
    pub fn mean_focal(&self) -> f64 {
        0.5 * (self.fx + self.fy)
    }

    /// Whether the pixel lies inside the color image.
    #[inline]
    pub fn contains(&self, p: Point2<f32>) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.width as f32 && p.y < self.height as f32
    }
}
