//! Pinhole camera model with Brown-Conrady radial-tangential distortion.
//!
//! The model is immutable configuration: it is validated once at startup and
//! shared read-only by every frame. All math is in `f64`.

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// `true` when all parameters are finite and the focal lengths positive.
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 1e-9
            && self.fy > 1e-9
    }

    /// The 3x3 camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

/// Brown-Conrady distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }

    /// Apply distortion in normalized coordinates.
    pub fn distort(&self, n: Point2<f64>) -> Point2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }
}

/// Intrinsics plus distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

const UNDISTORT_ITERS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-12;

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a camera-frame point onto the image, applying distortion.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= 1e-9 {
            return None;
        }
        let n = Point2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let d = self.distortion.distort(n);
        let pix = self.intrinsics.normalized_to_pixel(d);
        (pix.x.is_finite() && pix.y.is_finite()).then_some(pix)
    }

    /// Map a distorted pixel to undistorted normalized coordinates.
    ///
    /// Fixed-point inversion of the distortion model. Returns `None` if the
    /// iteration diverges (coefficients far outside the valid image region).
    pub fn undistort_to_normalized(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        let observed = self.intrinsics.pixel_to_normalized(pixel);
        if self.distortion.is_zero() {
            return Some(observed);
        }

        let d = &self.distortion;
        let mut x = observed.x;
        let mut y = observed.y;
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (d.k1 + r2 * (d.k2 + r2 * d.k3));
            if !radial.is_finite() || radial.abs() < 1e-9 {
                return None;
            }
            let dx = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
            let dy = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
            let nx = (observed.x - dx) / radial;
            let ny = (observed.y - dy) / radial;
            if !nx.is_finite() || !ny.is_finite() {
                return None;
            }
            let step = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
            x = nx;
            y = ny;
            if step <= UNDISTORT_EPS {
                break;
            }
        }
        Some(Point2::new(x, y))
    }

    /// Map a distorted pixel to its undistorted pixel position.
    pub fn undistort_pixel(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        self.undistort_to_normalized(pixel)
            .map(|n| self.intrinsics.normalized_to_pixel(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_with_distortion() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics {
                fx: 850.0,
                fy: 870.0,
                cx: 640.0,
                cy: 360.0,
            },
            Distortion {
                k1: -0.15,
                k2: 0.04,
                p1: 0.0008,
                p2: -0.0005,
                k3: 0.0,
            },
        )
    }

    #[test]
    fn invalid_focal_lengths_are_flagged() {
        let k = CameraIntrinsics {
            fx: 0.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        };
        assert!(!k.is_valid());
        assert!(CameraIntrinsics {
            fx: 700.0,
            fy: 700.0,
            cx: 320.0,
            cy: 240.0
        }
        .is_valid());
    }

    #[test]
    fn projection_rejects_points_behind_camera() {
        let cam = camera_with_distortion();
        assert!(cam.project(&Vector3::new(0.1, 0.1, -2.0)).is_none());
        assert!(cam.project(&Vector3::new(0.1, 0.1, 2.0)).is_some());
    }

    #[test]
    fn undistort_inverts_projection() {
        let cam = camera_with_distortion();
        let p_cam = Vector3::new(0.4, -0.25, 3.0);
        let pix = cam.project(&p_cam).expect("in front of camera");
        let n = cam.undistort_to_normalized(pix).expect("converges");
        approx::assert_abs_diff_eq!(n.x, p_cam.x / p_cam.z, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(n.y, p_cam.y / p_cam.z, epsilon = 1e-9);
    }

    #[test]
    fn zero_distortion_is_a_pure_pinhole() {
        let cam = CameraModel::new(
            CameraIntrinsics {
                fx: 700.0,
                fy: 700.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion::default(),
        );
        let pix = cam.project(&Vector3::new(0.0, 0.0, 50.0)).unwrap();
        assert_eq!(pix, Point2::new(320.0, 240.0));
        let n = cam.undistort_to_normalized(Point2::new(320.0, 240.0)).unwrap();
        assert_eq!(n, Point2::new(0.0, 0.0));
    }
}
