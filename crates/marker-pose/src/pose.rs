//! Planar pose estimation for one square marker.
//!
//! The marker plane makes the PnP problem a homography decomposition: the
//! object-plane-to-normalized-image homography factors into `[r1 r2 t]` up to
//! scale. Four coplanar points admit a second local minimum for shallow
//! views, so the mirrored candidate is evaluated too and the pose with the
//! lower reprojection error wins; a damped Gauss-Newton pass then polishes
//! the winner.
//!
//! Marker frame convention: x right, y down in the marker plane, z into the
//! scene. A marker facing the camera head-on therefore has identity rotation,
//! and `tvec.z` is the distance to the marker center.

use marker_pose_core::{homography_from_4pt, CameraModel};
use nalgebra::{Matrix3, Point2, Rotation3, SMatrix, SVector, Unit, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Pose estimation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoseParams {
    /// Reject poses whose RMS reprojection error exceeds this (pixels).
    pub max_reproj_error: f64,
    /// Gauss-Newton iteration budget.
    pub refine_iters: usize,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            max_reproj_error: 3.0,
            refine_iters: 6,
        }
    }
}

/// A solved marker pose in the camera frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerPose {
    /// Axis-angle (Rodrigues) rotation vector.
    pub rvec: Vector3<f64>,
    /// Translation of the marker center, in the units of the marker side.
    pub tvec: Vector3<f64>,
    /// RMS reprojection error of the accepted solution (pixels).
    pub reproj_error: f64,
}

/// Failures that make a candidate's pose unusable for this frame.
///
/// Callers drop the marker and move on; none of these abort the frame.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PoseError {
    #[error("corner configuration is degenerate")]
    DegenerateCorners,
    #[error("homography decomposition failed")]
    DecompositionFailed,
    #[error("solved pose places the marker behind the camera")]
    BehindCamera,
    #[error("reprojection error {rmse:.2}px exceeds the sanity bound")]
    HighReprojection { rmse: f64 },
}

/// Marker corners in the marker frame (z = 0), ordered to match detection
/// output: top-left, top-right, bottom-right, bottom-left.
fn object_corners(side_length: f64) -> [Vector3<f64>; 4] {
    let h = 0.5 * side_length;
    [
        Vector3::new(-h, -h, 0.0),
        Vector3::new(h, -h, 0.0),
        Vector3::new(h, h, 0.0),
        Vector3::new(-h, h, 0.0),
    ]
}

/// Estimate the pose of one marker from its four refined corners.
///
/// `corners` must be in canonical order (top-left first, clockwise) as
/// produced by the detector. `side_length` is the physical marker side in
/// world units; the translation comes out in the same units.
pub fn estimate_marker_pose(
    corners: &[Point2<f32>; 4],
    side_length: f64,
    camera: &CameraModel,
    params: &PoseParams,
) -> Result<MarkerPose, PoseError> {
    let object = object_corners(side_length);
    let observed_px = corners.map(|p| Point2::new(p.x as f64, p.y as f64));

    // undistorted normalized coordinates for the homography estimate
    let mut normalized = [Point2::origin(); 4];
    for (n, p) in normalized.iter_mut().zip(observed_px.iter()) {
        *n = camera
            .undistort_to_normalized(*p)
            .ok_or(PoseError::DegenerateCorners)?;
    }

    let plane = [
        Point2::new(object[0].x, object[0].y),
        Point2::new(object[1].x, object[1].y),
        Point2::new(object[2].x, object[2].y),
        Point2::new(object[3].x, object[3].y),
    ];
    let h = homography_from_4pt(&plane, &normalized).ok_or(PoseError::DegenerateCorners)?;

    let primary = decompose_homography(&h.h).ok_or(PoseError::DecompositionFailed)?;
    let (mut rotation, mut translation) = primary;
    let mut best_err = reprojection_rmse(&rotation, &translation, &object, &observed_px, camera);

    // planar two-fold ambiguity: the mirrored pose reflects the marker
    // normal about the viewing ray through the marker center
    if let Some((alt_r, alt_t)) = mirrored_pose(&rotation, &translation) {
        let alt_err = reprojection_rmse(&alt_r, &alt_t, &object, &observed_px, camera);
        if alt_err < best_err {
            rotation = alt_r;
            translation = alt_t;
            best_err = alt_err;
        }
    }

    if params.refine_iters > 0 {
        (rotation, translation) = refine_pose(
            rotation,
            translation,
            &object,
            &observed_px,
            camera,
            params.refine_iters,
        );
        best_err = reprojection_rmse(&rotation, &translation, &object, &observed_px, camera);
    }

    if translation.z <= 0.0 {
        return Err(PoseError::BehindCamera);
    }
    if !best_err.is_finite() || best_err > params.max_reproj_error {
        return Err(PoseError::HighReprojection { rmse: best_err });
    }

    Ok(MarkerPose {
        rvec: rotation.scaled_axis(),
        tvec: translation,
        reproj_error: best_err,
    })
}

/// Factor a plane-to-normalized-image homography into rotation and
/// translation. The sign is fixed so the marker lies in front of the camera.
fn decompose_homography(h: &Matrix3<f64>) -> Option<(Rotation3<f64>, Vector3<f64>)> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm = 0.5 * (h1.norm() + h2.norm());
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    let mut scale = 1.0 / norm;
    if h3.z * scale < 0.0 {
        scale = -scale;
    }

    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let raw = Matrix3::from_columns(&[r1, r2, r3]);

    // nearest proper rotation
    let svd = raw.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }

    Some((Rotation3::from_matrix_unchecked(r), h3 * scale))
}

/// The second planar-pose solution: marker normal reflected about the line
/// of sight. `None` for (near-)frontal views where both coincide.
fn mirrored_pose(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Option<(Rotation3<f64>, Vector3<f64>)> {
    let dist = translation.norm();
    if dist < 1e-12 {
        return None;
    }
    let sight = translation / dist;
    let normal = rotation.matrix().column(2).into_owned();

    let axis = normal.cross(&sight);
    let sin_theta = axis.norm();
    if sin_theta < 1e-6 {
        return None;
    }
    let cos_theta = normal.dot(&sight).clamp(-1.0, 1.0);
    let theta = sin_theta.atan2(cos_theta);

    let flip = Rotation3::from_axis_angle(&Unit::new_normalize(axis), 2.0 * theta);
    Some((flip * rotation, *translation))
}

fn reprojection_rmse(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    object: &[Vector3<f64>; 4],
    observed_px: &[Point2<f64>; 4],
    camera: &CameraModel,
) -> f64 {
    let mut sum = 0.0;
    for (obj, obs) in object.iter().zip(observed_px.iter()) {
        let p_cam = rotation * obj + translation;
        let Some(pred) = camera.project(&p_cam) else {
            return f64::INFINITY;
        };
        sum += (pred - obs).norm_squared();
    }
    (sum / object.len() as f64).sqrt()
}

/// Damped Gauss-Newton over (axis-angle, translation) with a numerical
/// Jacobian. Rotation updates compose on the left: `R <- exp(dw) * R`.
fn refine_pose(
    mut rotation: Rotation3<f64>,
    mut translation: Vector3<f64>,
    object: &[Vector3<f64>; 4],
    observed_px: &[Point2<f64>; 4],
    camera: &CameraModel,
    iters: usize,
) -> (Rotation3<f64>, Vector3<f64>) {
    const STEP: f64 = 1e-6;
    const DAMPING: f64 = 1e-9;

    let residuals = |r: &Rotation3<f64>, t: &Vector3<f64>| -> Option<SVector<f64, 8>> {
        let mut out = SVector::<f64, 8>::zeros();
        for (i, (obj, obs)) in object.iter().zip(observed_px.iter()).enumerate() {
            let pred = camera.project(&(r * obj + t))?;
            out[2 * i] = pred.x - obs.x;
            out[2 * i + 1] = pred.y - obs.y;
        }
        Some(out)
    };

    for _ in 0..iters {
        let Some(r0) = residuals(&rotation, &translation) else {
            break;
        };

        let mut jacobian = SMatrix::<f64, 8, 6>::zeros();
        let mut ok = true;
        for k in 0..6 {
            let mut delta = Vector6::<f64>::zeros();
            delta[k] = STEP;
            let (rp, tp) = apply_update(&rotation, &translation, &delta);
            delta[k] = -STEP;
            let (rm, tm) = apply_update(&rotation, &translation, &delta);
            match (residuals(&rp, &tp), residuals(&rm, &tm)) {
                (Some(fp), Some(fm)) => {
                    jacobian.set_column(k, &((fp - fm) / (2.0 * STEP)));
                }
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            break;
        }

        let jtj = jacobian.transpose() * jacobian + SMatrix::<f64, 6, 6>::identity() * DAMPING;
        let jtr = jacobian.transpose() * r0;
        let Some(step) = jtj.lu().solve(&(-jtr)) else {
            break;
        };
        if !step.iter().all(|v| v.is_finite()) {
            break;
        }

        let (next_r, next_t) = apply_update(&rotation, &translation, &step);
        let improved = residuals(&next_r, &next_t)
            .map(|r| r.norm() <= r0.norm())
            .unwrap_or(false);
        if !improved {
            break;
        }
        rotation = next_r;
        translation = next_t;
        if step.norm() < 1e-12 {
            break;
        }
    }
    (rotation, translation)
}

fn apply_update(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    delta: &Vector6<f64>,
) -> (Rotation3<f64>, Vector3<f64>) {
    let dw = Vector3::new(delta[0], delta[1], delta[2]);
    let dt = Vector3::new(delta[3], delta[4], delta[5]);
    (Rotation3::new(dw) * rotation, translation + dt)
}
