//! Gradient-based sub-pixel corner refinement.
//!
//! Polygon approximation leaves corners on the pixel grid. For pose accuracy
//! each corner is re-estimated as the point `q` satisfying
//! `sum_i w_i (g_i g_i^T)(q - p_i) = 0` over a small window, where `g_i` is
//! the image gradient at window sample `p_i`. Both edge lines meeting at the
//! corner constrain `q` to their intersection.

use marker_pose_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Window and convergence settings for corner refinement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefineParams {
    /// Half side of the square refinement window, in pixels.
    pub half_window: usize,
    /// Iteration budget per corner.
    pub max_iters: usize,
    /// Stop once a corner moves less than this (pixels).
    pub epsilon: f32,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            half_window: 4,
            max_iters: 8,
            epsilon: 0.015,
        }
    }
}

/// Refine a single corner. The result never leaves a `half_window` radius of
/// the initial estimate, so a bad gradient field cannot drag a corner away.
pub fn refine_corner(
    image: &GrayImageView<'_>,
    initial: Point2<f32>,
    params: &RefineParams,
) -> Point2<f32> {
    let hw = params.half_window as i32;
    let sigma2 = {
        let s = params.half_window as f32 * 0.5;
        2.0 * s * s
    };

    let mut corner = initial;
    for _ in 0..params.max_iters {
        let mut a = Matrix2::<f32>::zeros();
        let mut b = Vector2::<f32>::zeros();

        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let px = corner.x + dx as f32;
                let py = corner.y + dy as f32;
                if px < 1.0
                    || py < 1.0
                    || px > image.width as f32 - 2.0
                    || py > image.height as f32 - 2.0
                {
                    continue;
                }
                let gx = 0.5 * (sample_bilinear(image, px + 1.0, py) - sample_bilinear(image, px - 1.0, py));
                let gy = 0.5 * (sample_bilinear(image, px, py + 1.0) - sample_bilinear(image, px, py - 1.0));
                let w = (-((dx * dx + dy * dy) as f32) / sigma2).exp();

                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 0)] += gxy;
                a[(1, 1)] += gyy;
                b[0] += gxx * px + gxy * py;
                b[1] += gxy * px + gyy * py;
            }
        }

        let Some(inv) = a.try_inverse() else {
            break; // flat window, nothing to refine against
        };
        if a.determinant().abs() < 1e-4 {
            break;
        }
        let solved = inv * b;
        let next = Point2::new(solved[0], solved[1]);
        let step = (next - corner).norm();
        if !next.x.is_finite() || !next.y.is_finite() {
            break;
        }
        // clamp against runaway solutions on weak gradients
        if (next - initial).norm() > params.half_window as f32 {
            break;
        }
        corner = next;
        if step < params.epsilon {
            break;
        }
    }
    corner
}

/// Refine all four quad corners in place.
pub fn refine_quad_corners(
    image: &GrayImageView<'_>,
    corners: &[Point2<f32>; 4],
    params: &RefineParams,
) -> [Point2<f32>; 4] {
    corners.map(|c| refine_corner(image, c, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_pose_core::GrayImage;

    /// Dark square with its top-left corner at a fractional position,
    /// rendered with area coverage along the edges.
    fn corner_image(cx: f32, cy: f32) -> GrayImage {
        let mut img = GrayImage::filled(40, 40, 255);
        for y in 0..40 {
            for x in 0..40 {
                let cover_x = (x as f32 + 0.5 - cx).clamp(0.0, 1.0);
                let cover_y = (y as f32 + 0.5 - cy).clamp(0.0, 1.0);
                let cover = cover_x * cover_y;
                img.data[y * 40 + x] = (255.0 * (1.0 - cover)) as u8;
            }
        }
        img
    }

    #[test]
    fn corner_converges_to_subpixel_position() {
        let truth = Point2::new(17.3, 19.6);
        let img = corner_image(truth.x, truth.y);
        let refined = refine_corner(&img.view(), Point2::new(18.0, 20.0), &RefineParams::default());
        assert!(
            (refined - truth).norm() < 0.35,
            "refined {:?} too far from {:?}",
            refined,
            truth
        );
    }

    #[test]
    fn flat_region_leaves_the_corner_unchanged() {
        let img = GrayImage::filled(40, 40, 128);
        let initial = Point2::new(20.0, 20.0);
        let refined = refine_corner(&img.view(), initial, &RefineParams::default());
        assert_eq!(refined, initial);
    }
}
