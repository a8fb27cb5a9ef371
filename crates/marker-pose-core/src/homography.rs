use crate::{sample_bilinear_u8, GrayImage, GrayImageView};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

/// Plane projective transform `p_dst ~ H * p_src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    #[inline]
    pub fn apply_f32(&self, p: Point2<f32>) -> Point2<f32> {
        let q = self.apply(Point2::new(p.x as f64, p.y as f64));
        Point2::new(q.x as f32, q.y as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Hartley conditioning transform: centroid to origin, mean radius sqrt(2).
fn conditioning_transform(pts: &[Point2<f64>; 4]) -> Matrix3<f64> {
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx *= 0.25;
    cy *= 0.25;

    let mut mean_dist = 0.0;
    for p in pts {
        mean_dist += ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
    }
    mean_dist *= 0.25;

    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn quad_area_abs(pts: &[Point2<f64>; 4]) -> f64 {
    let mut sum = 0.0;
    for i in 0..4 {
        let a = pts[i];
        let b = pts[(i + 1) % 4];
        sum += a.x * b.y - b.x * a.y;
    }
    0.5 * sum.abs()
}

fn condition(pts: &[Point2<f64>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let t = conditioning_transform(pts);
    let mut out = [Point2::origin(); 4];
    for (o, p) in out.iter_mut().zip(pts.iter()) {
        let v = t * Vector3::new(p.x, p.y, 1.0);
        *o = Point2::new(v[0], v[1]);
    }
    (out, t)
}

/// Estimate `H` with `dst ~ H * src` from exactly four correspondences.
///
/// The corner order must match between `src` and `dst`. Returns `None` for
/// degenerate configurations (three collinear points, repeated points).
pub fn homography_from_4pt(
    src: &[Point2<f64>; 4],
    dst: &[Point2<f64>; 4],
) -> Option<Homography> {
    let (sn, t_src) = condition(src);
    let (dn, t_dst) = condition(dst);

    // Conditioned points have mean radius sqrt(2); a usable quad then has
    // area well away from zero. Collinear or repeated points do not.
    if quad_area_abs(&sn) < 1e-6 || quad_area_abs(&dn) < 1e-6 {
        return None;
    }

    // Fix h33 = 1 and solve the remaining 8 unknowns from
    //   h11 x + h12 y + h13 - u h31 x - u h32 y = u
    //   h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (sn[k].x, sn[k].y);
        let (u, v) = (dn[k].x, dn[k].y);

        let r = 2 * k;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);

    let h = t_dst.try_inverse()? * hn * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / scale))
}

/// Resample `src` through `h_src_from_dst` into a new `out_w x out_h` image.
///
/// Each destination pixel center is mapped into the source and sampled
/// bilinearly (zero outside the source).
pub fn warp_perspective_gray(
    src: &GrayImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> GrayImage {
    let mut out = vec![0u8; out_w * out_h];
    for y in 0..out_h {
        for x in 0..out_w {
            let p = h_src_from_dst.apply(Point2::new(x as f64 + 0.5, y as f64 + 0.5));
            out[y * out_w + x] = sample_bilinear_u8(src, p.x as f32, p.y as f32);
        }
    }
    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6})",
            a.x,
            a.y,
            b.x,
            b.y
        );
    }

    #[test]
    fn four_point_solve_recovers_transform() {
        let truth = Homography::new(Matrix3::new(
            0.9, 0.04, 80.0, //
            -0.03, 1.2, 40.0, //
            0.0008, -0.0003, 1.0,
        ));
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(120.0, 0.0),
            Point2::new(120.0, 90.0),
            Point2::new(0.0, 90.0),
        ];
        let dst = src.map(|p| truth.apply(p));

        let est = homography_from_4pt(&src, &dst).expect("solvable");
        for p in [
            Point2::new(10.0, 20.0),
            Point2::new(60.0, 45.0),
            Point2::new(110.0, 80.0),
        ] {
            assert_close(est.apply(p), truth.apply(p), 1e-6);
        }
    }

    #[test]
    fn inverse_round_trips() {
        let h = Homography::new(Matrix3::new(
            1.1, 0.2, -4.0, //
            -0.1, 0.95, 6.0, //
            0.0005, 0.0002, 1.0,
        ));
        let inv = h.inverse().expect("invertible");
        for p in [Point2::new(0.0, 0.0), Point2::new(33.0, -7.5)] {
            assert_close(inv.apply(h.apply(p)), p, 1e-9);
        }
    }

    #[test]
    fn collinear_points_are_rejected() {
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
            Point2::new(3.0, 3.0),
        ];
        let dst = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert!(homography_from_4pt(&src, &dst).is_none());
    }

    #[test]
    fn warp_identity_copies_pixels() {
        let mut src = GrayImage::filled(8, 8, 10);
        src.data[3 * 8 + 4] = 250;
        let out = warp_perspective_gray(
            &src.view(),
            Homography::new(Matrix3::identity()),
            8,
            8,
        );
        // pixel centers land half a pixel off the integer grid; the bright
        // pixel must still dominate its own cell
        assert!(out.data[3 * 8 + 4] > 60);
    }
}
