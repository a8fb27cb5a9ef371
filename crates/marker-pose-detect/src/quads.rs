//! Candidate quadrilateral extraction from traced contours.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One candidate marker outline.
///
/// Corners are ordered clockwise (image coordinates, y down) with the first
/// vertex nearest the image origin. A `Quad` only lives for the duration of
/// one detection pass.
#[derive(Clone, Copy, Debug)]
pub struct Quad {
    pub corners: [Point2<f32>; 4],
}

impl Quad {
    pub fn center(&self) -> Point2<f32> {
        let mut cx = 0.0;
        let mut cy = 0.0;
        for p in &self.corners {
            cx += p.x;
            cy += p.y;
        }
        Point2::new(cx * 0.25, cy * 0.25)
    }

    pub fn area(&self) -> f32 {
        signed_area(&self.corners).abs()
    }

    pub fn perimeter(&self) -> f32 {
        (0..4)
            .map(|i| {
                let a = self.corners[i];
                let b = self.corners[(i + 1) % 4];
                (b - a).norm()
            })
            .sum()
    }
}

/// Geometric acceptance thresholds for candidate quads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuadParams {
    /// Polygon simplification tolerance as a fraction of contour perimeter.
    pub approx_tolerance_rel: f32,
    /// Reject quads with a smaller perimeter (noise floor).
    pub min_perimeter: f32,
    /// Reject quads with a smaller area (noise floor).
    pub min_area: f32,
    /// Reject quads covering more than this fraction of the frame (the frame
    /// border itself shows up as a huge contour on dark backgrounds).
    pub max_area_frac: f32,
    /// Bounding-box aspect ratio ceiling.
    pub max_aspect_ratio: f32,
    /// Reject quads whose corners come closer than this to the image edge.
    pub border_margin: f32,
    /// Near-duplicate suppression: quads whose centers are closer than this
    /// fraction of the larger quad's mean side are considered duplicates.
    pub dedup_center_rel: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            approx_tolerance_rel: 0.04,
            min_perimeter: 40.0,
            min_area: 100.0,
            max_area_frac: 0.95,
            max_aspect_ratio: 4.0,
            border_margin: 1.0,
            dedup_center_rel: 0.5,
        }
    }
}

/// Filter traced contours down to candidate quads.
pub fn quads_from_contours(
    contours: &[Vec<Point2<f32>>],
    frame_width: usize,
    frame_height: usize,
    params: &QuadParams,
) -> Vec<Quad> {
    let frame_area = (frame_width * frame_height) as f32;
    let mut quads = Vec::new();

    for contour in contours {
        let perimeter = closed_perimeter(contour);
        if perimeter < params.min_perimeter {
            continue;
        }
        let eps = params.approx_tolerance_rel * perimeter;
        let poly = approx_polygon_closed(contour, eps);
        if poly.len() != 4 {
            continue;
        }
        let corners = [poly[0], poly[1], poly[2], poly[3]];
        if !is_convex(&corners) {
            continue;
        }

        let mut quad = Quad {
            corners: normalize_winding(corners),
        };
        let area = quad.area();
        if area < params.min_area || area > params.max_area_frac * frame_area {
            continue;
        }
        if quad.perimeter() < params.min_perimeter {
            continue;
        }
        if !aspect_ok(&quad, params.max_aspect_ratio) {
            continue;
        }
        if touches_border(&quad, frame_width, frame_height, params.border_margin) {
            continue;
        }
        quad.corners = rotate_to_origin_first(quad.corners);
        quads.push(quad);
    }

    suppress_duplicates(quads, params.dedup_center_rel)
}

fn closed_perimeter(points: &[Point2<f32>]) -> f32 {
    let n = points.len();
    (0..n).map(|i| (points[(i + 1) % n] - points[i]).norm()).sum()
}

/// Douglas-Peucker simplification of a closed contour.
///
/// The contour is split at the two mutually farthest anchor points, each open
/// half is simplified, and the halves are joined again.
pub fn approx_polygon_closed(points: &[Point2<f32>], eps: f32) -> Vec<Point2<f32>> {
    let n = points.len();
    if n < 4 {
        return points.to_vec();
    }

    // anchor 0: farthest point from points[0]; anchor 1: farthest from it
    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    let (first, second) = if a < b { (a, b) } else { (b, a) };

    let half1: Vec<Point2<f32>> = points[first..=second].to_vec();
    let mut half2: Vec<Point2<f32>> = points[second..].to_vec();
    half2.extend_from_slice(&points[..=first]);

    let mut out = Vec::new();
    simplify_open(&half1, eps, &mut out);
    out.pop(); // shared anchor
    simplify_open(&half2, eps, &mut out);
    out.pop(); // shared anchor
    out
}

fn farthest_from(points: &[Point2<f32>], origin: Point2<f32>) -> usize {
    let mut best = 0;
    let mut best_d = -1.0f32;
    for (i, p) in points.iter().enumerate() {
        let d = (p - origin).norm_squared();
        if d > best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Douglas-Peucker over an open polyline; appends the simplified chain
/// including both endpoints. Uses an explicit work stack, so contour length
/// never translates into call depth.
fn simplify_open(points: &[Point2<f32>], eps: f32, out: &mut Vec<Point2<f32>>) {
    let n = points.len();
    if n <= 2 {
        out.extend_from_slice(points);
        return;
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut spans = vec![(0usize, n - 1)];
    while let Some((lo, hi)) = spans.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let mut split = lo;
        let mut max_dist = 0.0f32;
        for i in lo + 1..hi {
            let d = segment_distance(points[i], points[lo], points[hi]);
            if d > max_dist {
                max_dist = d;
                split = i;
            }
        }
        if max_dist > eps {
            keep[split] = true;
            spans.push((lo, split));
            spans.push((split, hi));
        }
    }

    out.extend(points.iter().zip(&keep).filter(|(_, &k)| k).map(|(p, _)| *p));
}

fn segment_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-12 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

fn signed_area(corners: &[Point2<f32>; 4]) -> f32 {
    let mut sum = 0.0;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        sum += a.x * b.y - b.x * a.y;
    }
    0.5 * sum
}

/// Strict convexity: every consecutive edge pair turns the same way.
pub fn is_convex(corners: &[Point2<f32>; 4]) -> bool {
    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let c = corners[(i + 2) % 4];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() < 1e-6 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Clockwise winding in image coordinates (y down).
fn normalize_winding(mut corners: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    if signed_area(&corners) < 0.0 {
        corners.swap(1, 3);
    }
    corners
}

/// Rotate the corner cycle so the vertex nearest the image origin is first.
fn rotate_to_origin_first(corners: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let mut start = 0;
    let mut best = f32::MAX;
    for (i, p) in corners.iter().enumerate() {
        let d = p.x + p.y;
        if d < best {
            best = d;
            start = i;
        }
    }
    [
        corners[start],
        corners[(start + 1) % 4],
        corners[(start + 2) % 4],
        corners[(start + 3) % 4],
    ]
}

fn aspect_ok(quad: &Quad, max_ratio: f32) -> bool {
    let xs: Vec<f32> = quad.corners.iter().map(|p| p.x).collect();
    let ys: Vec<f32> = quad.corners.iter().map(|p| p.y).collect();
    let w = xs.iter().cloned().fold(f32::MIN, f32::max)
        - xs.iter().cloned().fold(f32::MAX, f32::min);
    let h = ys.iter().cloned().fold(f32::MIN, f32::max)
        - ys.iter().cloned().fold(f32::MAX, f32::min);
    if w < 1.0 || h < 1.0 {
        return false;
    }
    let ratio = w.max(h) / w.min(h);
    ratio <= max_ratio
}

fn touches_border(quad: &Quad, frame_width: usize, frame_height: usize, margin: f32) -> bool {
    quad.corners.iter().any(|p| {
        p.x < margin
            || p.y < margin
            || p.x > frame_width as f32 - 1.0 - margin
            || p.y > frame_height as f32 - 1.0 - margin
    })
}

/// Keep the larger of any two quads whose centers nearly coincide.
///
/// The thresholded border of one marker can yield two nested rings; the
/// outer one carries the true outline, so the policy is "keep the outermost".
fn suppress_duplicates(mut quads: Vec<Quad>, center_rel: f32) -> Vec<Quad> {
    quads.sort_by(|a, b| {
        b.area()
            .partial_cmp(&a.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Quad> = Vec::with_capacity(quads.len());
    for q in quads {
        let mean_side = q.perimeter() * 0.25;
        let duplicate = kept.iter().any(|k| {
            let limit = center_rel * (k.perimeter() * 0.25).max(mean_side);
            (k.center() - q.center()).norm() < limit
        });
        if !duplicate {
            kept.push(q);
        }
    }
    kept
}
