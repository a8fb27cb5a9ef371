//! Bit decoding of one quadrilateral candidate.
//!
//! A candidate is rectified implicitly: instead of warping a patch, cell
//! centers of the canonical marker grid are pushed through the 4-point
//! homography and sampled in the source image with a 3x3 mean. A denser
//! sample grid over the same region feeds the Otsu threshold.

use crate::threshold::otsu_threshold;
use marker_pose_core::{gray_at, homography_from_4pt, GrayImageView, Homography};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Sampling parameters for candidate decoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodeParams {
    /// Side length of the canonical square the quad is mapped to (pixels).
    pub canonical_px: f32,
    /// Border ring width in cells. The classic families use 1.
    pub border_bits: usize,
    /// Fraction of the canonical square left unsampled at each edge, to stay
    /// clear of the boundary blur of real images.
    pub inset_frac: f32,
    /// Minimum fraction of border cells that must read black.
    pub min_border_score: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            canonical_px: 64.0,
            border_bits: 1,
            inset_frac: 0.0,
            min_border_score: 0.85,
        }
    }
}

/// Raw bits read from one candidate, before dictionary matching.
#[derive(Clone, Copy, Debug)]
pub struct CodeObservation {
    /// Inner bits, row-major, black = 1.
    pub code: u64,
    /// Fraction of border cells that read black.
    pub border_score: f32,
}

const MIN_CANONICAL_PX: f32 = 12.0;
const THRESHOLD_SUBDIV: usize = 3;

/// Read the bit grid of a candidate whose corners are ordered clockwise
/// starting at the sampling frame's top-left.
///
/// Returns `None` when the candidate is unreadable or its border is not
/// uniformly black; rejection is the expected outcome for non-markers.
pub fn read_marker_code(
    image: &GrayImageView<'_>,
    corners: &[Point2<f32>; 4],
    bits: usize,
    params: &DecodeParams,
) -> Option<CodeObservation> {
    let border = params.border_bits;
    let cells = bits + 2 * border;
    if bits == 0 || bits * bits > 64 {
        return None;
    }

    let s = params.canonical_px;
    if s < MIN_CANONICAL_PX {
        return None;
    }

    let canonical = [
        Point2::new(0.0, 0.0),
        Point2::new(s as f64, 0.0),
        Point2::new(s as f64, s as f64),
        Point2::new(0.0, s as f64),
    ];
    let observed = corners.map(|p| Point2::new(p.x as f64, p.y as f64));
    let h = homography_from_4pt(&canonical, &observed)?;

    let inset = (params.inset_frac.clamp(0.0, 0.4) * s).max(0.0);
    let side = s - 2.0 * inset;
    let step = side / cells as f32;

    // bit samples: one 3x3 mean at each cell center
    let mut samples = Vec::with_capacity(cells * cells);
    for cy in 0..cells {
        for cx in 0..cells {
            let u = inset + (cx as f32 + 0.5) * step;
            let v = inset + (cy as f32 + 0.5) * step;
            samples.push(sample_mean_3x3(image, &h, u, v)?);
        }
    }

    // threshold samples: a denser sweep of the same region
    let sub = cells * THRESHOLD_SUBDIV;
    let sub_step = side / sub as f32;
    let mut thr_samples = Vec::with_capacity(sub * sub);
    for ty in 0..sub {
        for tx in 0..sub {
            let u = inset + (tx as f32 + 0.5) * sub_step;
            let v = inset + (ty as f32 + 0.5) * sub_step;
            if let Some(m) = sample_mean_3x3(image, &h, u, v) {
                thr_samples.push(m);
            }
        }
    }

    classify_cells(&samples, &thr_samples, cells, bits, border, params.min_border_score)
}

fn classify_cells(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<CodeObservation> {
    let thr = if thr_samples.is_empty() {
        otsu_threshold(samples)
    } else {
        otsu_threshold(thr_samples)
    };

    let mut border_black = 0u32;
    let mut border_total = 0u32;
    let mut code = 0u64;

    for cy in 0..cells {
        for cx in 0..cells {
            let is_black = samples[cy * cells + cx] < thr;
            let on_border = cx < border || cy < border || cx >= cells - border || cy >= cells - border;
            if on_border {
                border_total += 1;
                if is_black {
                    border_black += 1;
                }
            } else if is_black {
                let idx = (cy - border) * bits + (cx - border);
                code |= 1u64 << idx;
            }
        }
    }

    let border_score = if border_total > 0 {
        border_black as f32 / border_total as f32
    } else {
        1.0
    };
    if border_score < min_border_score {
        return None;
    }

    Some(CodeObservation { code, border_score })
}

/// 3x3 mean around a canonical-grid position mapped through `h`.
///
/// Returns `None` when the window leaves the image.
fn sample_mean_3x3(image: &GrayImageView<'_>, h: &Homography, u: f32, v: f32) -> Option<u8> {
    let p = h.apply(Point2::new(u as f64, v as f64));
    let ix = p.x.floor() as i32;
    let iy = p.y.floor() as i32;
    if ix < 1 || iy < 1 || ix + 1 >= image.width as i32 || iy + 1 >= image.height as i32 {
        return None;
    }
    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += gray_at(image, ix + dx, iy + dy) as u32;
        }
    }
    Some((sum / 9) as u8)
}
