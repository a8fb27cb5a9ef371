//! Frame preprocessing: color conversion and adaptive binarization.

use marker_pose_core::{GrayImage, GrayImageView, RgbImageView};

/// Convert an interleaved RGB frame to grayscale (integer Rec.601 luma).
pub fn rgb_to_gray(rgb: &RgbImageView<'_>) -> GrayImage {
    debug_assert_eq!(rgb.data.len(), rgb.width * rgb.height * 3);
    let mut data = Vec::with_capacity(rgb.width * rgb.height);
    for px in rgb.data.chunks_exact(3) {
        let luma = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32;
        data.push(((luma + 128) >> 8) as u8);
    }
    GrayImage {
        width: rgb.width,
        height: rgb.height,
        data,
    }
}

/// Binarize against the local mean.
///
/// A pixel becomes foreground (255) when it is at least `offset` darker than
/// the mean of the window of radius `radius` around it, computed from an
/// integral image with clamped borders. Marker interiors and borders survive
/// uneven illumination this way, which a single global threshold does not.
pub fn adaptive_threshold(gray: &GrayImageView<'_>, radius: usize, offset: i16) -> GrayImage {
    let w = gray.width;
    let h = gray.height;
    let integral = integral_image(gray);
    let sum_at = |x: usize, y: usize| integral[y * (w + 1) + x];

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let area = ((x1 - x0) * (y1 - y0)) as u64;
            let sum = sum_at(x1, y1) + sum_at(x0, y0) - sum_at(x1, y0) - sum_at(x0, y1);
            let mean = (sum / area) as i32;
            let v = gray.data[y * w + x] as i32;
            if v + offset as i32 <= mean {
                out[y * w + x] = 255;
            }
        }
    }
    GrayImage {
        width: w,
        height: h,
        data: out,
    }
}

/// Summed-area table with a zero row/column prepended.
fn integral_image(gray: &GrayImageView<'_>) -> Vec<u64> {
    let w = gray.width;
    let h = gray.height;
    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.data[y * w + x] as u64;
            integral[(y + 1) * (w + 1) + (x + 1)] = integral[y * (w + 1) + (x + 1)] + row_sum;
        }
    }
    integral
}
