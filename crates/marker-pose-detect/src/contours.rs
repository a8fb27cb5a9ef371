//! Outer-boundary tracing of connected foreground regions.
//!
//! Components are labeled with a BFS flood fill (8-connectivity), then the
//! outer boundary of each is walked with Moore-neighbor tracing. Hole
//! boundaries are never visited, so the inner edge of a marker's border ring
//! does not produce a second contour for the same region.

use marker_pose_core::GrayImageView;
use nalgebra::Point2;
use std::collections::VecDeque;

/// Clockwise 8-neighborhood starting at the north-west neighbor.
const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

fn neighbor_index(dx: i32, dy: i32) -> usize {
    NEIGHBORS
        .iter()
        .position(|&d| d == (dx, dy))
        .expect("offset is one of the 8 neighbors")
}

/// Trace the outer boundary of every foreground component with at least
/// `min_pixels` pixels. Boundary points are pixel centers in image
/// coordinates, ordered clockwise.
pub fn trace_contours(bin: &GrayImageView<'_>, min_pixels: usize) -> Vec<Vec<Point2<f32>>> {
    let w = bin.width;
    let h = bin.height;
    let mut labels = vec![0u32; w * h];
    let mut next_label = 0u32;
    let mut contours = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if bin.data[idx] == 0 || labels[idx] != 0 {
                continue;
            }
            next_label += 1;
            let count = flood_fill(bin, &mut labels, next_label, x, y);
            if count < min_pixels {
                continue;
            }
            // row-major scan order makes (x, y) the topmost-leftmost pixel
            let boundary = follow_boundary(&labels, w, h, next_label, (x as i32, y as i32));
            if boundary.len() >= 4 {
                contours.push(
                    boundary
                        .into_iter()
                        .map(|(px, py)| Point2::new(px as f32, py as f32))
                        .collect(),
                );
            }
        }
    }
    contours
}

fn flood_fill(
    bin: &GrayImageView<'_>,
    labels: &mut [u32],
    label: u32,
    x0: usize,
    y0: usize,
) -> usize {
    let w = bin.width as i32;
    let h = bin.height as i32;
    let mut queue = VecDeque::new();
    labels[y0 * bin.width + x0] = label;
    queue.push_back((x0 as i32, y0 as i32));
    let mut count = 0usize;

    while let Some((x, y)) = queue.pop_front() {
        count += 1;
        for &(dx, dy) in &NEIGHBORS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let nidx = ny as usize * bin.width + nx as usize;
            if bin.data[nidx] != 0 && labels[nidx] == 0 {
                labels[nidx] = label;
                queue.push_back((nx, ny));
            }
        }
    }
    count
}

/// Moore-neighbor boundary following with backtracking.
///
/// `start` must be the topmost-leftmost pixel of the component, so its west
/// neighbor is guaranteed background. The walk ends when the first move is
/// about to repeat (Jacob's stopping criterion) or a step budget runs out.
fn follow_boundary(
    labels: &[u32],
    w: usize,
    h: usize,
    label: u32,
    start: (i32, i32),
) -> Vec<(i32, i32)> {
    let on_component = |p: (i32, i32)| -> bool {
        p.0 >= 0
            && p.1 >= 0
            && p.0 < w as i32
            && p.1 < h as i32
            && labels[p.1 as usize * w + p.0 as usize] == label
    };

    let mut boundary = vec![start];
    let mut curr = start;
    let mut backtrack = (start.0 - 1, start.1);
    let mut first_move: Option<((i32, i32), (i32, i32))> = None;
    let max_steps = 4 * w * h;

    for _ in 0..max_steps {
        let bidx = neighbor_index(backtrack.0 - curr.0, backtrack.1 - curr.1);
        let mut found = None;
        let mut last_checked = backtrack;
        for k in 1..=8 {
            let idx = (bidx + k) % 8;
            let cand = (curr.0 + NEIGHBORS[idx].0, curr.1 + NEIGHBORS[idx].1);
            if on_component(cand) {
                found = Some(cand);
                break;
            }
            last_checked = cand;
        }
        let Some(next) = found else {
            break; // isolated pixel
        };

        match first_move {
            Some(m) if m == (curr, next) => break,
            None => first_move = Some((curr, next)),
            _ => {}
        }

        boundary.push(next);
        backtrack = last_checked;
        curr = next;
    }

    // the walk re-enters the start pixel before the loop closes
    while boundary.len() > 1 && boundary.last() == Some(&boundary[0]) {
        boundary.pop();
    }
    boundary
}
