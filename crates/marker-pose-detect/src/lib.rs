//! Square fiducial marker detection.
//!
//! The pipeline turns one frame into a list of decoded markers:
//! grayscale conversion -> adaptive threshold -> contour tracing ->
//! quadrilateral filtering -> per-candidate bit decoding -> sub-pixel corner
//! refinement. Pose estimation lives a level up, in `marker-pose`.
//!
//! Every stage is frame-local: no state survives between calls, so running
//! the detector twice on the same frame yields identical results.

mod contours;
mod detector;
mod preprocess;
mod quads;
mod refine;

pub use contours::trace_contours;
pub use detector::{DetectorParams, MarkerDetection, MarkerDetector};
pub use preprocess::{adaptive_threshold, rgb_to_gray};
pub use quads::{quads_from_contours, Quad, QuadParams};
pub use refine::{refine_corner, refine_quad_corners, RefineParams};
