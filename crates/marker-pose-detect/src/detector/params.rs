use crate::quads::QuadParams;
use crate::refine::RefineParams;
use marker_pose_aruco::{DecodeParams, Dictionary};
use serde::{Deserialize, Serialize};

/// Configuration for the marker detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Adaptive threshold window radius (pixels).
    pub threshold_radius: usize,
    /// Intensity margin below the local mean for a pixel to count as dark.
    pub threshold_offset: i16,
    /// Smallest connected component worth tracing (pixels).
    pub min_component_pixels: usize,
    /// Quad geometry acceptance thresholds.
    pub quad: QuadParams,
    /// Candidate sampling and border-check settings.
    pub decode: DecodeParams,
    /// Maximum Hamming distance for dictionary matching. Values above the
    /// dictionary's design distance are clamped in `MarkerDetector::new`.
    pub max_hamming: u8,
    /// Sub-pixel corner refinement toggle.
    pub refine_corners: bool,
    /// Refinement window settings.
    pub refine: RefineParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            threshold_radius: 7,
            threshold_offset: 7,
            min_component_pixels: 64,
            quad: QuadParams::default(),
            decode: DecodeParams::default(),
            max_hamming: 1,
            refine_corners: true,
            refine: RefineParams::default(),
        }
    }
}

impl DetectorParams {
    /// Defaults with the Hamming tolerance taken from the dictionary.
    pub fn for_dictionary(dict: &Dictionary) -> Self {
        Self {
            max_hamming: dict.max_correction_bits,
            ..Self::default()
        }
    }
}
