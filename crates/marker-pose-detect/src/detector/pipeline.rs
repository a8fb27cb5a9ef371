use super::{DetectorParams, MarkerDetection};
use crate::contours::trace_contours;
use crate::preprocess::{adaptive_threshold, rgb_to_gray};
use crate::quads::{quads_from_contours, Quad};
use crate::refine::refine_quad_corners;
use marker_pose_aruco::{read_marker_code, Dictionary, Matcher};
use marker_pose_core::{GrayImageView, RgbImageView};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Square fiducial marker detector.
///
/// One instance is built per dictionary at startup and is read-only during
/// detection, so it can be shared freely between threads.
pub struct MarkerDetector {
    matcher: Matcher,
    params: DetectorParams,
}

impl MarkerDetector {
    /// Build a detector. The Hamming tolerance is clamped to the
    /// dictionary's design distance.
    pub fn new(dictionary: Dictionary, mut params: DetectorParams) -> Self {
        params.max_hamming = params.max_hamming.min(dictionary.max_correction_bits);
        let matcher = Matcher::new(dictionary, params.max_hamming);
        Self { matcher, params }
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    #[inline]
    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect markers in a color frame.
    pub fn detect_rgb(&self, frame: &RgbImageView<'_>) -> Vec<MarkerDetection> {
        let gray = rgb_to_gray(frame);
        self.detect_gray(&gray.view())
    }

    /// Detect markers in a grayscale frame.
    ///
    /// An empty result is the normal outcome for a frame without markers;
    /// nothing in detection raises an error.
    pub fn detect_gray(&self, gray: &GrayImageView<'_>) -> Vec<MarkerDetection> {
        let binary = adaptive_threshold(
            gray,
            self.params.threshold_radius,
            self.params.threshold_offset,
        );
        let contours = trace_contours(&binary.view(), self.params.min_component_pixels);
        let quads = quads_from_contours(&contours, gray.width, gray.height, &self.params.quad);

        let detections: Vec<MarkerDetection> = self
            .decode_quads(gray, &quads)
            .into_iter()
            .flatten()
            .collect();

        log::debug!(
            "frame {}x{}: {} contours, {} quads, {} markers",
            gray.width,
            gray.height,
            contours.len(),
            quads.len(),
            detections.len()
        );
        detections
    }

    /// Decode one candidate quad: read bits, match the dictionary, refine
    /// and canonicalize corners. `None` is the expected rejection path.
    fn decode_quad(&self, gray: &GrayImageView<'_>, quad: &Quad) -> Option<MarkerDetection> {
        let bits = self.matcher.dictionary().marker_size;
        let obs = read_marker_code(gray, &quad.corners, bits, &self.params.decode)?;
        let matched = self.matcher.match_code(obs.code)?;

        let mut corners = quad.corners;
        if self.params.refine_corners {
            corners = refine_quad_corners(gray, &corners, &self.params.refine);
        }
        // put the marker's logical top-left first
        corners.rotate_left(matched.rotation as usize);

        Some(MarkerDetection {
            id: matched.id,
            corners,
            rotation: matched.rotation,
            hamming: matched.hamming,
            border_score: obs.border_score,
            code: obs.code,
        })
    }

    /// Candidates are independent; with the `rayon` feature they decode in
    /// parallel against the shared read-only inputs. Collection preserves
    /// discovery order either way.
    #[cfg(feature = "rayon")]
    fn decode_quads(
        &self,
        gray: &GrayImageView<'_>,
        quads: &[Quad],
    ) -> Vec<Option<MarkerDetection>> {
        quads.par_iter().map(|q| self.decode_quad(gray, q)).collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn decode_quads(
        &self,
        gray: &GrayImageView<'_>,
        quads: &[Quad],
    ) -> Vec<Option<MarkerDetection>> {
        quads.iter().map(|q| self.decode_quad(gray, q)).collect()
    }
}
