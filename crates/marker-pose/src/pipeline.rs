//! Per-frame processing and the caller-owned acquisition loop.

use crate::pose::{estimate_marker_pose, MarkerPose, PoseParams};
use marker_pose_aruco::Dictionary;
use marker_pose_core::{CameraModel, RgbFrame, RgbImageView};
use marker_pose_detect::{DetectorParams, MarkerDetector};
use nalgebra::{Point2, Vector3};
use std::sync::atomic::{AtomicBool, Ordering};

/// One marker with a solved 6-DoF pose.
#[derive(Clone, Debug)]
pub struct DetectedMarker {
    /// Dictionary id.
    pub id: u32,
    /// Image corners, top-left first, clockwise.
    pub corners: [Point2<f32>; 4],
    /// Axis-angle rotation of the marker in the camera frame.
    pub rvec: Vector3<f64>,
    /// Marker center in the camera frame, in marker-side units.
    pub tvec: Vector3<f64>,
}

/// Outcome of processing one frame. Only ever "N detections"; per-candidate
/// rejections are counted, not surfaced.
#[derive(Clone, Debug, Default)]
pub struct FrameResult {
    pub markers: Vec<DetectedMarker>,
    /// Decoded markers whose pose solve failed this frame.
    pub dropped_poses: usize,
}

/// Supplies color frames on demand.
///
/// `next_frame` blocks until a frame is available, returns `Ok(None)` at end
/// of stream, and `Err` for acquisition faults; retry-vs-terminate is the
/// caller's policy, not the pipeline's.
pub trait VideoSource {
    type Error;

    fn next_frame(&mut self) -> Result<Option<RgbFrame>, Self::Error>;

    /// Release the underlying device or connection.
    fn close(&mut self) {}
}

/// Consumes each processed frame together with its detections.
///
/// Rendering failures are the implementer's concern; the pipeline never
/// inspects them.
pub trait OverlayRenderer {
    fn render(&mut self, frame: &RgbFrame, markers: &[DetectedMarker]);
}

/// Counters for a finished acquisition loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: usize,
    pub detections: usize,
}

/// The frame-synchronous detection + pose pipeline.
///
/// Holds only immutable configuration, so processing the same frame twice
/// yields identical results and instances can be shared across threads.
pub struct FramePipeline {
    detector: MarkerDetector,
    camera: CameraModel,
    marker_length: f64,
    pose: PoseParams,
}

impl FramePipeline {
    pub fn new(
        dictionary: Dictionary,
        detector_params: DetectorParams,
        camera: CameraModel,
        marker_length: f64,
        pose: PoseParams,
    ) -> Self {
        Self {
            detector: MarkerDetector::new(dictionary, detector_params),
            camera,
            marker_length,
            pose,
        }
    }

    #[inline]
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    #[inline]
    pub fn detector(&self) -> &MarkerDetector {
        &self.detector
    }

    #[inline]
    pub fn marker_length(&self) -> f64 {
        self.marker_length
    }

    /// Process one color frame: detect, decode, refine, solve poses.
    pub fn process_frame(&self, frame: &RgbImageView<'_>) -> FrameResult {
        let detections = self.detector.detect_rgb(frame);
        self.poses_for(detections)
    }

    /// Same pipeline on an already-converted grayscale frame.
    pub fn process_gray(&self, gray: &marker_pose_core::GrayImageView<'_>) -> FrameResult {
        let detections = self.detector.detect_gray(gray);
        self.poses_for(detections)
    }

    fn poses_for(&self, detections: Vec<marker_pose_detect::MarkerDetection>) -> FrameResult {
        let mut result = FrameResult::default();
        for det in detections {
            match estimate_marker_pose(&det.corners, self.marker_length, &self.camera, &self.pose)
            {
                Ok(MarkerPose { rvec, tvec, .. }) => result.markers.push(DetectedMarker {
                    id: det.id,
                    corners: det.corners,
                    rvec,
                    tvec,
                }),
                Err(err) => {
                    result.dropped_poses += 1;
                    log::debug!("marker {} dropped: {err}", det.id);
                }
            }
        }
        result
    }
}

/// Drive a video source until end-of-stream, a source error, or `stop`.
///
/// The stop flag is checked between frames only; one frame is always
/// processed to completion (frame processing is bounded, so there is no
/// partial-frame cancellation).
pub fn run<S, R>(
    pipeline: &FramePipeline,
    source: &mut S,
    renderer: &mut R,
    stop: &AtomicBool,
) -> Result<RunStats, S::Error>
where
    S: VideoSource,
    R: OverlayRenderer,
{
    let mut stats = RunStats::default();
    while !stop.load(Ordering::Relaxed) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                source.close();
                return Err(err);
            }
        };
        let result = pipeline.process_frame(&frame.view());
        stats.frames += 1;
        stats.detections += result.markers.len();
        renderer.render(&frame, &result.markers);
    }
    source.close();
    log::info!(
        "pipeline stopped after {} frames, {} detections",
        stats.frames,
        stats.detections
    );
    Ok(stats)
}
