//! Full-pipeline tests against exactly projected synthetic frames.

use marker_pose::core::RgbFrame;
use marker_pose::{
    pipeline_from_config, run, DetectedMarker, FramePipeline, OverlayRenderer, PipelineConfig,
    VideoSource,
};
use marker_pose_aruco::builtins::DICT_4X4_50;
use std::sync::atomic::AtomicBool;

const FRAME_W: usize = 640;
const FRAME_H: usize = 480;
const FOCAL: f64 = 700.0;
const CX: f64 = 320.0;
const CY: f64 = 240.0;
const MARKER_LENGTH: f64 = 5.0;

fn test_config() -> PipelineConfig {
    PipelineConfig::from_json(
        r#"{
            "camera_matrix": [[700.0, 0.0, 320.0], [0.0, 700.0, 240.0], [0.0, 0.0, 1.0]],
            "dist_coeffs": [],
            "marker_length": 5.0,
            "dictionary": "DICT_4X4_50"
        }"#,
    )
    .expect("test config is valid")
}

fn test_pipeline() -> FramePipeline {
    pipeline_from_config(&test_config()).expect("pipeline builds")
}

fn blank_frame() -> RgbFrame {
    RgbFrame {
        width: FRAME_W,
        height: FRAME_H,
        data: vec![255; FRAME_W * FRAME_H * 3],
    }
}

/// Is the marker-plane point (x, y) inside a black cell of `code`?
fn marker_black(code: u64, x: f64, y: f64) -> bool {
    let half = MARKER_LENGTH * 0.5;
    if x.abs() > half || y.abs() > half {
        return false;
    }
    let cells = 6.0;
    let cx = (((x + half) / MARKER_LENGTH * cells) as usize).min(5);
    let cy = (((y + half) / MARKER_LENGTH * cells) as usize).min(5);
    if cx == 0 || cy == 0 || cx == 5 || cy == 5 {
        return true;
    }
    let idx = (cy - 1) * 4 + (cx - 1);
    (code >> idx) & 1 == 1
}

/// Render a marker facing the camera head-on at distance `z`, supersampled
/// 4x4 per pixel so edges carry a proper intensity gradient.
fn frontal_frame(code: u64, z: f64) -> RgbFrame {
    let mut frame = blank_frame();
    let half_px = (FOCAL * MARKER_LENGTH * 0.5 / z).ceil() as i32 + 2;
    let (u0, u1) = ((CX as i32 - half_px).max(0), CX as i32 + half_px);
    let (v0, v1) = ((CY as i32 - half_px).max(0), CY as i32 + half_px);

    for v in v0..v1.min(FRAME_H as i32) {
        for u in u0..u1.min(FRAME_W as i32) {
            let mut dark = 0u32;
            for sv in 0..4 {
                for su in 0..4 {
                    let uu = u as f64 + (su as f64 + 0.5) / 4.0 - 0.5;
                    let vv = v as f64 + (sv as f64 + 0.5) / 4.0 - 0.5;
                    let x = (uu - CX) * z / FOCAL;
                    let y = (vv - CY) * z / FOCAL;
                    if marker_black(code, x, y) {
                        dark += 1;
                    }
                }
            }
            let value = (255 * (16 - dark) / 16) as u8;
            let idx = (v as usize * FRAME_W + u as usize) * 3;
            frame.data[idx] = value;
            frame.data[idx + 1] = value;
            frame.data[idx + 2] = value;
        }
    }
    frame
}

#[test]
fn frontal_marker_at_50_units_yields_the_reference_pose() {
    let id = 0usize;
    let frame = frontal_frame(DICT_4X4_50.codes[id], 50.0);
    let result = test_pipeline().process_frame(&frame.view());

    assert_eq!(result.markers.len(), 1, "exactly one detection expected");
    let m = &result.markers[0];
    assert_eq!(m.id, id as u32);

    assert!(
        (m.tvec.z - 50.0).abs() < 0.6,
        "tvec.z = {:.3}, expected ~50",
        m.tvec.z
    );
    assert!(m.tvec.x.abs() < 0.3, "tvec.x = {:.3}", m.tvec.x);
    assert!(m.tvec.y.abs() < 0.3, "tvec.y = {:.3}", m.tvec.y);
    assert!(
        m.rvec.norm() < 0.25,
        "rvec = {:?}, expected ~zero rotation",
        m.rvec
    );

    // marker edges sit 35px from the principal point at this distance
    let expected_tl = nalgebra::Point2::new(285.0f32, 205.0);
    assert!((m.corners[0] - expected_tl).norm() < 1.0);
}

#[test]
fn empty_frame_yields_an_empty_result() {
    let result = test_pipeline().process_frame(&blank_frame().view());
    assert!(result.markers.is_empty());
    assert_eq!(result.dropped_poses, 0);
}

#[test]
fn processing_is_idempotent_across_calls() {
    let frame = frontal_frame(DICT_4X4_50.codes[17], 40.0);
    let pipeline = test_pipeline();

    let first = pipeline.process_frame(&frame.view());
    let second = pipeline.process_frame(&frame.view());

    assert_eq!(first.markers.len(), second.markers.len());
    for (a, b) in first.markers.iter().zip(second.markers.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.corners, b.corners);
        assert_eq!(a.rvec, b.rvec);
        assert_eq!(a.tvec, b.tvec);
    }
}

// -- acquisition loop -------------------------------------------------------

struct ReplaySource {
    frames: Vec<RgbFrame>,
    fail_after: Option<usize>,
    served: usize,
    closed: bool,
}

impl ReplaySource {
    fn new(frames: Vec<RgbFrame>) -> Self {
        Self {
            frames,
            fail_after: None,
            served: 0,
            closed: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SourceFault;

impl VideoSource for ReplaySource {
    type Error = SourceFault;

    fn next_frame(&mut self) -> Result<Option<RgbFrame>, Self::Error> {
        if self.fail_after == Some(self.served) {
            return Err(SourceFault);
        }
        if self.served >= self.frames.len() {
            return Ok(None);
        }
        self.served += 1;
        Ok(Some(self.frames[self.served - 1].clone()))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Default)]
struct CountingRenderer {
    frames_seen: usize,
    markers_seen: Vec<u32>,
}

impl OverlayRenderer for CountingRenderer {
    fn render(&mut self, _frame: &RgbFrame, markers: &[DetectedMarker]) {
        self.frames_seen += 1;
        self.markers_seen.extend(markers.iter().map(|m| m.id));
    }
}

#[test]
fn run_processes_until_end_of_stream() {
    let pipeline = test_pipeline();
    let mut source = ReplaySource::new(vec![
        frontal_frame(DICT_4X4_50.codes[5], 45.0),
        blank_frame(),
    ]);
    let mut renderer = CountingRenderer::default();
    let stop = AtomicBool::new(false);

    let stats = run(&pipeline, &mut source, &mut renderer, &stop).expect("clean run");
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.detections, 1);
    assert_eq!(renderer.frames_seen, 2);
    assert_eq!(renderer.markers_seen, vec![5]);
    assert!(source.closed);
}

#[test]
fn run_stops_immediately_when_the_flag_is_set() {
    let pipeline = test_pipeline();
    let mut source = ReplaySource::new(vec![blank_frame()]);
    let mut renderer = CountingRenderer::default();
    let stop = AtomicBool::new(true);

    let stats = run(&pipeline, &mut source, &mut renderer, &stop).expect("clean stop");
    assert_eq!(stats.frames, 0);
    assert_eq!(renderer.frames_seen, 0);
    assert!(source.closed);
}

#[test]
fn source_faults_are_surfaced_to_the_caller() {
    let pipeline = test_pipeline();
    let mut source = ReplaySource::new(vec![blank_frame(), blank_frame()]);
    source.fail_after = Some(1);
    let mut renderer = CountingRenderer::default();
    let stop = AtomicBool::new(false);

    let err = run(&pipeline, &mut source, &mut renderer, &stop).unwrap_err();
    assert_eq!(err, SourceFault);
    assert_eq!(renderer.frames_seen, 1);
    assert!(source.closed);
}
