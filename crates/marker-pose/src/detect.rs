//! End-to-end helpers bridging the `image` crate to the pipeline.

use crate::pipeline::{FramePipeline, FrameResult};
use marker_pose_core::{GrayImageView, RgbImageView};
use marker_pose_detect::{MarkerDetection, MarkerDetector};

/// Borrow an `image::GrayImage` as the pipeline's view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Borrow an `image::RgbImage` as the pipeline's view type.
pub fn rgb_view(img: &::image::RgbImage) -> RgbImageView<'_> {
    RgbImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Detect markers (without pose) in a decoded image.
pub fn detect_markers(detector: &MarkerDetector, img: &::image::DynamicImage) -> Vec<MarkerDetection> {
    let gray = img.to_luma8();
    detector.detect_gray(&gray_view(&gray))
}

/// Run the full detection + pose pipeline on a decoded image.
pub fn process_image(pipeline: &FramePipeline, img: &::image::DynamicImage) -> FrameResult {
    let rgb = img.to_rgb8();
    pipeline.process_frame(&rgb_view(&rgb))
}
