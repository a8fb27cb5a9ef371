//! Fiducial marker detection and pose estimation.
//!
//! This is the facade crate for the `marker-pose-*` workspace. It wires the
//! detector to a planar PnP solver and exposes the frame-synchronous
//! pipeline plus the collaborator traits for video acquisition and overlay
//! rendering.
//!
//! ## Quickstart
//!
//! ```no_run
//! use marker_pose::{detect, PipelineConfig};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load(Path::new("camera.json"))?;
//! let pipeline = marker_pose::pipeline_from_config(&config)?;
//!
//! let img = image::ImageReader::open("frame.png")?.decode()?;
//! let result = detect::process_image(&pipeline, &img);
//! for marker in &result.markers {
//!     println!("id {} at {:?}", marker.id, marker.tvec);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_pose::core`: frame buffers, homographies, the camera model.
//! - `marker_pose::aruco`: dictionaries, matching, candidate bit decoding.
//! - `marker_pose::detector`: the per-frame marker detector.
//! - `marker_pose::pose`: planar pose estimation for a single marker.
//! - `marker_pose::detect` (feature `image`): helpers from decoded images.

pub use marker_pose_aruco as aruco;
pub use marker_pose_core as core;
pub use marker_pose_detect as detector;

mod config;
mod pipeline;
pub mod pose;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{
    run, DetectedMarker, FramePipeline, FrameResult, OverlayRenderer, RunStats, VideoSource,
};
pub use pose::{estimate_marker_pose, MarkerPose, PoseError, PoseParams};

#[cfg(feature = "image")]
pub mod detect;

/// Build a pipeline from a validated configuration.
pub fn pipeline_from_config(config: &PipelineConfig) -> Result<FramePipeline, ConfigError> {
    config.validate()?;
    let dictionary = config.resolve_dictionary()?;
    Ok(FramePipeline::new(
        dictionary,
        config.detector.clone(),
        config.camera_model(),
        config.marker_length,
        config.pose.clone(),
    ))
}
