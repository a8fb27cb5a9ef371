//! Core primitives for fiducial marker detection and pose estimation.
//!
//! This crate is intentionally small: frame buffer types, bilinear sampling,
//! the four-point homography solve used both for candidate rectification and
//! planar pose, and the camera model. It knows nothing about markers or
//! dictionaries.

mod camera;
mod homography;
mod image;
mod logger;

pub use camera::{CameraIntrinsics, CameraModel, Distortion};
pub use homography::{homography_from_4pt, warp_perspective_gray, Homography};
pub use image::{
    gray_at, sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, RgbFrame,
    RgbImageView,
};

pub use logger::init_with_level;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;
