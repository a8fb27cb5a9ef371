//! Startup configuration: camera calibration, marker geometry, dictionary.
//!
//! Everything here is validated once before the frame loop starts; a
//! malformed configuration is fatal (`ConfigError`), never worked around.

use crate::pose::PoseParams;
use marker_pose_aruco::{builtins, Dictionary};
use marker_pose_core::{CameraIntrinsics, CameraModel, Distortion};
use marker_pose_detect::DetectorParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON-facing pipeline configuration.
///
/// `camera_matrix` is the usual row-major 3x3 intrinsic matrix;
/// `dist_coeffs` follows the `[k1, k2, p1, p2, k3]` ordering and accepts the
/// common lengths 0, 4, 5 and 8 (trailing rational terms are not modeled and
/// must be zero).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub camera_matrix: [[f64; 3]; 3],
    #[serde(default)]
    pub dist_coeffs: Vec<f64>,
    /// Physical marker side length; translation comes out in the same unit.
    pub marker_length: f64,
    /// Built-in dictionary name, e.g. `"DICT_4X4_50"`.
    pub dictionary: String,
    #[serde(default)]
    pub detector: DetectorParams,
    #[serde(default)]
    pub pose: PoseParams,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid camera matrix: {0}")]
    InvalidCameraMatrix(&'static str),
    #[error("marker length must be positive and finite, got {0}")]
    InvalidMarkerLength(f64),
    #[error("distortion vector has unsupported length {0} (expected 0, 4, 5 or 8)")]
    InvalidDistortion(usize),
    #[error("unknown dictionary {0:?} (available: {available})", available = builtins::builtin_names().join(", "))]
    UnknownDictionary(String),
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check every startup invariant. Called by the constructors; callers
    /// building a config programmatically should call it themselves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.camera_matrix;
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidCameraMatrix("non-finite entry"));
        }
        if m[0][0] <= 0.0 || m[1][1] <= 0.0 {
            return Err(ConfigError::InvalidCameraMatrix("non-positive focal length"));
        }
        if m[0][1] != 0.0 || m[1][0] != 0.0 {
            return Err(ConfigError::InvalidCameraMatrix("skew is not supported"));
        }
        if m[2] != [0.0, 0.0, 1.0] {
            return Err(ConfigError::InvalidCameraMatrix(
                "last row must be [0, 0, 1]",
            ));
        }

        if !matches!(self.dist_coeffs.len(), 0 | 4 | 5 | 8) {
            return Err(ConfigError::InvalidDistortion(self.dist_coeffs.len()));
        }
        if self.dist_coeffs.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidCameraMatrix(
                "non-finite distortion coefficient",
            ));
        }
        if self.dist_coeffs.len() == 8 && self.dist_coeffs[5..].iter().any(|&v| v != 0.0) {
            return Err(ConfigError::InvalidDistortion(8));
        }

        if !self.marker_length.is_finite() || self.marker_length <= 0.0 {
            return Err(ConfigError::InvalidMarkerLength(self.marker_length));
        }

        self.resolve_dictionary()?;
        Ok(())
    }

    pub fn camera_model(&self) -> CameraModel {
        let m = &self.camera_matrix;
        let d = &self.dist_coeffs;
        let coeff = |i: usize| d.get(i).copied().unwrap_or(0.0);
        CameraModel::new(
            CameraIntrinsics {
                fx: m[0][0],
                fy: m[1][1],
                cx: m[0][2],
                cy: m[1][2],
            },
            Distortion {
                k1: coeff(0),
                k2: coeff(1),
                p1: coeff(2),
                p2: coeff(3),
                k3: coeff(4),
            },
        )
    }

    pub fn resolve_dictionary(&self) -> Result<Dictionary, ConfigError> {
        builtins::builtin_dictionary(&self.dictionary)
            .ok_or_else(|| ConfigError::UnknownDictionary(self.dictionary.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> String {
        r#"{
            "camera_matrix": [[700.0, 0.0, 320.0], [0.0, 700.0, 240.0], [0.0, 0.0, 1.0]],
            "dist_coeffs": [0.0, 0.0, 0.0, 0.0, 0.0],
            "marker_length": 5.0,
            "dictionary": "DICT_4X4_50"
        }"#
        .to_string()
    }

    #[test]
    fn valid_config_parses_and_builds_a_camera() {
        let config = PipelineConfig::from_json(&valid_json()).expect("valid");
        let cam = config.camera_model();
        assert_eq!(cam.intrinsics.fx, 700.0);
        assert_eq!(cam.intrinsics.cy, 240.0);
        assert!(cam.distortion.is_zero());
        assert_eq!(config.resolve_dictionary().unwrap().len(), 50);
    }

    #[test]
    fn load_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        std::fs::write(&path, valid_json()).unwrap();

        let config = PipelineConfig::load(&path).expect("loads");
        assert_eq!(config.dictionary, "DICT_4X4_50");
        assert!(matches!(
            PipelineConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn non_positive_marker_length_is_fatal() {
        let text = valid_json().replace("\"marker_length\": 5.0", "\"marker_length\": 0.0");
        assert!(matches!(
            PipelineConfig::from_json(&text),
            Err(ConfigError::InvalidMarkerLength(_))
        ));
    }

    #[test]
    fn unknown_dictionary_is_fatal() {
        let text = valid_json().replace("DICT_4X4_50", "DICT_13X13_9000");
        assert!(matches!(
            PipelineConfig::from_json(&text),
            Err(ConfigError::UnknownDictionary(_))
        ));
    }

    #[test]
    fn malformed_camera_matrix_is_fatal() {
        let text = valid_json().replace("[0.0, 0.0, 1.0]", "[0.0, 0.5, 1.0]");
        assert!(matches!(
            PipelineConfig::from_json(&text),
            Err(ConfigError::InvalidCameraMatrix(_))
        ));

        let text = valid_json().replace("[[700.0", "[[-700.0");
        assert!(matches!(
            PipelineConfig::from_json(&text),
            Err(ConfigError::InvalidCameraMatrix(_))
        ));
    }

    #[test]
    fn odd_distortion_length_is_fatal() {
        let text = valid_json().replace("[0.0, 0.0, 0.0, 0.0, 0.0]", "[0.1, 0.2, 0.3]");
        assert!(matches!(
            PipelineConfig::from_json(&text),
            Err(ConfigError::InvalidDistortion(3))
        ));
    }
}
