//! Marker dictionaries and candidate decoding.
//!
//! This crate owns everything bit-level about square fiducial markers:
//! - embedded built-in dictionaries (compiled into the binary),
//! - rotation-invariant matching of observed codes against a dictionary,
//! - reading the bit grid of one quadrilateral candidate through a
//!   perspective homography.
//!
//! It performs **no** quad detection; candidates come from
//! `marker-pose-detect` or from explicit corner lists.

pub mod builtins;
mod decode;
mod dictionary;
mod matcher;
mod threshold;

pub use decode::{read_marker_code, CodeObservation, DecodeParams};
pub use dictionary::Dictionary;
pub use matcher::{rotate_code, Match, Matcher};
