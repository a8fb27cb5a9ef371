use nalgebra::Point2;

/// One decoded marker in image space.
#[derive(Clone, Debug)]
pub struct MarkerDetection {
    /// Dictionary id.
    pub id: u32,
    /// Corners ordered clockwise starting at the marker's logical top-left
    /// (i.e. already re-ordered for the matched rotation), sub-pixel refined
    /// when refinement is enabled.
    pub corners: [Point2<f32>; 4],
    /// Rotation `0..=3` the matcher applied to align the observed bits.
    pub rotation: u8,
    /// Bit errors tolerated by the match.
    pub hamming: u8,
    /// Fraction of border cells that read black.
    pub border_score: f32,
    /// Observed inner bits (row-major, black = 1), before rotation.
    pub code: u64,
}
